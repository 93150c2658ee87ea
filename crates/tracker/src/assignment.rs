//! Kuhn-Munkres minimum-cost assignment.
//!
//! Potentials-and-augmenting-paths formulation, O(n^3) on a square matrix.
//! Callers pad rectangular problems with a large sentinel; an assignment
//! into sentinel cells means "leave unmatched".

/// Sentinel cost for padded or gated cells. Large enough to never be chosen
/// over a real candidate, small enough to keep the arithmetic stable.
pub const SENTINEL_COST: f64 = 1.0e6;

/// Solve the assignment problem on a square cost matrix.
///
/// Returns, for each row, the column it was assigned. The total assigned
/// cost is minimal. Panics in debug builds if the matrix is not square.
pub fn solve(cost: &[Vec<f64>]) -> Vec<usize> {
    let n = cost.len();
    if n == 0 {
        return Vec::new();
    }
    debug_assert!(cost.iter().all(|row| row.len() == n));

    // 1-indexed potentials over rows (u) and columns (v); p[j] is the row
    // currently matched to column j, p[0] the row being placed.
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Unwind the augmenting path.
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; n];
    for j in 1..=n {
        if p[j] > 0 {
            assignment[p[j] - 1] = j - 1;
        }
    }
    assignment
}
