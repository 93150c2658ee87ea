//! End-to-end tracking scenarios over synthetic constellations.

use chrono::{DateTime, TimeZone, Utc};

use strato_common::geo::{haversine_km, project_forward};
use strato_common::{BalloonStatus, RawObservation, TrackedPosition};
use tracker::{track, IdAllocator, SegmentHistory};

fn hour(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, h, 0, 0).unwrap()
}

fn obs(lat: f64, lon: f64, alt: f64) -> RawObservation {
    RawObservation::new(lat, lon, alt)
}

#[test]
fn first_hour_mints_everything_with_full_confidence() {
    let current = vec![obs(10.0, 20.0, 18.0), obs(-35.0, 140.0, 12.0)];
    let mut ids = IdAllocator::new(0);

    let tracked = track(hour(0), &current, &[], &SegmentHistory::new(), &mut ids);

    assert_eq!(tracked.len(), 2);
    for pos in &tracked {
        assert_eq!(pos.status, BalloonStatus::New);
        assert_eq!(pos.confidence, 1.0);
        assert!(pos.speed_kmh.is_none());
        assert!(pos.heading_deg.is_none());
    }
    assert_eq!(tracked[0].balloon_id, "balloon_0000");
    assert_eq!(tracked[1].balloon_id, "balloon_0001");
}

#[test]
fn modest_drift_preserves_identity() {
    let mut ids = IdAllocator::new(0);
    let start = vec![obs(10.0, 20.0, 18.0), obs(40.0, -100.0, 15.0)];
    let first = track(hour(0), &start, &[], &SegmentHistory::new(), &mut ids);
    let history = tracker::advance_history(&SegmentHistory::new(), &first);

    // Each balloon drifts ~110 km.
    let moved = vec![obs(10.0, 21.0, 18.2), obs(40.0, -99.0, 15.1)];
    let second = track(hour(1), &moved, &first, &history, &mut ids);

    assert_eq!(second.len(), 2);
    let by_lon: Vec<_> = {
        let mut v = second.clone();
        v.sort_by(|a, b| a.lon.total_cmp(&b.lon));
        v
    };
    assert_eq!(by_lon[0].balloon_id, "balloon_0001"); // -99
    assert_eq!(by_lon[1].balloon_id, "balloon_0000"); // 21
    for pos in &second {
        assert_eq!(pos.status, BalloonStatus::Active);
        assert!(pos.speed_kmh.unwrap() > 90.0 && pos.speed_kmh.unwrap() < 130.0);
        assert!(pos.confidence > 0.3);
    }
}

#[test]
fn long_jumps_mint_new_ids_and_do_not_reemit_old_ones() {
    let mut ids = IdAllocator::new(0);
    let start = vec![
        obs(0.0, 0.0, 18.0),
        obs(0.0, 20.0, 18.0),
        obs(0.0, 40.0, 18.0),
    ];
    let first = track(hour(0), &start, &[], &SegmentHistory::new(), &mut ids);

    // All three jump ~800 km east: beyond the hard distance gate.
    let jumped = vec![
        obs(0.0, 7.2, 18.0),
        obs(0.0, 27.2, 18.0),
        obs(0.0, 47.2, 18.0),
    ];
    let second = track(hour(1), &jumped, &first, &SegmentHistory::new(), &mut ids);

    assert_eq!(second.len(), 3);
    let old_ids: Vec<&str> = first.iter().map(|p| p.balloon_id.as_str()).collect();
    for pos in &second {
        assert_eq!(pos.status, BalloonStatus::New);
        assert_eq!(pos.confidence, 0.5);
        assert!(!old_ids.contains(&pos.balloon_id.as_str()));
    }
}

#[test]
fn opposing_headings_prevent_identity_swap() {
    // A heads east, B heads west, 200 km apart; an hour later both current
    // observations sit near the midpoint, ~100 km from each previous point.
    let prev = vec![
        TrackedPosition {
            balloon_id: "balloon_0000".to_string(),
            ts: hour(0),
            lat: 0.2,
            lon: 0.0,
            alt_km: 18.0,
            speed_kmh: Some(100.0),
            heading_deg: Some(90.0),
            status: BalloonStatus::Active,
            confidence: 0.9,
        },
        TrackedPosition {
            balloon_id: "balloon_0001".to_string(),
            ts: hour(0),
            lat: -0.2,
            lon: 1.8,
            alt_km: 18.0,
            speed_kmh: Some(100.0),
            heading_deg: Some(270.0),
            status: BalloonStatus::Active,
            confidence: 0.9,
        },
    ];

    let current = vec![
        obs(0.2, 0.9, 18.0),  // continuation of A
        obs(-0.2, 0.9, 18.0), // continuation of B
    ];

    let mut ids = IdAllocator::new(2);
    let tracked = track(hour(1), &current, &prev, &SegmentHistory::new(), &mut ids);

    assert_eq!(tracked.len(), 2);
    assert_eq!(tracked[0].balloon_id, "balloon_0000");
    assert_eq!(tracked[1].balloon_id, "balloon_0001");
    assert_eq!(tracked[0].status, BalloonStatus::Active);
    assert_eq!(tracked[1].status, BalloonStatus::Active);
}

#[test]
fn altitude_jump_breaks_continuity() {
    let mut ids = IdAllocator::new(0);
    let first = track(hour(0), &[obs(10.0, 20.0, 12.0)], &[], &SegmentHistory::new(), &mut ids);

    // Same spot, 12 km higher: gated.
    let second = track(
        hour(1),
        &[obs(10.0, 20.1, 24.0)],
        &first,
        &SegmentHistory::new(),
        &mut ids,
    );

    assert_eq!(second[0].status, BalloonStatus::New);
    assert_ne!(second[0].balloon_id, first[0].balloon_id);
}

#[test]
fn contested_best_candidate_resolves_via_assignment() {
    let mut ids = IdAllocator::new(0);
    let first = track(hour(0), &[obs(0.0, 0.0, 18.0)], &[], &SegmentHistory::new(), &mut ids);

    // Two observations both closest to the single previous balloon: the
    // greedy phase must defer, and the assignment phase gives the id to
    // exactly one of them.
    let current = vec![obs(0.0, 0.3, 18.0), obs(0.0, -0.3, 18.0)];
    let second = track(hour(1), &current, &first, &SegmentHistory::new(), &mut ids);

    let active: Vec<_> = second.iter().filter(|p| p.status == BalloonStatus::Active).collect();
    let minted: Vec<_> = second.iter().filter(|p| p.status == BalloonStatus::New).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(minted.len(), 1);
    assert_eq!(active[0].balloon_id, first[0].balloon_id);
}

#[test]
fn hard_gates_hold_over_consecutive_positions() {
    let mut ids = IdAllocator::new(0);
    let mut history = SegmentHistory::new();

    // A small constellation drifting eastward at varied speeds.
    let mut prev: Vec<TrackedPosition> = Vec::new();
    let mut positions: Vec<(f64, f64, f64)> = vec![
        (10.0, 0.0, 18.0),
        (12.0, 30.0, 16.0),
        (-8.0, 60.0, 20.0),
        (45.0, -120.0, 14.0),
    ];

    for h in 0..6u32 {
        let current: Vec<RawObservation> =
            positions.iter().map(|&(lat, lon, alt)| obs(lat, lon, alt)).collect();
        let tracked = track(hour(h), &current, &prev, &history, &mut ids);

        // Matched segments never violate the gates.
        for pos in &tracked {
            if let Some(previous) = prev.iter().find(|p| p.balloon_id == pos.balloon_id) {
                let d = haversine_km(previous.lat, previous.lon, pos.lat, pos.lon);
                assert!(d <= 600.0, "distance gate violated: {}", d);
                assert!((pos.alt_km - previous.alt_km).abs() <= 10.0);
            }
        }

        history = tracker::advance_history(&history, &tracked);
        prev = tracked;

        // Advance each balloon ~120 km east with small altitude wobble.
        positions = positions
            .iter()
            .map(|&(lat, lon, alt)| {
                let (nlat, nlon) = project_forward(lat, lon, 90.0, 120.0);
                (nlat, nlon, alt + 0.2)
            })
            .collect();
    }

    // Six hours of steady drift never re-minted ids.
    assert_eq!(ids.peek(), 4);
}
