//! Error types for stratotrack services.

use thiserror::Error;

/// Result type alias using TrackError.
pub type TrackResult<T> = Result<T, TrackError>;

/// Primary error type for tracking operations.
#[derive(Debug, Error)]
pub enum TrackError {
    // === Upstream feed ===
    #[error("Upstream feed unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream feed returned corrupt data: {0}")]
    UpstreamCorrupt(String),

    // === Wind provider ===
    #[error("Wind provider rate limited")]
    WindRateLimited,

    #[error("Wind data unavailable: {0}")]
    WindUnavailable(String),

    // === Storage ===
    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    #[error("Store read failed: {0}")]
    StoreReadFailed(String),

    // === Client-visible ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Request timeout")]
    Timeout,

    // === Infrastructure ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrackError {
    /// Short machine-readable kind for API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackError::UpstreamUnavailable(_) => "upstream_unavailable",
            TrackError::UpstreamCorrupt(_) => "upstream_corrupt",
            TrackError::WindRateLimited => "wind_rate_limited",
            TrackError::WindUnavailable(_) => "wind_unavailable",
            TrackError::StoreWriteFailed(_) => "store_write_failed",
            TrackError::StoreReadFailed(_) => "store_read_failed",
            TrackError::NotFound(_) => "not_found",
            TrackError::InvalidArgument(_) => "invalid_argument",
            TrackError::Timeout => "timeout",
            TrackError::Internal(_) => "internal",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TrackError::InvalidArgument(_) => 400,
            TrackError::NotFound(_) => 404,
            TrackError::WindRateLimited => 429,
            TrackError::UpstreamUnavailable(_) | TrackError::UpstreamCorrupt(_) => 502,
            TrackError::WindUnavailable(_)
            | TrackError::StoreWriteFailed(_)
            | TrackError::StoreReadFailed(_) => 503,
            TrackError::Timeout => 504,
            TrackError::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for TrackError {
    fn from(err: serde_json::Error) -> Self {
        TrackError::Internal(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(TrackError::InvalidArgument("x".into()).http_status_code(), 400);
        assert_eq!(TrackError::NotFound("x".into()).http_status_code(), 404);
        assert_eq!(TrackError::WindRateLimited.http_status_code(), 429);
        assert_eq!(TrackError::UpstreamUnavailable("x".into()).http_status_code(), 502);
        assert_eq!(TrackError::StoreWriteFailed("x".into()).http_status_code(), 503);
        assert_eq!(TrackError::Timeout.http_status_code(), 504);
    }
}
