pub mod auth;
pub mod error;
pub mod middleware;
pub mod posts;
pub mod users;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// Run blocking work (rusqlite, hashing) off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    })?
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Try RFC 3339 first, then parse as naive UTC and convert.
pub(crate) fn parse_timestamp(value: &str, context: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, quill_db::queries::SQLITE_DATETIME_FORMAT)
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {}: {}", value, context, e);
            DateTime::default()
        })
}

pub(crate) fn parse_uuid(value: &str, context: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt uuid '{}' on {}: {}", value, context, e);
        Uuid::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_sqlite_shape() {
        let ts = parse_timestamp("2026-08-06 10:15:30", "test");
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.second(), 30);
    }

    #[test]
    fn corrupt_timestamp_falls_back_to_default() {
        assert_eq!(parse_timestamp("not a date", "test"), DateTime::<Utc>::default());
    }
}
