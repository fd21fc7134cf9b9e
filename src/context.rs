//! Per-operation context carried into every store call.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Context for a single store operation.
///
/// `start_time` is the operation's logical clock: every time-dependent lease
/// transition is projected from it, so expiry is deterministic per request
/// and replayable in tests.
#[derive(Debug, Clone)]
pub struct Context {
    /// Correlation id supplied by the caller, attached to errors.
    pub request_id: String,
    /// Logical clock for this operation.
    pub start_time: DateTime<Utc>,
}

impl Context {
    /// Creates a context with the given logical clock and a fresh request id.
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            start_time,
        }
    }

    /// Creates a context with an explicit request id.
    pub fn with_request_id(start_time: DateTime<Utc>, request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            start_time,
        }
    }
}

/// Formats a timestamp as an Azure snapshot identifier
/// (ISO 8601 with a 7-digit fraction, e.g. `2024-01-27T12:34:56.1234567Z`).
pub fn format_snapshot_time(dt: &DateTime<Utc>) -> String {
    format!(
        "{}.{:07}Z",
        dt.format("%Y-%m-%dT%H:%M:%S"),
        dt.timestamp_subsec_nanos() / 100
    )
}

/// Formats a timestamp for a TEXT datetime column.
pub fn format_db_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a TEXT datetime column back into an instant.
pub fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
