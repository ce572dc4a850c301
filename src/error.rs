//! Error types for the geoindex.

use flora_types::record::{PointKind, SubjectId};
use thiserror::Error;

/// Boxed error returned by external collaborators (dataset sources and
/// document stores).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum GeoIndexError {
    /// A single dataset row could not be turned into a record.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    /// The dataset body could not be fetched or read as a whole.
    #[error("could not ingest {kind} for subject [{subject}]: {source}")]
    IngestTransportFailure {
        subject: SubjectId,
        kind: PointKind,
        #[source]
        source: BoxError,
    },

    /// One covering-cell query failed during ranked aggregation.
    #[error("remote query for cell [{token}] failed: {source}")]
    RemoteQueryFailure {
        token: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GeoIndexError>;

impl GeoIndexError {
    /// Whether the error only affects one row and the build may continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GeoIndexError::MalformedRecord { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        let row = GeoIndexError::MalformedRecord {
            line: 3,
            reason: "latitude is not a number".into(),
        };
        assert!(row.is_recoverable());
        assert_eq!(
            row.to_string(),
            "malformed record at line 3: latitude is not a number"
        );

        let transport = GeoIndexError::IngestTransportFailure {
            subject: SubjectId::from("ugkG3de"),
            kind: PointKind::Predictions,
            source: "connection reset".into(),
        };
        assert!(!transport.is_recoverable());
        assert!(transport.to_string().contains("ugkG3de"));
    }
}
