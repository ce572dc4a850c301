use serde::{Deserialize, Serialize};

/// Counters collected while parsing one dataset body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Rows read from the body, including rejected ones
    pub rows_read: usize,
    /// Rows that became records
    pub accepted: usize,
    /// Rows skipped as malformed
    pub rejected: usize,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&mut self) {
        self.rows_read += 1;
        self.accepted += 1;
    }

    pub fn record_rejected(&mut self) {
        self.rows_read += 1;
        self.rejected += 1;
    }
}

/// Shape of a built subject index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of distinct date keys
    pub date_keys: usize,
    /// Number of indexed points across all date keys
    pub total_points: usize,
    /// Largest number of points under a single date key
    pub largest_date_key: usize,
}
