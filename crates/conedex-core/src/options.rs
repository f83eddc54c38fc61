//! Processing options with documented defaults

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// Default number of items per chunk
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of chunks in flight
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default per-call timeout (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// How a batch is split up and scheduled.
///
/// Deserializes from a TOML/JSON table where the timeout is given in
/// milliseconds as `timeout_ms`; missing fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    /// Items per chunk handed to a handler (default 10)
    pub batch_size: usize,
    /// Maximum chunks in flight at once (default 3)
    pub concurrency: usize,
    /// Per-call timeout (default 30s)
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ProcessingOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject options no schedule can satisfy.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.batch_size == 0 {
            return Err(BatchError::InvalidOptions(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(BatchError::InvalidOptions(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(BatchError::InvalidOptions(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
