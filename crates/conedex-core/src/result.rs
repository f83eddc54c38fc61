//! Partitioned outcome of one batch call

use serde::Serialize;

use crate::error::ItemFailure;

/// An item that failed, with the reason rendered as a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemError<T> {
    pub item: T,
    pub message: String,
    #[serde(skip)]
    pub failure: ItemFailure,
}

impl<T> ItemError<T> {
    pub fn new(item: T, failure: ItemFailure) -> Self {
        Self {
            item,
            message: failure.to_string(),
            failure,
        }
    }
}

/// Successes and failures accumulated over one call.
///
/// Serializes as `{"results": [...], "errors": [{"item": ..., "message": ...}]}`.
/// Order within either list is completion order, not input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult<T, R> {
    pub results: Vec<R>,
    pub errors: Vec<ItemError<T>>,
}

impl<T, R> Default for BatchResult<T, R> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T, R> BatchResult<T, R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&mut self, result: R) {
        self.results.push(result);
    }

    pub fn push_error(&mut self, item: T, failure: ItemFailure) {
        self.errors.push(ItemError::new(item, failure));
    }

    /// Record the same failure for every item of a chunk
    pub fn push_chunk_error(&mut self, chunk: Vec<T>, failure: &ItemFailure) {
        self.errors
            .extend(chunk.into_iter().map(|item| ItemError::new(item, failure.clone())));
    }

    /// Items accounted for (successes + failures)
    pub fn len(&self) -> usize {
        self.results.len() + self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when no item failed
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn summary(&self) -> BatchSummary {
        let timed_out = self
            .errors
            .iter()
            .filter(|e| e.failure.is_timeout())
            .count();
        let skipped = self
            .errors
            .iter()
            .filter(|e| e.failure == ItemFailure::Shutdown)
            .count();
        BatchSummary {
            total: self.len(),
            succeeded: self.results.len(),
            failed: self.errors.len() - timed_out - skipped,
            timed_out,
            skipped,
        }
    }
}

/// Counts derived from a [`BatchResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Handler errors (excludes timeouts and skips)
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
}

impl BatchSummary {
    /// Log summary at the end of a run
    pub fn log(&self, label: &str, elapsed: std::time::Duration) {
        log::info!(
            "{label}: {}/{} succeeded ({} failed, {} timed out, {} skipped) in {:.1}s",
            self.succeeded,
            self.total,
            self.failed,
            self.timed_out,
            self.skipped,
            elapsed.as_secs_f64()
        );
        if self.total > 0 && !elapsed.is_zero() {
            let per_sec = self.total as f64 / elapsed.as_secs_f64();
            log::info!("{label}: throughput {per_sec:.1} items/sec");
        }
    }
}
