//! ConeDex Core - Bounded-concurrency batch processing
//!
//! Runs caller-supplied async handlers over lists of work items (shop
//! pages, flavor records, bulk updates) without overwhelming the
//! downstream resource, and reports which items succeeded and which failed.

pub mod error;
pub mod http;
pub mod logging;
pub mod options;
pub mod processor;
pub mod progress;
pub mod report;
pub mod result;
pub mod shutdown;
pub mod web;
pub mod work_queue;

// Re-exports for convenience
pub use error::{BatchError, ItemFailure, PageError};
pub use http::{HttpBrowser, HttpConfig, HttpPage};
pub use logging::{IndicatifLogger, Verbosity, init_logging};
pub use options::ProcessingOptions;
pub use processor::{BatchProcessor, process_batch, process_items};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use report::respond;
pub use result::{BatchResult, BatchSummary, ItemError};
pub use shutdown::ShutdownFlag;
pub use web::{Browser, BrowserHandle, Page, process_web_pages};
