//! Error types for batch processing

use std::time::Duration;

/// Setup error that aborts a whole batch call.
///
/// Per-item failures never surface as `BatchError`; they are recorded in
/// [`BatchResult::errors`](crate::BatchResult) instead.
#[derive(Debug)]
pub enum BatchError {
    /// Options rejected at the boundary (zero batch size, zero concurrency, ...)
    InvalidOptions(String),
    /// The shared browser could not be launched
    Browser(PageError),
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOptions(msg) => write!(f, "invalid options: {msg}"),
            Self::Browser(e) => write!(f, "browser unavailable: {e}"),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidOptions(_) => None,
            Self::Browser(e) => Some(e),
        }
    }
}

/// Why a single item (or every item of a chunk) ended up in `errors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemFailure {
    /// Handler returned an error; holds its display message
    Handler(String),
    /// Handler did not settle within the configured timeout
    Timeout(Duration),
    /// Never started because shutdown was requested
    Shutdown,
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handler(msg) => f.write_str(msg),
            Self::Timeout(d) => write!(f, "timed out after {}ms", d.as_millis()),
            Self::Shutdown => f.write_str("skipped: shutdown requested"),
        }
    }
}

impl std::error::Error for ItemFailure {}

impl ItemFailure {
    pub fn handler(e: impl std::fmt::Display) -> Self {
        Self::Handler(e.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Error from a browser page operation.
#[derive(Debug)]
pub enum PageError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Page was used after `close()`
    Closed,
    /// `content()`/`title()` called before a successful `goto()`
    NotLoaded,
    /// Browser could not be started
    Launch(String),
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Closed => f.write_str("page already closed"),
            Self::NotLoaded => f.write_str("page has no document loaded"),
            Self::Launch(msg) => write!(f, "launch failed: {msg}"),
        }
    }
}

impl std::error::Error for PageError {}

impl PageError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}
