//! Graceful shutdown support via a shared atomic flag

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shutdown flag handed to processors and signal handlers.
///
/// Cloning shares the same flag. Processors only check it before claiming
/// a new chunk; in-flight work is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown was requested
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Request shutdown; returns whether it had already been requested
    pub fn request(&self) -> bool {
        self.0.swap(true, Ordering::Relaxed)
    }

    /// Underlying atomic, for `signal_hook::flag`-style registration
    pub fn as_atomic(&self) -> &Arc<AtomicBool> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = ShutdownFlag::new();
        let other = flag.clone();
        assert!(!other.is_requested());
        assert!(!flag.request());
        assert!(other.is_requested());
        assert!(other.request());
    }
}
