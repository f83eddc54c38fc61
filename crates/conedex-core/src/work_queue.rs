//! Lock-free work queue for distributing chunks across pool workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free work queue distributing items to workers.
///
/// Workers call [`next()`](WorkQueue::next) to atomically claim the next item.
/// Each item is handed out at most once; a worker that finds the queue
/// drained simply stops.
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
}

impl<S> WorkQueue<S> {
    pub fn new(items: Vec<S>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Split `items` into consecutive chunks of at most `chunk_size`.
    ///
    /// Each chunk is paired with its index so results can be attributed
    /// in logs even though chunks settle out of order.
    pub fn chunked(items: Vec<S>, chunk_size: usize) -> WorkQueue<(usize, Vec<S>)> {
        let chunk_size = chunk_size.max(1);
        let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
        let mut iter = items.into_iter().peekable();
        while iter.peek().is_some() {
            let chunk: Vec<S> = iter.by_ref().take(chunk_size).collect();
            chunks.push((chunks.len(), chunk));
        }
        log::debug!("{} chunks in work queue", chunks.len());
        WorkQueue::new(chunks)
    }

    /// Get next item to process (lock-free)
    pub fn next(&self) -> Option<&S> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i)
    }

    /// Items not yet claimed, in queue order
    pub fn remaining(&self) -> &[S] {
        let i = self.cursor.load(Ordering::Relaxed).min(self.items.len());
        &self.items[i..]
    }

    /// Total items in queue
    pub fn total(&self) -> usize {
        self.items.len()
    }
}
