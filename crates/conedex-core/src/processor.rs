//! Bounded-concurrency batch processor
//!
//! Items are split into chunks of `batch_size` and placed on a
//! [`WorkQueue`]. A pool of `concurrency` workers, all polled on the
//! calling task, claims chunks until the queue drains, so a new chunk
//! starts as soon as any in-flight chunk settles. Every handler call is
//! raced against the configured timeout. Failures are recorded per item
//! and never abort sibling work.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;
use indicatif::ProgressBar;

use crate::error::{BatchError, ItemFailure};
use crate::options::ProcessingOptions;
use crate::result::BatchResult;
use crate::shutdown::ShutdownFlag;
use crate::work_queue::WorkQueue;

/// Runs handlers over work items with validated [`ProcessingOptions`].
#[derive(Clone)]
pub struct BatchProcessor {
    options: ProcessingOptions,
    progress: Option<ProgressBar>,
    shutdown: Option<ShutdownFlag>,
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("options", &self.options)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl BatchProcessor {
    /// Create a processor, rejecting invalid options.
    pub fn new(options: ProcessingOptions) -> Result<Self, BatchError> {
        options.validate()?;
        Ok(Self {
            options,
            progress: None,
            shutdown: None,
        })
    }

    /// Advance `pb` by one for every settled item.
    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = Some(pb);
        self
    }

    /// Stop claiming chunks once `flag` is raised.
    pub fn with_shutdown(mut self, flag: ShutdownFlag) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    /// Call `handler` once per chunk.
    ///
    /// On success the returned values are appended to `results`. On error
    /// or timeout every item of the chunk is recorded in `errors` with the
    /// same message.
    pub async fn run_chunks<T, R, E, F, Fut>(&self, items: Vec<T>, handler: F) -> BatchResult<T, R>
    where
        T: Clone,
        E: Display,
        F: Fn(Vec<T>) -> Fut,
        Fut: Future<Output = Result<Vec<R>, E>>,
    {
        let timeout = self.options.timeout;
        let handler = &handler;
        self.drive(items, move |chunk: Vec<T>| async move {
            let mut out = BatchResult::new();
            match tokio::time::timeout(timeout, handler(chunk.clone())).await {
                Ok(Ok(values)) => out.results.extend(values),
                Ok(Err(e)) => out.push_chunk_error(chunk, &ItemFailure::handler(e)),
                Err(_) => out.push_chunk_error(chunk, &ItemFailure::Timeout(timeout)),
            }
            out
        })
        .await
    }

    /// Call `handler` once per item.
    ///
    /// Items of one chunk run concurrently; chunks are limited by
    /// `concurrency`. Each item is timed individually.
    pub async fn run_items<T, R, E, F, Fut>(&self, items: Vec<T>, handler: F) -> BatchResult<T, R>
    where
        T: Clone,
        E: Display,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let timeout = self.options.timeout;
        let handler = &handler;
        self.drive(items, move |chunk: Vec<T>| async move {
            let settled = join_all(chunk.into_iter().map(move |item| async move {
                let outcome = tokio::time::timeout(timeout, handler(item.clone())).await;
                (item, outcome)
            }))
            .await;

            let mut out = BatchResult::new();
            for (item, outcome) in settled {
                match outcome {
                    Ok(Ok(value)) => out.push_result(value),
                    Ok(Err(e)) => out.push_error(item, ItemFailure::handler(e)),
                    Err(_) => out.push_error(item, ItemFailure::Timeout(timeout)),
                }
            }
            out
        })
        .await
    }

    /// Pool loop shared by the chunk and item forms.
    pub(crate) async fn drive<T, R, F, Fut>(&self, items: Vec<T>, run_chunk: F) -> BatchResult<T, R>
    where
        T: Clone,
        F: Fn(Vec<T>) -> Fut,
        Fut: Future<Output = BatchResult<T, R>>,
    {
        let total = items.len();
        let queue = WorkQueue::chunked(items, self.options.batch_size);
        let workers = self.options.concurrency.min(queue.total());
        log::debug!(
            "processing {total} items in {} chunks with {workers} workers",
            queue.total()
        );

        let queue_ref = &queue;
        let run_chunk = &run_chunk;
        let partials = join_all(
            (0..workers).map(move |worker_id| self.worker(worker_id, queue_ref, run_chunk)),
        )
        .await;

        let mut merged = BatchResult::new();
        for partial in partials {
            merged.results.extend(partial.results);
            merged.errors.extend(partial.errors);
        }

        let unclaimed = queue.remaining();
        if !unclaimed.is_empty() {
            let skipped: usize = unclaimed.iter().map(|(_, chunk)| chunk.len()).sum();
            log::warn!("shutdown requested, skipping {skipped} unstarted items");
            for (_, chunk) in unclaimed {
                merged.push_chunk_error(chunk.clone(), &ItemFailure::Shutdown);
            }
            self.advance(skipped);
        }

        merged
    }

    async fn worker<T, R, F, Fut>(
        &self,
        worker_id: usize,
        queue: &WorkQueue<(usize, Vec<T>)>,
        run_chunk: &F,
    ) -> BatchResult<T, R>
    where
        T: Clone,
        F: Fn(Vec<T>) -> Fut,
        Fut: Future<Output = BatchResult<T, R>>,
    {
        let mut acc = BatchResult::new();
        loop {
            if self.shutdown_requested() {
                break;
            }
            let Some((chunk_idx, chunk)) = queue.next() else {
                break;
            };
            let len = chunk.len();
            log::trace!("worker {worker_id}: chunk {chunk_idx} ({len} items)");

            let out = run_chunk(chunk.clone()).await;
            for err in &out.errors {
                log::debug!("chunk {chunk_idx}: item failed: {}", err.message);
            }
            acc.results.extend(out.results);
            acc.errors.extend(out.errors);
            self.advance(len);
        }
        acc
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(ShutdownFlag::is_requested)
    }

    fn advance(&self, n: usize) {
        if let Some(pb) = &self.progress {
            pb.inc(n as u64);
        }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.options.timeout
    }
}

/// Chunk-level batch call with validated options.
///
/// Returns `Err` only for setup errors; handler failures land in
/// [`BatchResult::errors`].
pub async fn process_batch<T, R, E, F, Fut>(
    items: Vec<T>,
    handler: F,
    options: ProcessingOptions,
) -> Result<BatchResult<T, R>, BatchError>
where
    T: Clone,
    E: Display,
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = Result<Vec<R>, E>>,
{
    Ok(BatchProcessor::new(options)?.run_chunks(items, handler).await)
}

/// Item-level batch call with validated options.
pub async fn process_items<T, R, E, F, Fut>(
    items: Vec<T>,
    handler: F,
    options: ProcessingOptions,
) -> Result<BatchResult<T, R>, BatchError>
where
    T: Clone,
    E: Display,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    Ok(BatchProcessor::new(options)?.run_items(items, handler).await)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::{Instant, sleep};

    use super::*;

    fn opts(batch_size: usize, concurrency: usize) -> ProcessingOptions {
        ProcessingOptions::default()
            .with_batch_size(batch_size)
            .with_concurrency(concurrency)
    }

    fn sorted<R: Ord>(mut v: Vec<R>) -> Vec<R> {
        v.sort();
        v
    }

    #[tokio::test]
    async fn doubles_every_item() {
        let result = process_items(
            vec![1, 2, 3, 4],
            |x: i32| async move { Ok::<_, String>(x * 2) },
            opts(2, 2),
        )
        .await
        .unwrap();
        assert_eq!(sorted(result.results), vec![2, 4, 6, 8]);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn single_failure_is_isolated() {
        let result = process_items(
            vec!["a", "bad", "c"],
            |s: &'static str| async move {
                if s == "bad" {
                    Err("boom".to_string())
                } else {
                    Ok(s.to_uppercase())
                }
            },
            ProcessingOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].item, "bad");
        assert_eq!(result.errors[0].message, "boom");
        assert_eq!(sorted(result.results), vec!["A", "C"]);
    }

    #[tokio::test]
    async fn every_item_accounted_for() {
        for n in [0usize, 1, 7, 10, 23] {
            let items: Vec<usize> = (0..n).collect();
            let result = process_items(
                items,
                |x: usize| async move {
                    if x % 3 == 0 {
                        Err(format!("multiple of three: {x}"))
                    } else {
                        Ok(x)
                    }
                },
                opts(4, 3),
            )
            .await
            .unwrap();
            assert_eq!(result.len(), n, "n = {n}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_one_runs_chunks_sequentially() {
        let spans: Mutex<Vec<(Instant, Instant)>> = Mutex::new(Vec::new());
        let spans_ref = &spans;
        let result = process_batch(
            (0..6).collect::<Vec<u32>>(),
            |chunk: Vec<u32>| async move {
                let start = Instant::now();
                sleep(Duration::from_millis(10)).await;
                spans_ref.lock().unwrap().push((start, Instant::now()));
                Ok::<_, String>(chunk)
            },
            opts(2, 1),
        )
        .await
        .unwrap();

        assert_eq!(result.results.len(), 6);
        let mut spans = spans.into_inner().unwrap();
        assert_eq!(spans.len(), 3);
        spans.sort();
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "chunks overlapped: {pair:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_chunks_never_exceed_concurrency() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let (active_ref, peak_ref) = (&active, &peak);
        let result = process_batch(
            (0..20).collect::<Vec<u32>>(),
            |chunk: Vec<u32>| async move {
                let now = active_ref.fetch_add(1, Ordering::SeqCst) + 1;
                peak_ref.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(5)).await;
                active_ref.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(chunk)
            },
            opts(2, 3),
        )
        .await
        .unwrap();

        assert_eq!(result.results.len(), 20);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_item_times_out() {
        let timeout = Duration::from_millis(100);
        let start = Instant::now();
        let result = process_items(
            vec![1, 2, 3],
            |x: u32| async move {
                if x == 2 {
                    std::future::pending::<()>().await;
                }
                Ok::<_, String>(x)
            },
            opts(3, 1).with_timeout(timeout),
        )
        .await
        .unwrap();

        assert!(start.elapsed() < timeout + Duration::from_millis(20));
        assert_eq!(sorted(result.results), vec![1, 3]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].item, 2);
        assert_eq!(result.errors[0].message, "timed out after 100ms");
        assert!(result.errors[0].failure.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_chunk_times_out_as_a_whole() {
        let timeout = Duration::from_millis(250);
        let start = Instant::now();
        let result = process_batch(
            (0..6).collect::<Vec<u32>>(),
            |chunk: Vec<u32>| async move {
                if chunk.contains(&2) {
                    std::future::pending::<()>().await;
                }
                Ok::<_, String>(chunk.into_iter().map(|x| x * 10).collect::<Vec<_>>())
            },
            opts(2, 3).with_timeout(timeout),
        )
        .await
        .unwrap();

        assert!(start.elapsed() < timeout + Duration::from_millis(20));
        assert_eq!(sorted(result.results), vec![0, 10, 40, 50]);
        assert_eq!(sorted(result.errors.iter().map(|e| e.item).collect::<Vec<_>>()), vec![2, 3]);
        for error in &result.errors {
            assert!(error.failure.is_timeout());
            assert_eq!(error.message, "timed out after 250ms");
        }
    }

    #[tokio::test]
    async fn failed_chunk_records_every_item() {
        let result = process_batch(
            vec![1, 2, 3, 4, 5],
            |chunk: Vec<u32>| async move {
                if chunk.contains(&3) {
                    Err("chunk rejected")
                } else {
                    Ok(chunk)
                }
            },
            opts(2, 2),
        )
        .await
        .unwrap();

        assert_eq!(sorted(result.results), vec![1, 2, 5]);
        let mut failed: Vec<u32> = result.errors.iter().map(|e| e.item).collect();
        failed.sort();
        assert_eq!(failed, vec![3, 4]);
        assert!(result.errors.iter().all(|e| e.message == "chunk rejected"));
    }

    #[tokio::test]
    async fn invalid_options_rejected_before_any_call() {
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;
        let err = process_items(
            vec![1, 2],
            |x: u32| async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(x)
            },
            opts(0, 1),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BatchError::InvalidOptions(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shutdown_before_start_skips_everything() {
        let flag = ShutdownFlag::new();
        flag.request();
        let processor = BatchProcessor::new(opts(2, 2)).unwrap().with_shutdown(flag);
        let result = processor
            .run_items(vec![1, 2, 3], |x: u32| async move { Ok::<_, String>(x) })
            .await;

        assert!(result.results.is_empty());
        assert_eq!(result.errors.len(), 3);
        assert_eq!(result.summary().skipped, 3);
    }

    #[tokio::test]
    async fn shutdown_mid_run_keeps_started_work() {
        let flag = ShutdownFlag::new();
        let flag_ref = &flag;
        let processor = BatchProcessor::new(opts(1, 1))
            .unwrap()
            .with_shutdown(flag.clone());
        let result = processor
            .run_items(vec![1, 2, 3, 4], |x: u32| async move {
                if x == 2 {
                    flag_ref.request();
                }
                Ok::<_, String>(x)
            })
            .await;

        assert_eq!(sorted(result.results), vec![1, 2]);
        let mut skipped: Vec<u32> = result.errors.iter().map(|e| e.item).collect();
        skipped.sort();
        assert_eq!(skipped, vec![3, 4]);
        assert!(result.errors.iter().all(|e| e.failure == ItemFailure::Shutdown));
    }

    #[tokio::test]
    async fn progress_bar_counts_items() {
        let pb = ProgressBar::hidden();
        let processor = BatchProcessor::new(opts(3, 2))
            .unwrap()
            .with_progress(pb.clone());
        processor
            .run_items((0..8).collect::<Vec<u32>>(), |x: u32| async move {
                Ok::<_, String>(x)
            })
            .await;
        assert_eq!(pb.position(), 8);
    }
}
