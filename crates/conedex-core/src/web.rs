//! One-page-per-URL processing on top of [`BatchProcessor`]
//!
//! A [`Browser`] hands out [`Page`]s; each URL gets a fresh page which is
//! closed on every exit path (success, handler error, timeout) before the
//! outcome is recorded.

use std::fmt::Display;
use std::future::Future;

use futures_util::future::join_all;
use tokio::sync::OnceCell;

use crate::error::{BatchError, ItemFailure, PageError};
use crate::options::ProcessingOptions;
use crate::processor::BatchProcessor;
use crate::result::BatchResult;

/// A single browser tab.
///
/// Handles are cheap to clone and share one underlying tab; `close` ends it
/// for every clone.
pub trait Page: Clone {
    /// Navigate to `url` and load the document
    fn goto(&self, url: &str) -> impl Future<Output = Result<(), PageError>>;

    /// Raw document body of the last successful navigation
    fn content(&self) -> impl Future<Output = Result<String, PageError>>;

    /// Document `<title>`, if any
    fn title(&self) -> impl Future<Output = Result<Option<String>, PageError>>;

    fn close(self) -> impl Future<Output = Result<(), PageError>>;
}

/// Source of pages (a headless browser, an HTTP client, a test double).
pub trait Browser {
    type Page: Page;

    fn new_page(&self) -> impl Future<Output = Result<Self::Page, PageError>>;

    /// Release browser-wide resources
    fn shutdown(&self) -> impl Future<Output = ()>;
}

/// Lazily launched browser shared across batch calls.
///
/// The browser is started on the first [`get`](BrowserHandle::get) and
/// released by [`shutdown`](BrowserHandle::shutdown). Pass the handle to
/// whoever needs it; there is no process-wide instance.
pub struct BrowserHandle<B, L> {
    launch: L,
    browser: OnceCell<B>,
}

impl<B, L, Fut> BrowserHandle<B, L>
where
    B: Browser,
    L: Fn() -> Fut,
    Fut: Future<Output = Result<B, PageError>>,
{
    pub fn new(launch: L) -> Self {
        Self {
            launch,
            browser: OnceCell::new(),
        }
    }

    /// Launch on first use, then return the shared browser.
    ///
    /// A failed launch leaves the handle empty so the next call retries.
    pub async fn get(&self) -> Result<&B, PageError> {
        self.browser
            .get_or_try_init(|| {
                log::debug!("launching browser");
                (self.launch)()
            })
            .await
    }

    pub fn is_launched(&self) -> bool {
        self.browser.initialized()
    }

    /// Shut the browser down if it was ever launched.
    pub async fn shutdown(&mut self) {
        if let Some(browser) = self.browser.take() {
            browser.shutdown().await;
            log::debug!("browser shut down");
        }
    }
}

impl BatchProcessor {
    /// Open one page per URL and run `page_processor(page, url)` on it.
    ///
    /// Opening the page and running the processor are each bounded by the
    /// configured timeout. A page that fails to close is logged and does
    /// not change the recorded outcome.
    pub async fn run_pages<B, R, E, F, Fut>(
        &self,
        browser: &B,
        urls: Vec<String>,
        page_processor: F,
    ) -> BatchResult<String, R>
    where
        B: Browser,
        E: Display,
        F: Fn(B::Page, String) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let page_processor = &page_processor;
        let timeout = self.timeout();
        self.drive(urls, move |chunk: Vec<String>| async move {
            let settled = join_all(chunk.into_iter().map(move |url| async move {
                let outcome = visit(browser, &url, page_processor, timeout).await;
                (url, outcome)
            }))
            .await;

            let mut out = BatchResult::new();
            for (url, outcome) in settled {
                match outcome {
                    Ok(value) => out.push_result(value),
                    Err(failure) => out.push_error(url, failure),
                }
            }
            out
        })
        .await
    }
}

async fn visit<B, R, E, F, Fut>(
    browser: &B,
    url: &str,
    page_processor: &F,
    timeout: std::time::Duration,
) -> Result<R, ItemFailure>
where
    B: Browser,
    E: Display,
    F: Fn(B::Page, String) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let page = match tokio::time::timeout(timeout, browser.new_page()).await {
        Ok(Ok(page)) => page,
        Ok(Err(e)) => return Err(ItemFailure::Handler(format!("open page: {e}"))),
        Err(_) => return Err(ItemFailure::Timeout(timeout)),
    };

    let outcome = tokio::time::timeout(timeout, page_processor(page.clone(), url.to_string())).await;

    if let Err(e) = page.close().await {
        log::warn!("failed to close page for {url}: {e}");
    }

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ItemFailure::handler(e)),
        Err(_) => Err(ItemFailure::Timeout(timeout)),
    }
}

/// Web-page batch call: validates options, launches the browser if needed,
/// then processes every URL.
///
/// Returns `Err` for invalid options or a browser that cannot be launched.
pub async fn process_web_pages<B, L, LFut, R, E, F, Fut>(
    browser: &BrowserHandle<B, L>,
    urls: Vec<String>,
    page_processor: F,
    options: ProcessingOptions,
) -> Result<BatchResult<String, R>, BatchError>
where
    B: Browser,
    L: Fn() -> LFut,
    LFut: Future<Output = Result<B, PageError>>,
    E: Display,
    F: Fn(B::Page, String) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let processor = BatchProcessor::new(options)?;
    let browser = browser.get().await.map_err(BatchError::Browser)?;
    Ok(processor.run_pages(browser, urls, page_processor).await)
}
