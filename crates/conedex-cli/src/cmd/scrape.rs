//! Scrape subcommand - fetch shop/flavor pages and extract their titles

use std::time::Instant;

use anyhow::Result;
use clap::Args;
use conedex_core::{
    BatchError, BatchProcessor, BatchResult, Browser, BrowserHandle, HttpBrowser, HttpPage, Page,
    PageError, ProcessingOptions, SharedProgress, ShutdownFlag,
};
use serde::Serialize;

use super::BatchArgs;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
}

/// What we keep from each page
#[derive(Debug, Serialize)]
pub struct PageSummary {
    pub url: String,
    pub status: Option<u16>,
    pub title: Option<String>,
    pub bytes: usize,
}

pub fn run(
    args: ScrapeArgs,
    config: &Config,
    progress: &SharedProgress,
    shutdown: &ShutdownFlag,
) -> Result<u8> {
    let urls = args.batch.read_urls()?;
    let options = args.batch.options(&config.batch);
    let start = Instant::now();

    let outcome = super::runtime()?.block_on(async {
        let http = config.http.clone();
        let mut browser = BrowserHandle::new(move || HttpBrowser::launch(http.clone()));
        let outcome = scrape(&browser, urls, options, progress, shutdown).await;
        browser.shutdown().await;
        outcome
    });

    super::finish(
        "scrape",
        outcome,
        start.elapsed(),
        args.batch.output.as_deref(),
        shutdown,
    )
}

async fn scrape<B, L, Fut>(
    browser: &BrowserHandle<B, L>,
    urls: Vec<String>,
    options: ProcessingOptions,
    progress: &SharedProgress,
    shutdown: &ShutdownFlag,
) -> Result<BatchResult<String, PageSummary>, BatchError>
where
    B: Browser<Page = HttpPage>,
    L: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<B, PageError>>,
{
    let pb = progress.batch_bar("scrape", urls.len());
    let processor = BatchProcessor::new(options)?
        .with_progress(pb.clone())
        .with_shutdown(shutdown.clone());
    let browser = browser.get().await.map_err(BatchError::Browser)?;

    log::info!(
        "Scraping {} pages (batch size {}, concurrency {}, timeout {}ms)",
        urls.len(),
        options.batch_size,
        options.concurrency,
        options.timeout.as_millis()
    );
    let result = processor.run_pages(browser, urls, summarize_page).await;
    pb.finish_and_clear();
    Ok(result)
}

async fn summarize_page(page: HttpPage, url: String) -> Result<PageSummary, PageError> {
    page.goto(&url).await?;
    let body = page.content().await?;
    Ok(PageSummary {
        status: page.status(),
        title: page.title().await?,
        bytes: body.len(),
        url,
    })
}
