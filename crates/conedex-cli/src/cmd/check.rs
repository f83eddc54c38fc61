//! Check subcommand - verify that listed URLs respond with a success status

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use conedex_core::{BatchError, BatchProcessor, PageError, SharedProgress, ShutdownFlag};
use serde::Serialize;

use super::BatchArgs;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
}

/// Outcome of one reachable URL
#[derive(Debug, Serialize)]
pub struct LinkStatus {
    pub url: String,
    pub status: u16,
    pub elapsed_ms: u64,
}

pub fn run(
    args: CheckArgs,
    config: &Config,
    progress: &SharedProgress,
    shutdown: &ShutdownFlag,
) -> Result<u8> {
    let urls = args.batch.read_urls()?;
    let options = args.batch.options(&config.batch);
    let client = config
        .http
        .client()
        .context("Failed to build HTTP client")?;
    let start = Instant::now();

    let outcome = super::runtime()?.block_on(async {
        let pb = progress.batch_bar("check", urls.len());
        let processor = BatchProcessor::new(options)?
            .with_progress(pb.clone())
            .with_shutdown(shutdown.clone());
        let client = &client;
        let result = processor
            .run_items(urls, |url: String| async move { check_url(client, url).await })
            .await;
        pb.finish_and_clear();
        Ok::<_, BatchError>(result)
    });

    super::finish(
        "check",
        outcome,
        start.elapsed(),
        args.batch.output.as_deref(),
        shutdown,
    )
}

async fn check_url(client: &reqwest::Client, url: String) -> Result<LinkStatus, PageError> {
    let start = Instant::now();
    let response = client
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| PageError::from_reqwest(&e))?;
    Ok(LinkStatus {
        status: response.status().as_u16(),
        elapsed_ms: start.elapsed().as_millis() as u64,
        url,
    })
}
