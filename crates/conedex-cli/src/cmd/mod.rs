//! Subcommands and the plumbing they share

pub mod check;
pub mod scrape;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use conedex_core::{BatchError, BatchResult, ProcessingOptions, ShutdownFlag, respond};
use serde::Serialize;

/// Batch flags shared by every processing subcommand
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// File with one URL per line ("-" for stdin)
    pub input: PathBuf,

    /// Items per chunk
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Chunks processed at once
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Per-item timeout in milliseconds
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl BatchArgs {
    /// Config-file options with command-line overrides applied
    pub fn options(&self, defaults: &ProcessingOptions) -> ProcessingOptions {
        let mut options = *defaults;
        if let Some(batch_size) = self.batch_size {
            options.batch_size = batch_size;
        }
        if let Some(concurrency) = self.concurrency {
            options.concurrency = concurrency;
        }
        if let Some(ms) = self.timeout_ms {
            options.timeout = Duration::from_millis(ms);
        }
        options
    }

    pub fn read_urls(&self) -> Result<Vec<String>> {
        let text = if self.input == Path::new("-") {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read URLs from stdin")?;
            text
        } else {
            std::fs::read_to_string(&self.input)
                .with_context(|| format!("Failed to read URL list: {}", self.input.display()))?
        };
        let urls = parse_url_list(&text);
        log::info!("Loaded {} URLs", urls.len());
        Ok(urls)
    }
}

/// One URL per line; blank lines and `#` comments are skipped.
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Runtime for one command invocation.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")
}

/// Log the summary, emit the JSON report and pick the exit code.
///
/// Exit codes: 0 when the batch ran (even with failed items), 1 for a setup
/// error, 130 when interrupted.
pub fn finish<R: Serialize>(
    label: &str,
    outcome: Result<BatchResult<String, R>, BatchError>,
    elapsed: Duration,
    output: Option<&Path>,
    shutdown: &ShutdownFlag,
) -> Result<u8> {
    let json = render_report(&outcome)?;
    match output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            log::info!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }

    match &outcome {
        Ok(result) => result.summary().log(label, elapsed),
        Err(e) => {
            log::error!("{label} failed: {e}");
            return Ok(1);
        }
    }

    if shutdown.is_requested() {
        log::warn!("{label} interrupted");
        return Ok(130);
    }
    Ok(0)
}

/// JSON report: the response body plus status, summary and timestamp.
fn render_report<R: Serialize>(outcome: &Result<BatchResult<String, R>, BatchError>) -> Result<String> {
    let (status, mut body) = respond(outcome);
    if let Some(obj) = body.as_object_mut() {
        obj.insert("status".to_string(), status.into());
        obj.insert(
            "generated_at".to_string(),
            chrono::Utc::now().to_rfc3339().into(),
        );
        if let Ok(result) = outcome {
            obj.insert("summary".to_string(), serde_json::to_value(result.summary())?);
        }
    }
    serde_json::to_string_pretty(&body).context("Failed to render report")
}
