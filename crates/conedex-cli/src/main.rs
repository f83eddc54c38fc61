//! conedex - Bulk page processing for the ConeDex shop and flavor catalog
//!
//! Scrapes shop/flavor pages and checks link health with bounded
//! concurrency, emitting a JSON report of successes and failures.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conedex_core::{SharedProgress, ShutdownFlag, Verbosity};

mod cmd;
mod config;

use config::Config;

/// Exit code for errors that stop a command before it reports
const EXIT_FATAL: u8 = 1;

#[derive(Parser)]
#[command(name = "conedex")]
#[command(about = "Bulk page processing for the ConeDex catalog")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./conedex.toml or ~/.config/conedex/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch pages and extract their titles
    Scrape(cmd::scrape::ScrapeArgs),
    /// Check that URLs respond with a success status
    Check(cmd::check::CheckArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let progress = Arc::new(conedex_core::ProgressContext::new());

    // TTY: warn unless --debug, the bars show activity.
    // non-TTY: info, logs are the only progress indicator.
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let verbosity = Verbosity::from_flags(is_tty, cli.debug);
    if let Err(e) = conedex_core::init_logging(verbosity, multi) {
        eprintln!("failed to init logger: {e}");
    }

    let shutdown = ShutdownFlag::new();
    let outcome = setup_signal_handler(&shutdown).and_then(|()| run(cli, &progress, &shutdown));
    ExitCode::from(exit_code(outcome))
}

fn run(cli: Cli, progress: &SharedProgress, shutdown: &ShutdownFlag) -> Result<u8> {
    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Scrape(args) => cmd::scrape::run(args, &config, progress, shutdown),
        Command::Check(args) => cmd::check::run(args, &config, progress, shutdown),
        Command::Config => {
            print_config(&config);
            Ok(0)
        }
    }
}

fn exit_code(outcome: Result<u8>) -> u8 {
    outcome.unwrap_or_else(|e| {
        log::error!("Fatal error: {e:#}");
        EXIT_FATAL
    })
}

/// First signal: stop claiming new work. Second signal: exit immediately.
fn setup_signal_handler(shutdown: &ShutdownFlag) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::flag;

    for signal in [SIGINT, SIGTERM] {
        // Order matters: the conditional exit must see the flag before it is set.
        flag::register_conditional_shutdown(signal, 130, Arc::clone(shutdown.as_atomic()))
            .context("Failed to register signal handler")?;
        flag::register(signal, Arc::clone(shutdown.as_atomic()))
            .context("Failed to register signal handler")?;
    }
    Ok(())
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec![
        "Batch size",
        &conedex_core::fmt_num(config.batch.batch_size),
    ]);
    table.add_row(vec!["Concurrency", &config.batch.concurrency.to_string()]);
    table.add_row(vec![
        "Timeout",
        &format!("{}ms", config.batch.timeout.as_millis()),
    ]);
    table.add_row(vec!["User agent", &config.http.user_agent]);
    table.add_row(vec![
        "Connect timeout",
        &format!("{}s", config.http.connect_timeout_secs),
    ]);
    table.add_row(vec![
        "Idle connections/host",
        &config.http.max_idle_per_host.to_string(),
    ]);

    eprintln!("\n{table}");
}
