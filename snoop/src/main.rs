//! # snoop - Main Entry Point
//!
//! Parses the command line, runs the pre-flight checks, then traces in the
//! foreground until Ctrl-C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::signal::unix::{signal, SignalKind};

use snoop::cli::Args;
use snoop::lifecycle::AyaOpener;
use snoop::orchestrator::{self, ExitReason, RunSummary};
use snoop::preflight::run_preflight_checks;
use snoop::sink::{ConsoleSink, JsonSink};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Help, version and usage errors all exit cleanly
            let _ = e.print();
            std::process::exit(EXIT_SUCCESS);
        }
    };

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    std::process::exit(match run(args) {
        Ok(RunSummary { exit: ExitReason::Shutdown, .. }) => EXIT_SUCCESS,
        Ok(RunSummary { exit: ExitReason::PollFailure(_), .. }) => EXIT_ERROR,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

#[tokio::main]
async fn run(args: Args) -> Result<RunSummary> {
    run_preflight_checks()?;

    let config = args.trace_config();
    info!("snoop v{}", env!("CARGO_PKG_VERSION"));
    info!("object: {}", config.object.display());

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_listeners(&shutdown)?;

    let started = Instant::now();
    let summary = if args.json {
        orchestrator::run(&AyaOpener, &config, JsonSink::new(io::stdout()), &shutdown).await
    } else {
        orchestrator::run(&AyaOpener, &config, ConsoleSink::new(io::stdout()), &shutdown).await
    }
    .with_context(|| format!("Failed to trace with {}", config.object.display()))?;

    let stats = &summary.stats;
    let reason = match &summary.exit {
        ExitReason::Shutdown => "interrupted",
        ExitReason::PollFailure(e) => {
            error!("Poll loop failed: {e}");
            "failed"
        }
    };
    eprintln!(
        "\n{reason}: {:.1}s, {} records ({} shown, {} suppressed, {} undecodable, {} lost)",
        started.elapsed().as_secs_f64(),
        stats.records,
        stats.emitted,
        stats.suppressed,
        stats.decode_errors,
        stats.lost,
    );

    Ok(summary)
}

/// SIGINT and SIGTERM raise `shutdown`; the poll loop checks it between polls
fn spawn_signal_listeners(shutdown: &Arc<AtomicBool>) -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    let flag = Arc::clone(shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    let flag = Arc::clone(shutdown);
    tokio::spawn(async move {
        if sigterm.recv().await.is_some() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    Ok(())
}
