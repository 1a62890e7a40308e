//! # Trace Orchestration
//!
//! Wires one tracing session together:
//!
//! 1. Open the instrumentation object (with an optional BTF override)
//! 2. Select and load the target's program
//! 3. Resolve the open-record layout for the running kernel
//! 4. Attach, then take the `events` channel and create the consumer
//! 5. Poll until the shutdown flag is raised or polling fails
//!
//! Teardown always destroys the consumer before closing the lifecycle,
//! whichever way the session ends. Setup failures return early and the
//! lifecycle's drop releases whatever was acquired.

use log::{error, info};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::consumer::{Consumer, ConsumerStats, EventChannel, PerCpuRing, PollResult};
use crate::decode::{LayoutPolicy, RecordDecoder};
use crate::domain::TraceError;
use crate::lifecycle::{InstrumentationUnit, Lifecycle, OpenOptions, UnitOpener};
use crate::sink::EventSink;
use crate::target::TraceTarget;

/// Everything one session needs, built from the command line
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Compiled instrumentation object
    pub object: PathBuf,
    pub open: OpenOptions,
    pub target: TraceTarget,
    /// Pages per CPU ring; must be a power of two
    pub page_count: usize,
    pub poll_timeout: Duration,
    pub layout: LayoutPolicy,
}

/// Why the poll loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Shutdown,
    PollFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub exit: ExitReason,
    pub stats: ConsumerStats,
}

/// Run one tracing session to completion
///
/// # Errors
/// Returns the first setup failure (open, load, attach, channel or consumer).
/// A failing poll is not an error: it ends the session with
/// [`ExitReason::PollFailure`].
pub async fn run<O, S>(
    opener: &O,
    config: &TraceConfig,
    sink: S,
    shutdown: &AtomicBool,
) -> Result<RunSummary, TraceError>
where
    O: UnitOpener,
    <O::Unit as InstrumentationUnit>::Channel: EventChannel,
    S: EventSink,
{
    let target = config.target;
    let mut lifecycle = Lifecycle::new(opener);

    lifecycle.open(&config.object, &config.open)?;
    let program = lifecycle.select_program(target.program())?;
    lifecycle.load()?;

    let layout = config.layout.resolve();
    let decoder = RecordDecoder::new(target.record_kind(), layout);

    let point = target.attach_point();
    lifecycle.attach(&program, &point)?;

    let channel = lifecycle.map(target.channel())?;
    let mut consumer = Consumer::create(channel, config.page_count, decoder, sink)?;
    lifecycle.start_polling()?;

    info!("Tracing {point} ({} CPUs), Ctrl-C to stop", consumer.ring_count());
    let exit = poll_until_shutdown(&mut consumer, config.poll_timeout, shutdown).await;
    let stats = consumer.stats();

    consumer.destroy();
    lifecycle.close();

    Ok(RunSummary { exit, stats })
}

async fn poll_until_shutdown<R, S>(
    consumer: &mut Consumer<R, S>,
    timeout: Duration,
    shutdown: &AtomicBool,
) -> ExitReason
where
    R: PerCpuRing,
    S: EventSink,
{
    loop {
        match consumer.poll(timeout).await {
            Ok(PollResult::Processed { .. } | PollResult::Timeout) => {}
            Err(e) => {
                error!("Error polling perf buffer: {e}");
                return ExitReason::PollFailure(e.to_string());
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            info!("Shutdown requested");
            return ExitReason::Shutdown;
        }
    }
}
