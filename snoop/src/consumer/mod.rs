//! # Per-CPU Buffer Consumer
//!
//! Drains the per-CPU rings behind one perf event array, decodes every sample
//! and forwards the result to an [`EventSink`].
//!
//! ## Polling
//!
//! [`Consumer::poll`] waits on the readiness of all rings under
//! `tokio::time::timeout`. Every ready ring is drained until it reports
//! nothing pending, so a single poll is bounded by ring occupancy rather than
//! by a fixed record count.
//!
//! ## Ordering
//!
//! Records from one CPU are delivered in the order the kernel wrote them.
//! There is no ordering across CPUs.
//!
//! ## Losses
//!
//! When the kernel could not enqueue samples because a ring was full, the
//! read that observes it reports a lost count. Each such report goes to
//! [`EventSink::report_loss`] once and is added to [`ConsumerStats::lost`].

pub mod cpu_utils;
pub mod perf;

use bytes::BytesMut;
use log::{debug, info, warn};
use std::future::poll_fn;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time;

use crate::decode::RecordDecoder;
use crate::domain::{ConsumerError, CpuId};
use crate::sink::EventSink;

pub use cpu_utils::online_cpus;
pub use perf::{PerfChannel, PerfRing};

/// Read targets handed to one ring read
const READ_BATCH: usize = 32;

/// Initial capacity of each read target; records are 120 bytes at most
const SAMPLE_CAPACITY: usize = 256;

/// Outcome of one ring read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Batch {
    /// Samples written to the first `read` buffers
    pub read: usize,
    /// Samples the kernel dropped since the previous read
    pub lost: u64,
}

/// One CPU's ring buffer
pub trait PerCpuRing {
    fn cpu(&self) -> CpuId;

    /// Ready once unread samples are available; otherwise registers `cx` to
    /// be woken when the kernel signals the ring
    ///
    /// # Errors
    /// Returns [`ConsumerError::Poll`] if readiness cannot be awaited
    fn poll_readable(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), ConsumerError>>;

    /// Whether unread samples remain
    fn has_pending(&self) -> bool;

    /// Read up to `out.len()` samples
    ///
    /// # Errors
    /// Returns [`ConsumerError::Poll`] if the ring cannot be read
    fn read_batch(&mut self, out: &mut [BytesMut]) -> Result<Batch, ConsumerError>;
}

/// A perf event array that can be split into per-CPU rings
pub trait EventChannel {
    type Ring: PerCpuRing;

    /// CPUs to open a ring for
    ///
    /// # Errors
    /// Returns [`ConsumerError::Cpus`] if the CPU list is unavailable
    fn cpus(&self) -> Result<Vec<CpuId>, ConsumerError>;

    /// # Errors
    /// Returns [`ConsumerError::Create`] if the ring cannot be mapped
    fn open_ring(&mut self, cpu: CpuId, page_count: usize) -> Result<Self::Ring, ConsumerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// At least one ring was ready
    Processed { records: usize, lost: u64 },
    /// Nothing became ready before the timeout
    Timeout,
}

/// Running totals over the consumer's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub polls: u64,
    pub timeouts: u64,
    /// Samples read from the rings
    pub records: u64,
    /// Events handed to the sink
    pub emitted: u64,
    /// Records filtered out after decoding (directory opens)
    pub suppressed: u64,
    pub decode_errors: u64,
    /// Samples the kernel dropped
    pub lost: u64,
}

pub struct Consumer<R: PerCpuRing, S: EventSink> {
    rings: Vec<R>,
    buffers: Vec<BytesMut>,
    decoder: RecordDecoder,
    sink: S,
    stats: ConsumerStats,
}

impl<R: PerCpuRing, S: EventSink> Consumer<R, S> {
    /// Open one ring of `page_count` pages per CPU of `channel`
    ///
    /// Rings opened before a failure are released before returning.
    ///
    /// # Errors
    /// Returns [`ConsumerError::InvalidPageCount`] unless `page_count` is a
    /// non-zero power of two, or the first ring/CPU enumeration failure
    pub fn create<C>(
        mut channel: C,
        page_count: usize,
        decoder: RecordDecoder,
        sink: S,
    ) -> Result<Self, ConsumerError>
    where
        C: EventChannel<Ring = R>,
    {
        if !page_count.is_power_of_two() {
            return Err(ConsumerError::InvalidPageCount(page_count));
        }

        let cpus = channel.cpus()?;
        let mut rings = Vec::with_capacity(cpus.len());
        for cpu in cpus {
            match channel.open_ring(cpu, page_count) {
                Ok(ring) => rings.push(ring),
                Err(e) => {
                    debug!("Releasing {} perf buffers opened before CPU {cpu} failed", rings.len());
                    return Err(e);
                }
            }
        }

        info!("Opened {} perf buffers ({page_count} pages each)", rings.len());

        Ok(Self {
            rings,
            buffers: (0..READ_BATCH).map(|_| BytesMut::with_capacity(SAMPLE_CAPACITY)).collect(),
            decoder,
            sink,
            stats: ConsumerStats::default(),
        })
    }

    /// Wait up to `timeout` for samples and deliver everything available
    ///
    /// # Errors
    /// Returns [`ConsumerError::Poll`] if waiting or reading fails, or if the
    /// consumer was destroyed
    pub async fn poll(&mut self, timeout: Duration) -> Result<PollResult, ConsumerError> {
        if self.rings.is_empty() {
            return Err(ConsumerError::Poll("consumer has no open buffers".to_string()));
        }

        self.stats.polls += 1;
        let Ok(ready) = time::timeout(timeout, wait_readable(&mut self.rings)).await else {
            self.stats.timeouts += 1;
            return Ok(PollResult::Timeout);
        };

        let (mut records, mut lost) = (0, 0);
        for idx in ready? {
            let (read, dropped) = self.drain(idx)?;
            records += read;
            lost += dropped;
        }

        Ok(PollResult::Processed { records, lost })
    }

    fn drain(&mut self, idx: usize) -> Result<(usize, u64), ConsumerError> {
        let Self { rings, buffers, decoder, sink, stats } = self;
        let ring = &mut rings[idx];
        let cpu = ring.cpu();
        let (mut records, mut lost) = (0, 0);

        loop {
            let batch = ring.read_batch(buffers)?;

            if batch.lost > 0 {
                lost += batch.lost;
                stats.lost += batch.lost;
                sink.report_loss(cpu, batch.lost);
            }

            for raw in buffers.iter().take(batch.read) {
                records += 1;
                stats.records += 1;
                match decoder.decode(raw) {
                    Ok(Some(event)) => {
                        stats.emitted += 1;
                        sink.emit(&event);
                    }
                    Ok(None) => stats.suppressed += 1,
                    Err(e) => {
                        stats.decode_errors += 1;
                        warn!("Skipping record from CPU {cpu}: {e}");
                    }
                }
            }

            let progressed = batch.read > 0 || batch.lost > 0;
            if !progressed || !ring.has_pending() {
                break;
            }
        }

        Ok((records, lost))
    }

    /// Release every ring; polling afterwards fails
    ///
    /// Also runs on drop.
    pub fn destroy(&mut self) {
        if !self.rings.is_empty() {
            debug!("Releasing {} perf buffers", self.rings.len());
            self.rings.clear();
        }
    }

    pub fn ring_count(&self) -> usize {
        self.rings.len()
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<R: PerCpuRing, S: EventSink> Drop for Consumer<R, S> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Indexes of the rings with unread samples, once at least one has some
async fn wait_readable<R: PerCpuRing>(rings: &mut [R]) -> Result<Vec<usize>, ConsumerError> {
    poll_fn(|cx| {
        let mut ready = Vec::new();
        for (idx, ring) in rings.iter_mut().enumerate() {
            match ring.poll_readable(cx) {
                Poll::Ready(Ok(())) => ready.push(idx),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {}
            }
        }

        if ready.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(Ok(ready))
        }
    })
    .await
}
