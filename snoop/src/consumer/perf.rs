//! Perf event array rings backed by aya

use aya::maps::perf::PerfEventArrayBuffer;
use aya::maps::{MapData, PerfEventArray};
use bytes::BytesMut;
use std::task::{Context, Poll};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

use super::{cpu_utils, Batch, EventChannel, PerCpuRing};
use crate::domain::{ConsumerError, CpuId};

/// The `events` map taken out of a loaded object
pub struct PerfChannel {
    array: PerfEventArray<MapData>,
}

impl PerfChannel {
    pub fn new(array: PerfEventArray<MapData>) -> Self {
        Self { array }
    }
}

impl EventChannel for PerfChannel {
    type Ring = PerfRing;

    fn cpus(&self) -> Result<Vec<CpuId>, ConsumerError> {
        cpu_utils::online_cpus().map_err(|e| ConsumerError::Cpus(format!("{e:#}")))
    }

    fn open_ring(&mut self, cpu: CpuId, page_count: usize) -> Result<PerfRing, ConsumerError> {
        let buffer = self
            .array
            .open(cpu.0, Some(page_count))
            .map_err(|e| ConsumerError::Create { cpu, reason: e.to_string() })?;
        let buffer = AsyncFd::with_interest(buffer, Interest::READABLE)
            .map_err(|e| ConsumerError::Create { cpu, reason: e.to_string() })?;
        Ok(PerfRing { cpu, buffer })
    }
}

/// Memory-mapped ring of one CPU, registered with the tokio reactor
pub struct PerfRing {
    cpu: CpuId,
    buffer: AsyncFd<PerfEventArrayBuffer<MapData>>,
}

impl PerCpuRing for PerfRing {
    fn cpu(&self) -> CpuId {
        self.cpu
    }

    fn poll_readable(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), ConsumerError>> {
        loop {
            let mut guard = match self.buffer.poll_read_ready_mut(cx) {
                Poll::Ready(Ok(guard)) => guard,
                Poll::Ready(Err(e)) => {
                    return Poll::Ready(Err(ConsumerError::Poll(format!(
                        "waiting on buffer of CPU {}: {e}",
                        self.cpu
                    ))))
                }
                Poll::Pending => return Poll::Pending,
            };

            if guard.get_inner().readable() {
                return Poll::Ready(Ok(()));
            }
            // Spurious wakeup: rearm and register again
            guard.clear_ready();
        }
    }

    fn has_pending(&self) -> bool {
        self.buffer.get_ref().readable()
    }

    fn read_batch(&mut self, out: &mut [BytesMut]) -> Result<Batch, ConsumerError> {
        let events = self
            .buffer
            .get_mut()
            .read_events(out)
            .map_err(|e| ConsumerError::Poll(format!("reading buffer on CPU {}: {e}", self.cpu)))?;
        Ok(Batch { read: events.read, lost: events.lost as u64 })
    }
}
