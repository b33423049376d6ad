//! Cooperative back end on the host loop.
//!
//! Work runs on the thread that drives the [`HostLoop`]. Single-shot jobs run
//! as one indivisible unit; chunked jobs and bunches run one chunk or one
//! partition per tick, in order.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, trace};

use crate::runtime::handle::{run_guarded, BunchHandle, Completer, JobHandle, Source};
use crate::runtime::host::HostLoop;
use crate::runtime::job::Partition;

use super::backend::{Backend, ChunkBody, Work};
use super::{ExecutionMode, SchedulerConfig, SchedulerStats};

/// Runs submissions on the host loop, yielding between slices.
#[derive(Debug)]
pub struct CooperativeBackend {
    /// Handle factory; also owns the host loop.
    completer: Completer,
    /// Statistics, when enabled.
    stats: Option<Arc<SchedulerStats>>,
}

impl CooperativeBackend {
    pub fn new(
        config: &SchedulerConfig,
        host: HostLoop,
        stats: Option<Arc<SchedulerStats>>,
    ) -> Self {
        debug!("cooperative backend ready");
        Self {
            completer: Completer::new(host, Source::Cooperative, config.wait_strategy),
            stats,
        }
    }
}

impl Backend for CooperativeBackend {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Cooperative
    }

    fn host(&self) -> &HostLoop {
        self.completer.host()
    }

    fn submit(
        &self,
        work: Work,
        depends_on: Option<&JobHandle>,
    ) -> JobHandle {
        let (handle, signal) = self.completer.pending();
        let predecessor = depends_on.cloned();
        let stats = self.stats.clone();
        let id = handle.id();

        // Polled on spawn: with no pending predecessor the job runs right here.
        self.host().spawn(async move {
            if let Some(predecessor) = predecessor {
                predecessor.settled().await;
            }
            let outcome = {
                let _running = stats.as_deref().map(SchedulerStats::track);
                run_guarded(work)
            };
            if let Some(stats) = &stats {
                stats.record_partition();
                stats.record_completed();
            }
            trace!(%id, panicked = outcome.is_err(), "job finished");
            signal.finish(outcome);
        });
        handle
    }

    fn submit_chunks(
        &self,
        len: usize,
        batch: usize,
        body: ChunkBody,
        depends_on: Option<&JobHandle>,
    ) -> JobHandle {
        let (handle, signal) = self.completer.pending();
        let predecessor = depends_on.cloned();
        let host = self.host().clone();
        let stats = self.stats.clone();
        let id = handle.id();

        self.host().spawn(async move {
            if let Some(predecessor) = predecessor {
                predecessor.settled().await;
            }
            let outcome = AssertUnwindSafe(async {
                for chunk in Partition::chunks(len, batch) {
                    trace!(%id, %chunk, tick = host.current_tick(), "run chunk");
                    {
                        let _running = stats.as_deref().map(SchedulerStats::track);
                        body(chunk);
                    }
                    if let Some(stats) = &stats {
                        stats.record_partition();
                        stats.record_yield();
                    }
                    host.next_tick().await;
                }
            })
            .catch_unwind()
            .await;
            drop(body);
            if let Some(stats) = &stats {
                stats.record_completed();
            }
            trace!(%id, len, batch, panicked = outcome.is_err(), "chunked job finished");
            signal.finish(outcome);
        });
        handle
    }

    fn submit_partitions(
        &self,
        partitions: Vec<Work>,
        depends_on: Option<&JobHandle>,
    ) -> BunchHandle {
        let predecessor = depends_on.cloned();
        let host = self.host().clone();
        let stats = self.stats.clone();

        let (handles, signals): (Vec<_>, Vec<_>) =
            partitions.iter().map(|_| self.completer.pending()).unzip();

        self.host().spawn(async move {
            if let Some(predecessor) = predecessor {
                predecessor.settled().await;
            }
            let count = partitions.len();
            for (index, (work, signal)) in partitions.into_iter().zip(signals).enumerate() {
                trace!(index, count, tick = host.current_tick(), "run bunch partition");
                let outcome = {
                    let _running = stats.as_deref().map(SchedulerStats::track);
                    run_guarded(work)
                };
                if let Some(stats) = &stats {
                    stats.record_partition();
                    if index + 1 == count {
                        stats.record_completed();
                    }
                }
                signal.finish(outcome);
                if index + 1 < count {
                    if let Some(stats) = &stats {
                        stats.record_yield();
                    }
                    host.next_tick().await;
                }
            }
            if count == 0 {
                if let Some(stats) = &stats {
                    stats.record_completed();
                }
            }
        });
        BunchHandle::new(handles, self.completer.clone())
    }
}
