//! Threaded back end on a rayon worker pool.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, trace};

use crate::runtime::error::Result;
use crate::runtime::handle::{run_guarded, BunchHandle, Completer, JobHandle, Source};
use crate::runtime::host::HostLoop;
use crate::runtime::job::Partition;

use super::backend::{Backend, ChunkBody, Work};
use super::{ExecutionMode, SchedulerConfig, SchedulerStats};

/// Runs every submission on a dedicated worker pool.
pub struct ThreadedBackend {
    /// Worker pool (shared with pending continuations).
    pool: Arc<ThreadPool>,
    /// Handle factory.
    completer: Completer,
    /// Statistics, when enabled.
    stats: Option<Arc<SchedulerStats>>,
}

impl ThreadedBackend {
    /// Build the worker pool described by `config`.
    pub fn new(
        config: &SchedulerConfig,
        host: HostLoop,
        stats: Option<Arc<SchedulerStats>>,
    ) -> Result<Self> {
        let prefix = config.thread_name_prefix.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_workers)
            .thread_name(move |worker_id| format!("{}-{}", prefix, worker_id))
            .build()?;

        debug!(workers = config.num_workers, "threaded backend ready");

        Ok(Self {
            pool: Arc::new(pool),
            completer: Completer::new(host, Source::Native, config.wait_strategy),
            stats,
        })
    }

    /// Number of worker threads.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Spawn `task` on the pool once `depends_on` (if any) has completed.
    fn dispatch<F>(
        &self,
        task: F,
        depends_on: Option<&JobHandle>,
    ) where
        F: FnOnce() + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        match depends_on {
            Some(predecessor) => predecessor.on_completed(Box::new(move || pool.spawn(task))),
            None => pool.spawn(task),
        }
    }

    /// Run one unit of work. With `remaining`, the unit is one partition of a
    /// bunch and only the last partition to finish counts the job completed.
    fn submit_unit(
        &self,
        work: Work,
        depends_on: Option<&JobHandle>,
        remaining: Option<Arc<AtomicUsize>>,
    ) -> JobHandle {
        let (handle, signal) = self.completer.pending();
        let stats = self.stats.clone();
        let id = handle.id();

        self.dispatch(
            move || {
                let outcome = {
                    let _running = stats.as_deref().map(SchedulerStats::track);
                    run_guarded(work)
                };
                if let Some(stats) = &stats {
                    stats.record_partition();
                    let last = remaining.map_or(true, |r| r.fetch_sub(1, Ordering::AcqRel) == 1);
                    if last {
                        stats.record_completed();
                    }
                }
                trace!(%id, panicked = outcome.is_err(), "job finished");
                signal.finish(outcome);
            },
            depends_on,
        );
        handle
    }
}

impl Backend for ThreadedBackend {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Threaded
    }

    fn host(&self) -> &HostLoop {
        self.completer.host()
    }

    fn submit(
        &self,
        work: Work,
        depends_on: Option<&JobHandle>,
    ) -> JobHandle {
        self.submit_unit(work, depends_on, None)
    }

    fn submit_chunks(
        &self,
        len: usize,
        batch: usize,
        body: ChunkBody,
        depends_on: Option<&JobHandle>,
    ) -> JobHandle {
        let (handle, signal) = self.completer.pending();
        let stats = self.stats.clone();
        let id = handle.id();
        let chunks: Vec<Partition> = Partition::chunks(len, batch).collect();

        self.dispatch(
            move || {
                let outcome = run_guarded(|| {
                    chunks.into_par_iter().for_each(|chunk| {
                        let _running = stats.as_deref().map(SchedulerStats::track);
                        body(chunk);
                        if let Some(stats) = &stats {
                            stats.record_partition();
                        }
                    });
                });
                drop(body);
                if let Some(stats) = &stats {
                    stats.record_completed();
                }
                trace!(%id, len, batch, panicked = outcome.is_err(), "chunked job finished");
                signal.finish(outcome);
            },
            depends_on,
        );
        handle
    }

    fn submit_partitions(
        &self,
        partitions: Vec<Work>,
        depends_on: Option<&JobHandle>,
    ) -> BunchHandle {
        if partitions.is_empty() {
            if let Some(stats) = &self.stats {
                stats.record_completed();
            }
        }

        let remaining = Arc::new(AtomicUsize::new(partitions.len()));
        let handles = partitions
            .into_iter()
            .map(|work| self.submit_unit(work, depends_on, Some(Arc::clone(&remaining))))
            .collect();
        BunchHandle::new(handles, self.completer.clone())
    }
}

impl fmt::Debug for ThreadedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedBackend")
            .field("num_workers", &self.num_workers())
            .finish()
    }
}
