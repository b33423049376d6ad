//! Adaptive job scheduler
//!
//! This module provides the [`AdaptiveScheduler`], one job-submission API over
//! two execution substrates:
//!
//! - **threaded** - partitions run concurrently on a rayon worker pool
//! - **cooperative** - partitions run on the host loop thread, one bounded
//!   slice per host tick
//!
//! The substrate is picked once, when the scheduler is built, and served by a
//! single [`Backend`] for the scheduler's whole life.
//!
//! Each shape has two entry points. `schedule*` submits and returns a handle
//! right away; `adapt_schedule*` submits and returns a future that resolves
//! once the work is done, suspending once per host tick in between.

mod backend;
mod config;
mod cooperative;
mod ext;
mod threaded;

pub use backend::{Backend, ChunkBody, Work};
pub use config::{
    ExecutionMode, SchedulerConfig, DEFAULT_BATCH_DIVISOR, ENV_BATCH_DIVISOR, ENV_MODE, ENV_WAIT,
    ENV_WORKERS,
};
pub use cooperative::CooperativeBackend;
pub use ext::{BatchJobExt, BunchJobExt, JobExt, ParallelJobExt};
pub use threaded::ThreadedBackend;

pub use crate::runtime::handle::WaitStrategy;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use crate::runtime::error::{Result, ScheduleError};
use crate::runtime::handle::{BunchHandle, JobHandle};
use crate::runtime::host::HostLoop;
use crate::runtime::job::{BatchJob, BunchJob, Job, ParallelJob, Partition};

/// Scheduler statistics.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Total jobs scheduled.
    pub jobs_scheduled: AtomicUsize,
    /// Total jobs completed.
    pub jobs_completed: AtomicUsize,
    /// Total partitions and chunks executed.
    pub partitions_executed: AtomicUsize,
    /// Total yields to the next host tick.
    pub host_yields: AtomicUsize,
    /// Partitions running right now.
    pub running: AtomicUsize,
    /// Peak number of partitions running at once.
    pub peak_parallelism: AtomicUsize,
}

impl SchedulerStats {
    /// Record a scheduled job.
    #[inline]
    pub fn record_scheduled(&self) {
        self.jobs_scheduled.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a completed job.
    #[inline]
    pub fn record_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Record an executed partition or chunk.
    #[inline]
    pub fn record_partition(&self) {
        self.partitions_executed.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a yield to the next host tick.
    #[inline]
    pub fn record_yield(&self) {
        self.host_yields.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark a partition as started.
    #[inline]
    pub fn enter(&self) {
        let current = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.update_parallelism(current);
    }

    /// Mark a partition as finished.
    #[inline]
    pub fn exit(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    /// Mark a partition as started until the returned guard is dropped.
    pub fn track(&self) -> Running<'_> {
        self.enter();
        Running(self)
    }

    /// Update parallelism.
    #[inline]
    pub fn update_parallelism(&self, current: usize) {
        loop {
            let peak = self.peak_parallelism.load(Ordering::SeqCst);
            if current <= peak {
                break;
            }
            if self
                .peak_parallelism
                .compare_exchange(peak, current, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }
    }
}

/// Guard returned by [`SchedulerStats::track`]; marks the partition finished
/// on drop, also when the partition panics.
#[must_use = "the partition is marked finished as soon as the guard drops"]
pub struct Running<'a>(&'a SchedulerStats);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.exit();
    }
}

/// Batch size actually used for `len` indices.
///
/// A positive `requested` size is used as is. Otherwise the size is
/// `len / divisor`, raised to 1 when that rounds down to zero.
pub fn effective_batch(
    len: usize,
    requested: usize,
    divisor: usize,
) -> usize {
    if requested > 0 {
        return requested;
    }
    let auto = len / divisor.max(1);
    if auto == 0 {
        trace!(len, divisor, "auto batch size rounds to zero, using 1");
        return 1;
    }
    auto
}

/// Uniform entry point for scheduling jobs on either substrate.
///
/// A scheduler built with [`new`](Self::new) owns its host loop: dropping it
/// cancels cooperative work still pending on that loop, and the handles of
/// that work can no longer complete.
#[derive(Debug)]
pub struct AdaptiveScheduler {
    /// Configuration.
    config: SchedulerConfig,
    /// Back end chosen from `config.mode`.
    backend: Box<dyn Backend>,
    /// Statistics.
    stats: Option<Arc<SchedulerStats>>,
    /// Host loop created by this scheduler rather than passed in.
    owns_host: bool,
}

impl AdaptiveScheduler {
    /// Create a scheduler with its own host loop.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let mut scheduler = Self::with_host(config, HostLoop::new())?;
        scheduler.owns_host = true;
        Ok(scheduler)
    }

    /// Create a scheduler whose handles suspend on `host`.
    pub fn with_host(
        config: SchedulerConfig,
        host: HostLoop,
    ) -> Result<Self> {
        config.validate()?;

        let stats = config
            .enable_stats
            .then(|| Arc::new(SchedulerStats::default()));

        let backend: Box<dyn Backend> = match config.mode {
            ExecutionMode::Threaded => Box::new(ThreadedBackend::new(&config, host, stats.clone())?),
            ExecutionMode::Cooperative => {
                Box::new(CooperativeBackend::new(&config, host, stats.clone()))
            },
        };

        debug!(mode = %config.mode, wait = ?config.wait_strategy, "scheduler created");

        Ok(Self {
            config,
            backend,
            stats,
            owns_host: false,
        })
    }

    /// Execution mode of this scheduler.
    #[inline]
    pub fn mode(&self) -> ExecutionMode {
        self.backend.mode()
    }

    /// Configuration.
    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Host loop the application must tick.
    #[inline]
    pub fn host(&self) -> &HostLoop {
        self.backend.host()
    }

    /// Statistics, when enabled in the config.
    #[inline]
    pub fn stats(&self) -> Option<&SchedulerStats> {
        self.stats.as_deref()
    }

    /// Batch size used for `len` indices when `requested` is passed.
    #[inline]
    pub fn effective_batch(
        &self,
        len: usize,
        requested: usize,
    ) -> usize {
        effective_batch(len, requested, self.config.batch_divisor)
    }

    /// Submit a single-shot job.
    ///
    /// Cooperative mode runs it in the calling continuation when
    /// `depends_on` is absent or already done.
    pub fn schedule<J: Job>(
        &self,
        job: J,
        depends_on: Option<&JobHandle>,
    ) -> JobHandle {
        self.record_scheduled();
        let handle = self.backend.submit(
            Box::new(move || {
                let mut job = job;
                job.execute();
            }),
            depends_on,
        );
        debug!(id = %handle.id(), "scheduled single-shot job");
        handle
    }

    /// Submit an indexed-parallel job over `[0, len)`.
    ///
    /// A `batch` of zero picks `len / batch_divisor`, at least 1.
    pub fn schedule_for<J: ParallelJob>(
        &self,
        job: J,
        len: usize,
        batch: usize,
        depends_on: Option<&JobHandle>,
    ) -> JobHandle {
        self.record_scheduled();
        let batch = self.effective_batch(len, batch);
        let body: ChunkBody = Arc::new(move |chunk: Partition| {
            for index in chunk.range() {
                job.execute(index);
            }
        });
        let handle = self.backend.submit_chunks(len, batch, body, depends_on);
        debug!(id = %handle.id(), len, batch, "scheduled indexed-parallel job");
        handle
    }

    /// Submit a batched-parallel job over `[0, len)`.
    ///
    /// The body receives each chunk as `(start, count)`.
    pub fn schedule_batch<J: BatchJob>(
        &self,
        job: J,
        len: usize,
        batch: usize,
        depends_on: Option<&JobHandle>,
    ) -> JobHandle {
        self.record_scheduled();
        let batch = self.effective_batch(len, batch);
        let body: ChunkBody = Arc::new(move |chunk: Partition| job.execute(chunk.start, chunk.len));
        let handle = self.backend.submit_chunks(len, batch, body, depends_on);
        debug!(id = %handle.id(), len, batch, "scheduled batched-parallel job");
        handle
    }

    /// Slice `job` into `workers` partitions and submit them.
    ///
    /// Every partition is built before any is submitted, so a slicing error
    /// leaves nothing running.
    pub fn schedule_bunch<J: BunchJob>(
        &self,
        job: J,
        workers: usize,
        depends_on: Option<&JobHandle>,
    ) -> Result<BunchHandle> {
        let partitions = (0..workers)
            .map(|index| job.slice(index, workers))
            .collect::<Result<Vec<J>>>()?;
        drop(job);

        self.record_scheduled();
        let work = partitions
            .into_iter()
            .map(|partition| {
                Box::new(move || {
                    let mut partition = partition;
                    partition.execute();
                }) as Work
            })
            .collect();
        let bunch = self.backend.submit_partitions(work, depends_on);
        debug!(workers, "scheduled worker bunch");
        Ok(bunch)
    }

    /// Submit a single-shot job and wait for it.
    ///
    /// The job is submitted by this call; the returned future only waits.
    pub fn adapt_schedule<J: Job>(
        &self,
        job: J,
        depends_on: Option<&JobHandle>,
    ) -> impl Future<Output = ()> + Send + 'static {
        let handle = self.schedule(job, depends_on);
        async move { handle.wait().await }
    }

    /// Submit an indexed-parallel job and wait for it.
    pub fn adapt_schedule_for<J: ParallelJob>(
        &self,
        job: J,
        len: usize,
        batch: usize,
        depends_on: Option<&JobHandle>,
    ) -> impl Future<Output = ()> + Send + 'static {
        let handle = self.schedule_for(job, len, batch, depends_on);
        async move { handle.wait().await }
    }

    /// Submit a batched-parallel job and wait for it.
    pub fn adapt_schedule_batch<J: BatchJob>(
        &self,
        job: J,
        len: usize,
        batch: usize,
        depends_on: Option<&JobHandle>,
    ) -> impl Future<Output = ()> + Send + 'static {
        let handle = self.schedule_batch(job, len, batch, depends_on);
        async move { handle.wait().await }
    }

    /// Submit a worker bunch and wait for every partition.
    pub fn adapt_schedule_bunch<J: BunchJob>(
        &self,
        job: J,
        workers: usize,
        depends_on: Option<&JobHandle>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let bunch = self.schedule_bunch(job, workers, depends_on);
        async move {
            bunch?.wait().await;
            Ok(())
        }
    }

    fn record_scheduled(&self) {
        if let Some(stats) = &self.stats {
            stats.record_scheduled();
        }
    }
}

impl Drop for AdaptiveScheduler {
    fn drop(&mut self) {
        // Pending host tasks keep clones of the loop alive.
        if self.owns_host {
            let cancelled = self.host().cancel_all();
            if cancelled > 0 {
                debug!(cancelled, "scheduler dropped with pending cooperative work");
            }
        }
    }
}

static GLOBAL: OnceCell<AdaptiveScheduler> = OnceCell::new();

/// Install the process-wide scheduler.
///
/// Fails with [`ScheduleError::AlreadyInitialized`] if one is installed.
pub fn init(config: SchedulerConfig) -> Result<&'static AdaptiveScheduler> {
    if GLOBAL.get().is_some() {
        return Err(ScheduleError::AlreadyInitialized);
    }
    let scheduler = AdaptiveScheduler::new(config)?;
    GLOBAL
        .set(scheduler)
        .map_err(|_| ScheduleError::AlreadyInitialized)?;
    global()
}

/// The process-wide scheduler, installed from the environment on first use.
pub fn global() -> Result<&'static AdaptiveScheduler> {
    GLOBAL.get_or_try_init(|| AdaptiveScheduler::new(SchedulerConfig::from_env()?))
}
