//! Completion handles
//!
//! A [`JobHandle`] represents one outstanding submission and a [`BunchHandle`]
//! an ordered group of them. Both support a blocking [`complete`] and a
//! suspending [`wait`] that polls once per host tick.
//!
//! Completing or waiting twice is a no-op. A panic raised by the job body is
//! resumed on the first observer and then forgotten.
//!
//! [`complete`]: JobHandle::complete
//! [`wait`]: JobHandle::wait

mod signal;

pub(crate) use signal::{Continuation, Signal};

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::runtime::host::HostLoop;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl JobId {
    /// Allocate a fresh process-wide id.
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job({})", self.0)
    }
}

/// How [`JobHandle::wait`] observes completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaitStrategy {
    /// Check once per host tick, yielding in between.
    #[default]
    PollPerTick,
    /// Complete immediately with a blocking wait. Threaded mode only.
    Block,
}

/// What a handle's blocking complete has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    /// Work runs on pool threads; park until it is done.
    Native,
    /// Work runs on the host loop; drive ticks until it is done.
    Cooperative,
}

/// Shared settings stamped onto every handle a back end creates.
#[derive(Debug, Clone)]
pub(crate) struct Completer {
    host: HostLoop,
    source: Source,
    strategy: WaitStrategy,
}

impl Completer {
    pub(crate) fn new(
        host: HostLoop,
        source: Source,
        strategy: WaitStrategy,
    ) -> Self {
        Self {
            host,
            source,
            strategy,
        }
    }

    #[inline]
    pub(crate) fn host(&self) -> &HostLoop {
        &self.host
    }

    /// A fresh handle and the signal that completes it.
    pub(crate) fn pending(&self) -> (JobHandle, Arc<Signal>) {
        let signal = Arc::new(Signal::new());
        (self.handle(JobId::next(), Arc::clone(&signal)), signal)
    }

    /// A handle that is complete from the start.
    pub(crate) fn finished(&self) -> JobHandle {
        self.handle(JobId::next(), Arc::new(Signal::finished()))
    }

    fn handle(
        &self,
        id: JobId,
        signal: Arc<Signal>,
    ) -> JobHandle {
        JobHandle {
            id,
            signal,
            completer: self.clone(),
        }
    }
}

/// Run `body`, capturing a panic instead of unwinding into the dispatcher.
pub(crate) fn run_guarded<F: FnOnce()>(body: F) -> thread::Result<()> {
    panic::catch_unwind(AssertUnwindSafe(body))
}

/// Handle to one submitted unit of work.
///
/// Clones observe the same submission.
#[derive(Clone)]
pub struct JobHandle {
    id: JobId,
    signal: Arc<Signal>,
    completer: Completer,
}

impl JobHandle {
    /// Id of the submission.
    #[inline]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Check if the work is done. Never reverts once true.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.signal.is_set()
    }

    /// Block until the work is done.
    ///
    /// On the cooperative back end this drives host ticks until the work
    /// finishes, so it must not be called from inside a task running on the
    /// host loop while the work is still pending. It also panics when the
    /// host task running the work was cancelled.
    ///
    /// # Panics
    ///
    /// Resumes the panic of a job body that panicked, on the first observer
    /// only.
    pub fn complete(&self) {
        self.settle();
        if let Some(payload) = self.signal.take_panic() {
            panic::resume_unwind(payload);
        }
    }

    /// Suspend until the work is done, checking once per host tick.
    ///
    /// Once completion is observed a blocking [`complete`](Self::complete)
    /// runs before returning.
    pub async fn wait(&self) {
        self.settled().await;
        self.complete();
    }

    /// Block until done without taking the panic payload.
    pub(crate) fn settle(&self) {
        match self.completer.source {
            Source::Native => self.signal.block(),
            Source::Cooperative => {
                while !self.signal.is_set() {
                    assert!(
                        !self.completer.host.is_ticking(),
                        "{} is still pending; blocking on it inside a host tick would never finish",
                        self.id
                    );
                    assert!(
                        self.completer.host.pending_tasks() > 0,
                        "{} can never complete: its host task was cancelled",
                        self.id
                    );
                    self.completer.host.tick();
                }
            },
        }
    }

    /// Suspend until done without taking the panic payload.
    pub(crate) async fn settled(&self) {
        if self.completer.strategy == WaitStrategy::PollPerTick {
            while !self.is_completed() {
                self.completer.host.next_tick().await;
            }
        }
        self.settle();
    }

    /// Run `continuation` once the work is done.
    pub(crate) fn on_completed(
        &self,
        continuation: Continuation,
    ) {
        self.signal.on_set(continuation);
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("completed", &self.is_completed())
            .field("source", &self.completer.source)
            .finish()
    }
}

/// Ordered group of handles, one per bunch partition.
///
/// Done only when every member is done.
#[derive(Debug, Clone)]
pub struct BunchHandle {
    handles: Vec<JobHandle>,
    completer: Completer,
}

impl BunchHandle {
    pub(crate) fn new(
        handles: Vec<JobHandle>,
        completer: Completer,
    ) -> Self {
        Self { handles, completer }
    }

    /// Number of partitions.
    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if the bunch had no partitions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Per-partition handles, in partition order.
    #[inline]
    pub fn handles(&self) -> &[JobHandle] {
        &self.handles
    }

    /// Check if every partition is done.
    pub fn is_completed(&self) -> bool {
        self.handles.iter().all(JobHandle::is_completed)
    }

    /// Block until every partition is done, draining them in index order.
    pub fn complete(&self) {
        for handle in &self.handles {
            handle.complete();
        }
    }

    /// Suspend until every partition is done, checking once per host tick.
    pub async fn wait(&self) {
        if self.completer.strategy == WaitStrategy::PollPerTick {
            while !self.is_completed() {
                self.completer.host.next_tick().await;
            }
        }
        self.complete();
    }

    /// One handle that completes when every partition has completed.
    ///
    /// Lets a whole bunch act as the predecessor of a later job. Panics of
    /// the members stay with the member handles.
    pub fn joined(&self) -> JobHandle {
        if self.handles.is_empty() {
            return self.completer.finished();
        }

        let (joined, signal) = self.completer.pending();
        let remaining = Arc::new(AtomicUsize::new(self.handles.len()));
        for handle in &self.handles {
            let signal = Arc::clone(&signal);
            let remaining = Arc::clone(&remaining);
            handle.on_completed(Box::new(move || {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    signal.finish(Ok(()));
                }
            }));
        }
        joined
    }
}

#[cfg(test)]
mod tests;
