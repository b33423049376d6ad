//! Cooperative host loop
//!
//! [`HostLoop`] is a single-threaded task queue drained once per host tick.
//! The surrounding application calls [`HostLoop::tick`] once per iteration of
//! its main loop; tasks suspended on [`HostLoop::next_tick`] resume exactly once
//! on the following tick, in the order they suspended.
//!
//! Spawned tasks are polled immediately, on the caller's stack, up to their
//! first suspension point. Work before the first `.await` therefore runs in
//! the spawning continuation, and only later slices run on later ticks.
//!
//! Pending tasks usually hold clones of the loop they run on. Call
//! [`HostLoop::cancel_all`] to drop them when the loop is being abandoned.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Identifier of a task spawned on a [`HostLoop`].
pub type HostTaskId = u64;

type ReadyQueue = Arc<Mutex<VecDeque<HostTaskId>>>;

/// Cheaply cloneable handle to a cooperative host loop.
#[derive(Clone)]
pub struct HostLoop {
    inner: Arc<Inner>,
}

struct Inner {
    /// Suspended tasks, keyed by id.
    tasks: Mutex<HashMap<HostTaskId, BoxFuture<'static, ()>>>,
    /// Tasks to poll during the current tick, in wake order.
    ready: ReadyQueue,
    /// Wakers registered through `next_tick`, in registration order.
    sleepers: Mutex<Vec<Waker>>,
    /// Number of ticks run so far.
    tick: AtomicU64,
    next_task: AtomicU64,
    ticking: AtomicBool,
}

/// Waker that re-queues one task.
struct TaskWaker {
    id: HostTaskId,
    ready: ReadyQueue,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let mut ready = self.ready.lock();
        if !ready.contains(&self.id) {
            ready.push_back(self.id);
        }
    }
}

/// Clears the `ticking` flag even if a task panics mid-tick.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl HostLoop {
    /// Create an idle host loop at tick zero.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(HashMap::new()),
                ready: Arc::new(Mutex::new(VecDeque::new())),
                sleepers: Mutex::new(Vec::new()),
                tick: AtomicU64::new(0),
                next_task: AtomicU64::new(0),
                ticking: AtomicBool::new(false),
            }),
        }
    }

    /// Number of ticks run so far.
    #[inline]
    pub fn current_tick(&self) -> u64 {
        self.inner.tick.load(Ordering::Acquire)
    }

    /// Check if a tick is being run right now.
    #[inline]
    pub fn is_ticking(&self) -> bool {
        self.inner.ticking.load(Ordering::Acquire)
    }

    /// Number of spawned tasks that have not finished.
    pub fn pending_tasks(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Suspend the current task until the next tick.
    #[inline]
    pub fn next_tick(&self) -> NextTick {
        NextTick {
            inner: Arc::clone(&self.inner),
            target: None,
        }
    }

    /// Spawn a task and poll it once right away.
    pub fn spawn<F>(
        &self,
        future: F,
    ) -> HostTaskId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.next_task.fetch_add(1, Ordering::Relaxed);
        let mut future: BoxFuture<'static, ()> = Box::pin(future);

        if self.poll_task(id, &mut future).is_pending() {
            self.inner.tasks.lock().insert(id, future);
        }
        id
    }

    /// Run one host tick.
    ///
    /// Wakes every task that suspended on [`next_tick`](Self::next_tick) before
    /// this tick, then polls woken tasks until none is left. Returns the number
    /// of the tick just run.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a task running on this loop. A panic
    /// raised by a task is resumed once every other task woken for this tick
    /// has been polled; the panicking task is dropped.
    pub fn tick(&self) -> u64 {
        let reentered = self.inner.ticking.swap(true, Ordering::AcqRel);
        assert!(!reentered, "HostLoop::tick called from inside a tick");
        let _guard = TickGuard(&self.inner.ticking);

        let now = self.inner.tick.fetch_add(1, Ordering::AcqRel) + 1;

        let sleepers = std::mem::take(&mut *self.inner.sleepers.lock());
        for waker in sleepers {
            waker.wake();
        }

        let mut polled = 0usize;
        let mut first_panic = None;
        loop {
            let next = self.inner.ready.lock().pop_front();
            let Some(id) = next else {
                break;
            };
            let task = self.inner.tasks.lock().remove(&id);
            if let Some(mut future) = task {
                polled += 1;
                match panic::catch_unwind(AssertUnwindSafe(|| self.poll_task(id, &mut future))) {
                    Ok(Poll::Pending) => {
                        self.inner.tasks.lock().insert(id, future);
                    },
                    Ok(Poll::Ready(())) => {},
                    Err(payload) => {
                        debug!(tick = now, task = id, "host task panicked");
                        first_panic.get_or_insert(payload);
                    },
                }
            }
        }

        trace!(tick = now, polled, pending = self.pending_tasks(), "host tick");
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        now
    }

    /// Drop every pending task without running it further.
    ///
    /// Returns the number of tasks dropped. Work owned by those tasks never
    /// completes.
    pub fn cancel_all(&self) -> usize {
        self.inner.ready.lock().clear();
        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        let cancelled = tasks.len();
        drop(tasks);
        if cancelled > 0 {
            debug!(cancelled, "host tasks cancelled");
        }
        cancelled
    }

    /// Drive the loop until `future` resolves and return its output.
    ///
    /// Ticks as fast as possible; meant for tests, tools and shutdown paths
    /// rather than a frame-paced main loop.
    pub fn block_on<F>(
        &self,
        future: F,
    ) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let slot = Arc::new(Mutex::new(None));
        let out = Arc::clone(&slot);
        self.spawn(async move {
            let value = future.await;
            *out.lock() = Some(value);
        });

        loop {
            if let Some(value) = slot.lock().take() {
                return value;
            }
            self.tick();
            thread::yield_now();
        }
    }

    fn poll_task(
        &self,
        id: HostTaskId,
        future: &mut BoxFuture<'static, ()>,
    ) -> Poll<()> {
        let waker = Waker::from(Arc::new(TaskWaker {
            id,
            ready: Arc::clone(&self.inner.ready),
        }));
        let mut cx = Context::from_waker(&waker);
        future.as_mut().poll(&mut cx)
    }
}

impl Default for HostLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLoop")
            .field("tick", &self.current_tick())
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

/// Future returned by [`HostLoop::next_tick`].
///
/// Resolves on the first tick after the one during which it was first polled.
#[must_use = "futures do nothing unless awaited"]
pub struct NextTick {
    inner: Arc<Inner>,
    target: Option<u64>,
}

impl Future for NextTick {
    type Output = ();

    fn poll(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<()> {
        let this = self.get_mut();
        let now = this.inner.tick.load(Ordering::Acquire);
        let target = *this.target.get_or_insert(now + 1);

        if now >= target {
            return Poll::Ready(());
        }
        this.inner.sleepers.lock().push(cx.waker().clone());
        Poll::Pending
    }
}
