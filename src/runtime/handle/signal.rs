//! One-shot completion signal shared between a job and its handles.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::{Condvar, Mutex};

/// Callback run once the signal is set.
pub(crate) type Continuation = Box<dyn FnOnce() + Send>;

/// Panic payload captured from a job body.
pub(crate) type PanicPayload = Box<dyn Any + Send>;

/// Monotonic "done" flag with blocking wait and completion callbacks.
pub(crate) struct Signal {
    done: AtomicBool,
    state: Mutex<SignalState>,
    cond: Condvar,
}

#[derive(Default)]
struct SignalState {
    panic: Option<PanicPayload>,
    continuations: Vec<Continuation>,
}

impl Signal {
    /// Create an unset signal.
    pub(crate) fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            state: Mutex::new(SignalState::default()),
            cond: Condvar::new(),
        }
    }

    /// Create a signal that is already set.
    pub(crate) fn finished() -> Self {
        let signal = Self::new();
        signal.done.store(true, Ordering::Release);
        signal
    }

    #[inline]
    pub(crate) fn is_set(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Set the signal, keeping the panic payload of a failed job.
    ///
    /// Later calls are ignored: once set, the signal never reverts.
    pub(crate) fn finish(
        &self,
        outcome: thread::Result<()>,
    ) {
        let continuations = {
            let mut state = self.state.lock();
            if self.is_set() {
                return;
            }
            state.panic = outcome.err();
            self.done.store(true, Ordering::Release);
            std::mem::take(&mut state.continuations)
        };
        self.cond.notify_all();

        for continuation in continuations {
            continuation();
        }
    }

    /// Run `continuation` once the signal is set; immediately if it already is.
    pub(crate) fn on_set(
        &self,
        continuation: Continuation,
    ) {
        {
            let mut state = self.state.lock();
            if !self.is_set() {
                state.continuations.push(continuation);
                return;
            }
        }
        continuation();
    }

    /// Park the calling thread until the signal is set.
    pub(crate) fn block(&self) {
        let mut state = self.state.lock();
        while !self.is_set() {
            self.cond.wait(&mut state);
        }
    }

    /// Take the captured panic payload, if any. Yields it at most once.
    pub(crate) fn take_panic(&self) -> Option<PanicPayload> {
        self.state.lock().panic.take()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("done", &self.is_set())
            .finish()
    }
}
