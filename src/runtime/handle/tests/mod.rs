//! JobHandle / BunchHandle 单元测试

use crate::runtime::handle::{BunchHandle, Completer, JobHandle, JobId, Source, WaitStrategy};
use crate::runtime::host::HostLoop;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn native() -> Completer {
    Completer::new(HostLoop::new(), Source::Native, WaitStrategy::PollPerTick)
}

fn cooperative(host: &HostLoop) -> Completer {
    Completer::new(host.clone(), Source::Cooperative, WaitStrategy::PollPerTick)
}

#[cfg(test)]
mod job_id_tests {
    use super::*;

    #[test]
    fn test_job_ids_are_unique() {
        let a = JobId::next();
        let b = JobId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_job_id_display() {
        assert_eq!(JobId(7).to_string(), "Job(7)");
        assert_eq!(JobId(7).inner(), 7);
    }
}

#[cfg(test)]
mod job_handle_tests {
    use super::*;

    #[test]
    fn test_finished_handle() {
        let handle = native().finished();
        assert!(handle.is_completed());
        handle.complete();
        handle.complete();
    }

    #[test]
    fn test_complete_blocks_until_signalled() {
        let (handle, signal) = native().pending();
        assert!(!handle.is_completed());

        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signal.finish(Ok(()));
        });
        handle.complete();
        assert!(handle.is_completed());
        worker.join().unwrap();
    }

    #[test]
    fn test_panic_resumes_once() {
        let (handle, signal) = native().pending();
        signal.finish(Err(Box::new("boom")));

        let first = panic::catch_unwind(AssertUnwindSafe(|| handle.complete()));
        let payload = first.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

        // Second observer sees a plain completed handle.
        handle.complete();
    }

    #[test]
    fn test_finish_is_monotonic() {
        let (handle, signal) = native().pending();
        signal.finish(Ok(()));
        signal.finish(Err(Box::new("late")));
        assert!(handle.is_completed());
        handle.complete();
    }

    #[test]
    fn test_on_completed_runs_after_and_immediately() {
        let (handle, signal) = native().pending();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        handle.on_completed(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        signal.finish(Ok(()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let c = calls.clone();
        handle.on_completed(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wait_polls_once_per_tick() {
        let host = HostLoop::new();
        let (handle, signal) = cooperative(&host).pending();
        let resumed = Arc::new(AtomicUsize::new(0));

        let h = handle.clone();
        let r = resumed.clone();
        host.spawn(async move {
            h.wait().await;
            r.fetch_add(1, Ordering::SeqCst);
        });

        host.tick();
        host.tick();
        assert_eq!(resumed.load(Ordering::SeqCst), 0);

        signal.finish(Ok(()));
        assert_eq!(resumed.load(Ordering::SeqCst), 0);
        host.tick();
        assert_eq!(resumed.load(Ordering::SeqCst), 1);
        assert_eq!(host.pending_tasks(), 0);
    }

    #[test]
    fn test_wait_on_completed_handle_does_not_yield() {
        let host = HostLoop::new();
        let handle = cooperative(&host).finished();
        let done = Arc::new(AtomicUsize::new(0));

        let d = done.clone();
        host.spawn(async move {
            handle.wait().await;
            handle.wait().await;
            d.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(host.current_tick(), 0);
    }

    #[test]
    fn test_cooperative_complete_drives_ticks() {
        let host = HostLoop::new();
        let (handle, signal) = cooperative(&host).pending();

        let h = host.clone();
        host.spawn(async move {
            for _ in 0..3 {
                h.next_tick().await;
            }
            signal.finish(Ok(()));
        });

        handle.complete();
        assert_eq!(host.current_tick(), 3);
    }

    #[test]
    fn test_block_strategy_skips_ticks() {
        let completer = Completer::new(HostLoop::new(), Source::Native, WaitStrategy::Block);
        let (handle, signal) = completer.pending();

        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            signal.finish(Ok(()));
        });
        futures::executor::block_on(handle.wait());
        assert!(handle.is_completed());
        worker.join().unwrap();
    }

    #[test]
    fn test_debug_format() {
        let handle: JobHandle = native().finished();
        let debug = format!("{:?}", handle);
        assert!(debug.contains("completed: true"));
        assert!(debug.contains("Native"));
    }
}

#[cfg(test)]
mod bunch_handle_tests {
    use super::*;

    #[test]
    fn test_bunch_done_only_when_all_done() {
        let completer = native();
        let (a, sa) = completer.pending();
        let (b, sb) = completer.pending();
        let bunch = BunchHandle::new(vec![a, b], completer);

        assert_eq!(bunch.len(), 2);
        sa.finish(Ok(()));
        assert!(!bunch.is_completed());
        sb.finish(Ok(()));
        assert!(bunch.is_completed());
        bunch.complete();
        bunch.complete();
    }

    #[test]
    fn test_joined_completes_after_last_member() {
        let completer = native();
        let (a, sa) = completer.pending();
        let (b, sb) = completer.pending();
        let bunch = BunchHandle::new(vec![a, b], completer);
        let joined = bunch.joined();

        sb.finish(Ok(()));
        assert!(!joined.is_completed());
        sa.finish(Ok(()));
        assert!(joined.is_completed());
    }

    #[test]
    fn test_empty_bunch_is_complete() {
        let bunch = BunchHandle::new(Vec::new(), native());
        assert!(bunch.is_empty());
        assert!(bunch.is_completed());
        assert!(bunch.joined().is_completed());
        futures::executor::block_on(bunch.wait());
    }

    #[test]
    fn test_bunch_wait_on_host() {
        let host = HostLoop::new();
        let completer = cooperative(&host);
        let (a, sa) = completer.pending();
        let bunch = BunchHandle::new(vec![a], completer);

        let b = bunch.clone();
        host.spawn(async move { b.wait().await });
        assert_eq!(host.pending_tasks(), 1);

        sa.finish(Ok(()));
        host.tick();
        assert_eq!(host.pending_tasks(), 0);
    }
}
