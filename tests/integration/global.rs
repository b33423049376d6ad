//! Process-wide scheduler integration tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use adaptjob::prelude::*;
use adaptjob::runtime::scheduler::{global, init};

/// One test touches the global so installation order is fixed.
#[test]
fn test_global_scheduler_and_extensions() {
    let installed = init(SchedulerConfig {
        num_workers: 2,
        ..SchedulerConfig::with_mode(ExecutionMode::Threaded)
    })
    .unwrap();
    assert_eq!(installed.mode(), ExecutionMode::Threaded);
    assert!(std::ptr::eq(installed, global().unwrap()));

    let again = init(SchedulerConfig::default());
    assert!(matches!(again, Err(ScheduleError::AlreadyInitialized)));

    let hits = Arc::new(AtomicUsize::new(0));

    let h = hits.clone();
    let first = (move || {
        h.fetch_add(1, Ordering::SeqCst);
    })
    .schedule(None)
    .unwrap();

    let h = hits.clone();
    let indexed = (move |_i: usize| {
        h.fetch_add(1, Ordering::SeqCst);
    })
    .schedule_for(10, 0, Some(&first))
    .unwrap();

    let h = hits.clone();
    let batched = (move |_start: usize, count: usize| {
        h.fetch_add(count, Ordering::SeqCst);
    })
    .adapt_schedule_batch(20, 5, Some(&indexed));
    global().unwrap().host().block_on(batched).unwrap();

    assert!(first.is_completed());
    assert!(indexed.is_completed());
    assert_eq!(hits.load(Ordering::SeqCst), 31);
}
