//! Property tests for partitioning and chunk coverage

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use adaptjob::prelude::*;
use adaptjob::runtime::scheduler::effective_batch;
use proptest::prelude::*;

/// Writes a value derived from the global index into its even share.
struct EvenFill {
    out: NativeArray<u64>,
    start: usize,
}

impl Job for EvenFill {
    fn execute(&mut self) {
        for k in 0..self.out.len() {
            let global = (self.start + k) as u64;
            // SAFETY: even partitions are disjoint.
            unsafe { self.out.set(k, global * global + 1) };
        }
    }
}

impl BunchJob for EvenFill {
    fn slice(
        &self,
        index: usize,
        workers: usize,
    ) -> adaptjob::Result<Self> {
        let part = Partition::even(self.out.len(), workers, index)?;
        Ok(Self {
            out: self.out.slice(part.start, part.len)?,
            start: part.start,
        })
    }
}

fn run_even_fill(
    mode: ExecutionMode,
    len: usize,
    workers: usize,
) -> Vec<u64> {
    let scheduler = AdaptiveScheduler::new(SchedulerConfig {
        num_workers: 2,
        ..SchedulerConfig::with_mode(mode)
    })
    .unwrap();
    let out = NativeArray::new(len, 0u64);
    let job = EvenFill {
        out: out.clone(),
        start: 0,
    };
    scheduler.schedule_bunch(job, workers, None).unwrap().complete();
    out.into_vec().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn bunch_output_matches_across_modes(len in 0usize..500, workers in 1usize..9) {
        let threaded = run_even_fill(ExecutionMode::Threaded, len, workers);
        let cooperative = run_even_fill(ExecutionMode::Cooperative, len, workers);
        prop_assert_eq!(&threaded, &cooperative);
        prop_assert!(threaded.iter().enumerate().all(|(k, &v)| v == (k * k + 1) as u64));
    }
}

proptest! {
    #[test]
    fn even_partitions_tile_the_range(len in 0usize..2_000, workers in 1usize..64) {
        let mut next = 0;
        let mut sizes = Vec::with_capacity(workers);
        for index in 0..workers {
            let part = Partition::even(len, workers, index).unwrap();
            prop_assert_eq!(part.start, next);
            prop_assert_eq!(part.total, workers);
            next = part.end();
            sizes.push(part.len);
        }
        prop_assert_eq!(next, len);

        let max = sizes.iter().copied().max().unwrap_or(0);
        let min = sizes.iter().copied().min().unwrap_or(0);
        prop_assert!(max - min <= 1);
    }

    #[test]
    fn chunks_cover_every_index_once(len in 0usize..2_000, batch in 0usize..100) {
        let batch = effective_batch(len, batch, 32);
        let mut seen = vec![0u8; len];
        for chunk in Partition::chunks(len, batch) {
            prop_assert!(chunk.len >= 1 && chunk.len <= batch);
            for index in chunk.range() {
                seen[index] += 1;
            }
        }
        prop_assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn cooperative_job_visits_range_once(len in 0usize..300, batch in 0usize..40) {
        let scheduler =
            AdaptiveScheduler::new(SchedulerConfig::with_mode(ExecutionMode::Cooperative)).unwrap();
        let hits: Arc<Vec<AtomicUsize>> = Arc::new((0..len).map(|_| AtomicUsize::new(0)).collect());

        let h = hits.clone();
        let handle = scheduler.schedule_for(
            move |i: usize| {
                h[i].fetch_add(1, Ordering::SeqCst);
            },
            len,
            batch,
            None,
        );
        handle.complete();

        let chunks = len.div_ceil(scheduler.effective_batch(len, batch));
        prop_assert_eq!(scheduler.host().current_tick(), chunks as u64);
        prop_assert!(hits.iter().all(|n| n.load(Ordering::SeqCst) == 1));
    }
}
