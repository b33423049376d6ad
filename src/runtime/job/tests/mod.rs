//! Partition 单元测试

use crate::runtime::error::ScheduleError;
use crate::runtime::job::{BatchJob, Job, ParallelJob, Partition};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[cfg(test)]
mod even_tests {
    use super::*;

    #[test]
    fn test_even_divisible() {
        let parts: Vec<_> = (0..4).map(|i| Partition::even(400, 4, i).unwrap()).collect();
        for (i, p) in parts.iter().enumerate() {
            assert_eq!(p.start, i * 100);
            assert_eq!(p.len, 100);
            assert_eq!(p.total, 4);
        }
    }

    #[test]
    fn test_even_remainder_goes_first() {
        let lens: Vec<_> = (0..3)
            .map(|i| Partition::even(10, 3, i).unwrap().len)
            .collect();
        assert_eq!(lens, vec![4, 3, 3]);
        assert_eq!(Partition::even(10, 3, 2).unwrap().range(), 7..10);
    }

    #[test]
    fn test_even_more_workers_than_items() {
        let parts: Vec<_> = (0..5).map(|i| Partition::even(2, 5, i).unwrap()).collect();
        assert_eq!(parts.iter().filter(|p| p.is_empty()).count(), 3);
        assert_eq!(parts.iter().map(|p| p.len).sum::<usize>(), 2);
        assert_eq!(parts[4].start, 2);
    }

    #[test]
    fn test_even_index_out_of_range() {
        let err = Partition::even(10, 2, 2).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::OutOfRange { offset: 2, capacity: 2, .. }
        ));
    }
}

#[cfg(test)]
mod chunk_tests {
    use super::*;

    #[test]
    fn test_chunks_with_tail() {
        let chunks: Vec<_> = Partition::chunks(100, 3).collect();
        assert_eq!(chunks.len(), 34);
        assert_eq!(chunks[0].range(), 0..3);
        assert_eq!(chunks[32].range(), 96..99);
        assert_eq!(chunks[33].range(), 99..100);
        assert!(chunks.iter().all(|c| c.total == 34));
    }

    #[test]
    fn test_chunks_empty_input() {
        assert_eq!(Partition::chunks(0, 8).count(), 0);
    }

    #[test]
    fn test_chunks_zero_batch_is_one() {
        let chunks = Partition::chunks(5, 0);
        assert_eq!(chunks.len(), 5);
    }

    #[test]
    fn test_partition_display() {
        let p = Partition::chunks(10, 4).nth(1).unwrap();
        assert_eq!(p.to_string(), "Partition(1/3: 4..8)");
    }
}

#[cfg(test)]
mod closure_job_tests {
    use super::*;

    #[test]
    fn test_closures_are_jobs() {
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        let mut single = move || {
            h.fetch_add(1, Ordering::SeqCst);
        };
        Job::execute(&mut single);

        let h = hits.clone();
        let indexed = move |i: usize| {
            h.fetch_add(i, Ordering::SeqCst);
        };
        ParallelJob::execute(&indexed, 10);

        let h = hits.clone();
        let batched = move |_start: usize, count: usize| {
            h.fetch_add(count, Ordering::SeqCst);
        };
        BatchJob::execute(&batched, 0, 100);

        assert_eq!(hits.load(Ordering::SeqCst), 111);
    }
}
