//! Job shapes and partition descriptors
//!
//! A job is a plain value carrying its own work state. Four shapes exist:
//!
//! - [`Job`] - one indivisible unit, executed once
//! - [`ParallelJob`] - executed once per index of `[0, len)`
//! - [`BatchJob`] - executed once per chunk, receiving `(start, count)`
//! - [`BunchJob`] - a [`Job`] that knows how to bind a copy of itself to one
//!   worker's partition
//!
//! [`Partition`] describes one slice of an index space.

use std::fmt;
use std::ops::Range;

use crate::runtime::error::{Result, ScheduleError};

/// Single-shot job: one indivisible unit of work.
pub trait Job: Send + 'static {
    /// Run the whole unit.
    fn execute(&mut self);
}

/// Indexed-parallel job, invoked once per index.
///
/// Invocations for different indices may run concurrently on the threaded
/// back end, so the body only gets shared access to the job.
pub trait ParallelJob: Send + Sync + 'static {
    /// Run the body for one index.
    fn execute(&self, index: usize);
}

/// Batched-parallel job: the body owns iteration over its sub-range.
pub trait BatchJob: Send + Sync + 'static {
    /// Run the body for `count` indices starting at `start`.
    fn execute(&self, start: usize, count: usize);
}

/// A single-shot job that partitions itself.
///
/// `slice` is a pure partition constructor: from the base job it builds the
/// job bound to worker `index` of `workers`. Any buffer a partition writes to
/// must be narrowed to a view disjoint from every other partition's view.
///
/// ```
/// use adaptjob::prelude::*;
///
/// struct FillRows {
///     out: NativeArray<u32>,
///     row: usize,
/// }
///
/// impl Job for FillRows {
///     fn execute(&mut self) {
///         for k in 0..self.out.len() {
///             // SAFETY: each partition holds its own row view.
///             unsafe { self.out.set(k, self.row as u32) };
///         }
///     }
/// }
///
/// impl BunchJob for FillRows {
///     fn slice(&self, index: usize, workers: usize) -> adaptjob::Result<Self> {
///         let width = self.out.len() / workers;
///         Ok(Self { out: self.out.slice_2d(index, width)?, row: index })
///     }
/// }
/// ```
pub trait BunchJob: Job + Sized {
    /// Build the partition bound to worker `index` of `workers`.
    fn slice(&self, index: usize, workers: usize) -> Result<Self>;
}

impl<F> Job for F
where
    F: FnMut() + Send + 'static,
{
    #[inline]
    fn execute(&mut self) {
        self()
    }
}

impl<F> ParallelJob for F
where
    F: Fn(usize) + Send + Sync + 'static,
{
    #[inline]
    fn execute(&self, index: usize) {
        self(index)
    }
}

impl<F> BatchJob for F
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    #[inline]
    fn execute(&self, start: usize, count: usize) {
        self(start, count)
    }
}

/// One slice of an index space.
///
/// Partitions produced together cover `[0, N)` without gaps or overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Partition {
    /// Position of this partition among its siblings.
    pub index: usize,
    /// Number of sibling partitions.
    pub total: usize,
    /// First index covered.
    pub start: usize,
    /// Number of indices covered.
    pub len: usize,
}

impl Partition {
    /// One past the last index covered.
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// The covered index range.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    /// Check if the partition covers no index.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Split `[0, len)` evenly across `workers` and return partition `index`.
    ///
    /// Lengths differ by at most one: the first `len % workers` partitions
    /// take `len / workers + 1` indices, the rest take `len / workers`.
    pub fn even(
        len: usize,
        workers: usize,
        index: usize,
    ) -> Result<Self> {
        if index >= workers {
            return Err(ScheduleError::OutOfRange {
                offset: index,
                len: 1,
                capacity: workers,
            });
        }

        let base = len / workers;
        let extra = len % workers;
        let start = index * base + index.min(extra);
        let size = base + usize::from(index < extra);

        Ok(Self {
            index,
            total: workers,
            start,
            len: size,
        })
    }

    /// Fixed-stride chunks over `[0, len)`; the last one may be short.
    ///
    /// A `batch` of zero is treated as one.
    pub fn chunks(
        len: usize,
        batch: usize,
    ) -> Chunks {
        let batch = batch.max(1);
        Chunks {
            len,
            batch,
            total: len.div_ceil(batch),
            next: 0,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Partition({}/{}: {}..{})",
            self.index,
            self.total,
            self.start,
            self.end()
        )
    }
}

/// Iterator returned by [`Partition::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks {
    len: usize,
    batch: usize,
    total: usize,
    next: usize,
}

impl Iterator for Chunks {
    type Item = Partition;

    fn next(&mut self) -> Option<Partition> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let start = index * self.batch;
        Some(Partition {
            index,
            total: self.total,
            start,
            len: self.batch.min(self.len - start),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Chunks {}

#[cfg(test)]
mod tests;
