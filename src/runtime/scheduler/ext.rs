//! Method-style scheduling onto the process-wide scheduler.
//!
//! ```no_run
//! use adaptjob::prelude::*;
//!
//! # async fn demo() -> adaptjob::Result<()> {
//! let squares = NativeArray::new(256, 0u32);
//! let out = squares.clone();
//! let fill = move |i: usize| unsafe { out.set(i, (i * i) as u32) };
//!
//! fill.adapt_schedule_for(squares.len(), 0, None).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use crate::runtime::error::Result;
use crate::runtime::handle::{BunchHandle, JobHandle};
use crate::runtime::job::{BatchJob, BunchJob, Job, ParallelJob};

use super::global;

/// Schedule a [`Job`] on the global scheduler.
pub trait JobExt: Job + Sized {
    /// Submit and return the handle.
    fn schedule(
        self,
        depends_on: Option<&JobHandle>,
    ) -> Result<JobHandle> {
        Ok(global()?.schedule(self, depends_on))
    }

    /// Submit now; the future resolves once the job is done.
    fn adapt_schedule(
        self,
        depends_on: Option<&JobHandle>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let handle = self.schedule(depends_on);
        async move {
            handle?.wait().await;
            Ok(())
        }
    }
}

impl<J: Job> JobExt for J {}

/// Schedule a [`ParallelJob`] on the global scheduler.
pub trait ParallelJobExt: ParallelJob + Sized {
    /// Submit over `[0, len)` and return the handle.
    fn schedule_for(
        self,
        len: usize,
        batch: usize,
        depends_on: Option<&JobHandle>,
    ) -> Result<JobHandle> {
        Ok(global()?.schedule_for(self, len, batch, depends_on))
    }

    /// Submit now; the future resolves once every index is done.
    fn adapt_schedule_for(
        self,
        len: usize,
        batch: usize,
        depends_on: Option<&JobHandle>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let handle = self.schedule_for(len, batch, depends_on);
        async move {
            handle?.wait().await;
            Ok(())
        }
    }
}

impl<J: ParallelJob> ParallelJobExt for J {}

/// Schedule a [`BatchJob`] on the global scheduler.
pub trait BatchJobExt: BatchJob + Sized {
    /// Submit over `[0, len)` and return the handle.
    fn schedule_batch(
        self,
        len: usize,
        batch: usize,
        depends_on: Option<&JobHandle>,
    ) -> Result<JobHandle> {
        Ok(global()?.schedule_batch(self, len, batch, depends_on))
    }

    /// Submit now; the future resolves once every chunk is done.
    fn adapt_schedule_batch(
        self,
        len: usize,
        batch: usize,
        depends_on: Option<&JobHandle>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let handle = self.schedule_batch(len, batch, depends_on);
        async move {
            handle?.wait().await;
            Ok(())
        }
    }
}

impl<J: BatchJob> BatchJobExt for J {}

/// Schedule a [`BunchJob`] on the global scheduler.
pub trait BunchJobExt: BunchJob {
    /// Slice into `workers` partitions, submit them, and return the handles.
    fn schedule_bunch(
        self,
        workers: usize,
        depends_on: Option<&JobHandle>,
    ) -> Result<BunchHandle> {
        global()?.schedule_bunch(self, workers, depends_on)
    }

    /// Submit now; the future resolves once every partition is done.
    fn adapt_schedule_bunch(
        self,
        workers: usize,
        depends_on: Option<&JobHandle>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let bunch = self.schedule_bunch(workers, depends_on);
        async move {
            bunch?.wait().await;
            Ok(())
        }
    }
}

impl<J: BunchJob> BunchJobExt for J {}
