//! adaptjob - adaptive job scheduling
//!
//! Run a unit of work once, optionally split into partitions, and let the
//! scheduler decide how it executes: genuinely in parallel on a thread pool, or
//! cooperatively in bounded chunks across the ticks of a single-threaded host
//! loop. Callers get the same completion handle either way.
//!
//! # Example
//!
//! ```no_run
//! use adaptjob::prelude::*;
//!
//! struct Square {
//!     out: NativeArray<u64>,
//! }
//!
//! impl ParallelJob for Square {
//!     fn execute(&self, index: usize) {
//!         // SAFETY: every index is visited by exactly one partition.
//!         unsafe { self.out.set(index, (index * index) as u64) };
//!     }
//! }
//!
//! fn main() -> adaptjob::Result<()> {
//!     let scheduler = AdaptiveScheduler::new(SchedulerConfig::default())?;
//!     let out = NativeArray::new(1024, 0u64);
//!     let handle = scheduler.schedule_for(Square { out: out.clone() }, out.len(), 0, None);
//!     handle.complete();
//!     assert_eq!(out.get(12), Some(144));
//!     Ok(())
//! }
//! ```
//!
//! # Crate Features
//!
//! - `cooperative`: make the cooperative back end the default execution mode

#![warn(rust_2018_idioms)]

// Public modules
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use runtime::error::{Result, ScheduleError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::runtime::buffer::NativeArray;
    pub use crate::runtime::handle::{BunchHandle, JobHandle, JobId};
    pub use crate::runtime::host::HostLoop;
    pub use crate::runtime::job::{BatchJob, BunchJob, Job, ParallelJob, Partition};
    pub use crate::runtime::scheduler::{
        AdaptiveScheduler, BatchJobExt, BunchJobExt, ExecutionMode, JobExt, ParallelJobExt,
        SchedulerConfig, WaitStrategy,
    };
    pub use crate::runtime::error::{Result, ScheduleError};
}
