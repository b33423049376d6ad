//! Scheduling errors.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = ScheduleError> = std::result::Result<T, E>;

/// Errors raised while building partitions or configuring a scheduler.
///
/// Faults raised inside a job body are not represented here: they travel with
/// the job's completion handle and resume on whoever observes it.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// A view or partition reaches past the end of its backing buffer.
    #[error("range of {len} at offset {offset} is out of bounds for length {capacity}")]
    OutOfRange {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// The worker thread pool could not be built.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The process-global scheduler was already installed.
    #[error("global scheduler is already initialized")]
    AlreadyInitialized,

    /// A configuration value is unusable.
    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),

    /// A RON configuration document failed to parse.
    #[error("config parse error: {0}")]
    Config(#[from] ron::error::SpannedError),
}
