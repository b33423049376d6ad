//! Execution back ends
//!
//! A [`Backend`] turns type-erased work into running partitions and hands
//! back completion handles. Exactly one back end serves a scheduler for its
//! whole life; the scheduler never branches on the mode per call.

use std::fmt;
use std::sync::Arc;

use crate::runtime::handle::{BunchHandle, JobHandle};
use crate::runtime::host::HostLoop;
use crate::runtime::job::Partition;

use super::ExecutionMode;

/// A single-shot unit of work, consumed when run.
pub type Work = Box<dyn FnOnce() + Send>;

/// Body run once per chunk of an indexed or batched job.
pub type ChunkBody = Arc<dyn Fn(Partition) + Send + Sync>;

/// Dispatch primitive shared by both execution modes.
///
/// Every submission takes at most one predecessor and starts only after it
/// has completed. Job values are dropped before their handle reports done.
pub trait Backend: Send + Sync + fmt::Debug {
    /// The substrate this back end runs on.
    fn mode(&self) -> ExecutionMode;

    /// The host loop handles suspend on.
    fn host(&self) -> &HostLoop;

    /// Run one unit of work.
    fn submit(
        &self,
        work: Work,
        depends_on: Option<&JobHandle>,
    ) -> JobHandle;

    /// Run `body` over `[0, len)` in chunks of `batch` indices.
    ///
    /// `batch` is at least 1.
    fn submit_chunks(
        &self,
        len: usize,
        batch: usize,
        body: ChunkBody,
        depends_on: Option<&JobHandle>,
    ) -> JobHandle;

    /// Run pre-built partitions, each depending only on `depends_on`.
    fn submit_partitions(
        &self,
        partitions: Vec<Work>,
        depends_on: Option<&JobHandle>,
    ) -> BunchHandle;
}
