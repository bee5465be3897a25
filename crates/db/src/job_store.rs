//! Storage contract for build jobs and the dispatch queue.

use async_trait::async_trait;
use shipyard_core::auto_fix::AutoFixBlocked;
use shipyard_core::build_job::{BuildJob, BuildRequest, StatusUpdate, TransitionError};
use shipyard_core::report::{ReportEffect, RunnerReport};
use shipyard_core::types::{JobId, Timestamp};

/// Failure of the storage backend itself.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of trying to mark a job as being auto-fixed.
#[derive(Debug, Clone, PartialEq)]
pub enum AutoFixClaim {
    /// The flag was set; the snapshot is the job at that moment.
    Started(BuildJob),
    Blocked(AutoFixBlocked),
    NotFound,
}

/// Authoritative table of build jobs plus the FIFO dispatch queue.
///
/// Every method is one atomic step with respect to every other method on the
/// same store. Operations on a missing job are no-ops unless stated otherwise.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store a new `queued` job for `request` and append it to the queue.
    async fn create(&self, request: BuildRequest) -> StoreResult<BuildJob>;

    async fn get(&self, id: JobId) -> StoreResult<Option<BuildJob>>;

    /// Every job, in no particular order.
    async fn list_all(&self) -> StoreResult<Vec<BuildJob>>;

    /// Append log lines, keeping only the most recent ones past the cap.
    async fn append_logs(&self, id: JobId, lines: Vec<String>) -> StoreResult<()>;

    /// Merge a partial update. Returns the rejected transition, if any; the
    /// rest of the update is dropped along with it.
    async fn set_status(
        &self,
        id: JobId,
        update: StatusUpdate,
    ) -> StoreResult<Option<TransitionError>>;

    /// Replace the compiler error list wholesale.
    async fn set_compiler_errors(&self, id: JobId, errors: Vec<String>) -> StoreResult<()>;

    /// Link a failed job to its retry and clear its auto-fix flag.
    async fn set_next_job(&self, failed_id: JobId, next_id: JobId) -> StoreResult<()>;

    async fn set_auto_fix_in_progress(&self, id: JobId, in_progress: bool) -> StoreResult<()>;

    /// Hand the oldest queued job to `runner_id`, or `None` when there is no
    /// work. Queue entries for jobs that are gone or no longer queued are
    /// discarded on the way.
    async fn claim(&self, runner_id: &str) -> StoreResult<Option<BuildJob>>;

    /// Fold a runner report into a job. `None` when the job does not exist.
    async fn apply_report(
        &self,
        id: JobId,
        report: RunnerReport,
        now: Timestamp,
    ) -> StoreResult<Option<(BuildJob, ReportEffect)>>;

    /// Check the auto-fix preconditions and set the in-progress flag in one
    /// step, so two triggers for the same job cannot both produce a retry.
    async fn begin_auto_fix(&self, id: JobId) -> StoreResult<AutoFixClaim>;

    /// Fail every running job whose runner has been silent since before
    /// `cutoff`. Returns the jobs that were failed.
    async fn fail_stale(
        &self,
        cutoff: Timestamp,
        now: Timestamp,
        reason: &str,
    ) -> StoreResult<Vec<BuildJob>>;
}
