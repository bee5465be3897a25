//! In-process [`JobStore`] backed by a `HashMap` and a `VecDeque` of ids.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use shipyard_core::auto_fix::{check_preconditions, AutoFixBlocked, GaveUpReason};
use shipyard_core::build_job::{
    BuildJob, BuildJobStatus, BuildRequest, StatusUpdate, TransitionError,
};
use shipyard_core::report::{ReportEffect, RunnerReport};
use shipyard_core::types::{JobId, Timestamp};
use tokio::sync::Mutex;

use crate::job_store::{AutoFixClaim, JobStore, StoreResult};

#[derive(Default)]
struct Tables {
    jobs: HashMap<JobId, BuildJob>,
    queue: VecDeque<JobId>,
}

/// Job table and dispatch queue guarded by a single mutex.
#[derive(Default)]
pub struct InMemoryJobStore {
    tables: Mutex<Tables>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids waiting in the dispatch queue, stale entries included.
    pub async fn queue_len(&self) -> usize {
        self.tables.lock().await.queue.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, request: BuildRequest) -> StoreResult<BuildJob> {
        let mut tables = self.tables.lock().await;
        let mut id = uuid::Uuid::new_v4();
        while tables.jobs.contains_key(&id) {
            id = uuid::Uuid::new_v4();
        }
        let job = BuildJob::new(id, request, Utc::now());
        tables.jobs.insert(id, job.clone());
        tables.queue.push_back(id);
        Ok(job)
    }

    async fn get(&self, id: JobId) -> StoreResult<Option<BuildJob>> {
        Ok(self.tables.lock().await.jobs.get(&id).cloned())
    }

    async fn list_all(&self) -> StoreResult<Vec<BuildJob>> {
        Ok(self.tables.lock().await.jobs.values().cloned().collect())
    }

    async fn append_logs(&self, id: JobId, lines: Vec<String>) -> StoreResult<()> {
        if let Some(job) = self.tables.lock().await.jobs.get_mut(&id) {
            job.append_logs(lines);
        }
        Ok(())
    }

    async fn set_status(
        &self,
        id: JobId,
        update: StatusUpdate,
    ) -> StoreResult<Option<TransitionError>> {
        let mut tables = self.tables.lock().await;
        let Some(job) = tables.jobs.get_mut(&id) else {
            return Ok(None);
        };
        Ok(job.apply_update(update).err())
    }

    async fn set_compiler_errors(&self, id: JobId, errors: Vec<String>) -> StoreResult<()> {
        if let Some(job) = self.tables.lock().await.jobs.get_mut(&id) {
            job.compiler_errors = Some(errors);
        }
        Ok(())
    }

    async fn set_next_job(&self, failed_id: JobId, next_id: JobId) -> StoreResult<()> {
        if let Some(job) = self.tables.lock().await.jobs.get_mut(&failed_id) {
            if job.next_job_id.is_none() {
                job.next_job_id = Some(next_id);
            } else {
                tracing::warn!(
                    job_id = %failed_id,
                    next_job_id = %next_id,
                    "Job already linked to a retry; keeping the existing link",
                );
            }
            job.auto_fix_in_progress = false;
        }
        Ok(())
    }

    async fn set_auto_fix_in_progress(&self, id: JobId, in_progress: bool) -> StoreResult<()> {
        if let Some(job) = self.tables.lock().await.jobs.get_mut(&id) {
            job.auto_fix_in_progress = in_progress;
        }
        Ok(())
    }

    async fn claim(&self, runner_id: &str) -> StoreResult<Option<BuildJob>> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        while let Some(id) = tables.queue.pop_front() {
            let Some(job) = tables.jobs.get_mut(&id) else {
                tracing::debug!(job_id = %id, "Dropping queue entry for missing job");
                continue;
            };
            if job.status != BuildJobStatus::Queued {
                tracing::debug!(
                    job_id = %id,
                    status = %job.status,
                    "Dropping queue entry for job that is no longer queued",
                );
                continue;
            }
            if let Err(e) = job.claim(runner_id, Utc::now()) {
                tracing::warn!(job_id = %id, error = %e, "Queued job refused claim");
                continue;
            }
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    async fn apply_report(
        &self,
        id: JobId,
        report: RunnerReport,
        now: Timestamp,
    ) -> StoreResult<Option<(BuildJob, ReportEffect)>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.jobs.get_mut(&id).map(|job| {
            let effect = job.apply_report(&report, now);
            (job.clone(), effect)
        }))
    }

    async fn begin_auto_fix(&self, id: JobId) -> StoreResult<AutoFixClaim> {
        let mut tables = self.tables.lock().await;
        let Some(job) = tables.jobs.get_mut(&id) else {
            return Ok(AutoFixClaim::NotFound);
        };
        if let Err(blocked) = check_preconditions(job) {
            return Ok(AutoFixClaim::Blocked(blocked));
        }
        if job.is_superseded() {
            return Ok(AutoFixClaim::Blocked(AutoFixBlocked::GaveUp(
                GaveUpReason::RetryAlreadyCreated,
            )));
        }
        if job.auto_fix_in_progress {
            return Ok(AutoFixClaim::Blocked(AutoFixBlocked::GaveUp(
                GaveUpReason::AlreadyInProgress,
            )));
        }
        job.auto_fix_in_progress = true;
        Ok(AutoFixClaim::Started(job.clone()))
    }

    async fn fail_stale(
        &self,
        cutoff: Timestamp,
        now: Timestamp,
        reason: &str,
    ) -> StoreResult<Vec<BuildJob>> {
        let mut tables = self.tables.lock().await;
        let mut failed = Vec::new();
        for job in tables.jobs.values_mut() {
            if job.status != BuildJobStatus::Running {
                continue;
            }
            if job.last_activity().is_some_and(|at| at >= cutoff) {
                continue;
            }
            let update = StatusUpdate::finished(
                BuildJobStatus::Failed,
                now,
                None,
                Some(reason.to_string()),
            );
            if job.apply_update(update).is_ok() {
                job.log(format!("Build failed: {reason}"));
                failed.push(job.clone());
            }
        }
        Ok(failed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
