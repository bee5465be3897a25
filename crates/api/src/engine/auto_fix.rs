//! Auto-fix loop: failed build -> correction request -> fixed sources ->
//! linked retry job.
//!
//! The precondition check and the in-progress flag are one store step
//! ([`JobStore::begin_auto_fix`]). The code generator is awaited with no store
//! lock held; only the final create-and-link steps touch the store again.
//! Request handlers go through [`AutoFixEngine::run_detached`], so a dropped
//! request never strands the in-progress flag.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Serialize, Serializer};
use shipyard_codegen::{CodeGenerator, CodegenError};
use shipyard_core::auto_fix::{
    correction_request, merge_sources, next_attempt, retry_request, AutoFixBlocked, GaveUpReason,
};
use shipyard_core::build_job::{BuildJob, BuildJobStatus};
use shipyard_core::job_events::{
    EVENT_AUTOFIX_GAVE_UP, EVENT_AUTOFIX_STARTED, EVENT_BUILD_CREATED, EVENT_RETRY_CREATED,
};
use shipyard_core::source_fixer::fix_sources;
use shipyard_core::types::JobId;
use shipyard_db::{AutoFixClaim, JobStore, StoreError};
use shipyard_events::{EventBus, PlatformEvent};

// ---------------------------------------------------------------------------
// Outcome and errors
// ---------------------------------------------------------------------------

/// Result of an auto-fix trigger that ran to a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AutoFixOutcome {
    /// A retry job was queued.
    Created {
        job_id: JobId,
        attempt: u32,
        max_attempts: u32,
    },
    /// A policy stop. Not an error.
    GaveUp {
        #[serde(serialize_with = "reason_message")]
        reason: GaveUpReason,
    },
}

fn reason_message<S: Serializer>(reason: &GaveUpReason, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(reason.message())
}

/// Why an auto-fix trigger did not reach a decision.
#[derive(Debug, thiserror::Error)]
pub enum AutoFixError {
    #[error("Build job {0} not found")]
    NotFound(JobId),

    #[error("job is not in failed state (current: {0})")]
    NotFailed(BuildJobStatus),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error("Auto-fix task interrupted: {0}")]
    Interrupted(String),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives one auto-fix attempt per call to [`AutoFixEngine::run`].
#[derive(Clone)]
pub struct AutoFixEngine {
    store: Arc<dyn JobStore>,
    codegen: Arc<dyn CodeGenerator>,
    event_bus: Arc<EventBus>,
}

impl AutoFixEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        codegen: Arc<dyn CodeGenerator>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            codegen,
            event_bus,
        }
    }

    /// Try to produce a corrected retry for `failed_id`.
    pub async fn run(&self, failed_id: JobId) -> Result<AutoFixOutcome, AutoFixError> {
        let job = match self.store.begin_auto_fix(failed_id).await? {
            AutoFixClaim::Started(job) => job,
            AutoFixClaim::NotFound => return Err(AutoFixError::NotFound(failed_id)),
            AutoFixClaim::Blocked(AutoFixBlocked::NotFailed(status)) => {
                return Err(AutoFixError::NotFailed(status));
            }
            AutoFixClaim::Blocked(AutoFixBlocked::GaveUp(reason)) => {
                // Another trigger owns this job; leave its log alone.
                if reason != GaveUpReason::AlreadyInProgress {
                    self.log(failed_id, format!("Auto-fix gave up: {reason}"))
                        .await?;
                }
                self.publish_gave_up(failed_id, reason);
                return Ok(AutoFixOutcome::GaveUp { reason });
            }
        };

        let result = self.produce_retry(&job).await;

        // The flag is cleared by `set_next_job` on success; every other exit
        // clears it here.
        if !matches!(result, Ok(AutoFixOutcome::Created { .. })) {
            self.clear_in_progress(job.id).await;
        }

        result
    }

    /// Run [`Self::run`] on its own task and wait for it.
    ///
    /// Dropping the returned future (request timeout, client disconnect) does
    /// not cancel the loop; it still finishes and clears the flag. A panic
    /// inside the loop clears the flag and surfaces as
    /// [`AutoFixError::Interrupted`].
    pub async fn run_detached(&self, failed_id: JobId) -> Result<AutoFixOutcome, AutoFixError> {
        let engine = self.clone();
        let task = tokio::spawn(async move {
            match AssertUnwindSafe(engine.run(failed_id)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(job_id = %failed_id, "Auto-fix task panicked");
                    engine.clear_in_progress(failed_id).await;
                    Err(AutoFixError::Interrupted("auto-fix task panicked".into()))
                }
            }
        });

        task.await
            .map_err(|e| AutoFixError::Interrupted(e.to_string()))?
    }

    async fn produce_retry(&self, job: &BuildJob) -> Result<AutoFixOutcome, AutoFixError> {
        // `begin_auto_fix` already checked the budget; this only guards the
        // arithmetic.
        let Some(next) = next_attempt(job) else {
            let reason = GaveUpReason::MaxAttemptsReached;
            self.log(job.id, format!("Auto-fix gave up: {reason}")).await?;
            self.publish_gave_up(job.id, reason);
            return Ok(AutoFixOutcome::GaveUp { reason });
        };
        let request = correction_request(job, next);

        self.log(
            job.id,
            format!(
                "Auto-fix attempt {}/{}: requesting corrections for {} compiler error(s)",
                request.attempt,
                request.max_attempts,
                request.errors.len()
            ),
        )
        .await?;
        self.event_bus.publish(
            PlatformEvent::build(EVENT_AUTOFIX_STARTED, job.id).with_payload(serde_json::json!({
                "attempt": request.attempt,
                "max_attempts": request.max_attempts,
                "errors": request.errors.len(),
            })),
        );
        tracing::info!(
            job_id = %job.id,
            attempt = request.attempt,
            max_attempts = request.max_attempts,
            errors = request.errors.len(),
            "Auto-fix started",
        );

        let corrected = match self.codegen.correct(&request).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Code generator failed");
                self.log(job.id, format!("Auto-fix failed: {e}")).await?;
                return Err(AutoFixError::Codegen(e));
            }
        };

        if corrected.is_empty() {
            let reason = GaveUpReason::GeneratorReturnedNoFiles;
            self.log(job.id, format!("Auto-fix gave up: {reason}"))
                .await?;
            self.publish_gave_up(job.id, reason);
            return Ok(AutoFixOutcome::GaveUp { reason });
        }

        let changed = corrected.len();
        let merged = merge_sources(&request.files, corrected);
        let fixed = fix_sources(&merged);
        if !fixed.applied.is_empty() {
            let summary: Vec<String> = fixed
                .applied
                .iter()
                .map(|fix| format!("{} ({:?})", fix.path, fix.rule))
                .collect();
            tracing::debug!(job_id = %job.id, fixes = %summary.join(", "), "Source fixer applied");
        }

        let retry = self.store.create(retry_request(job, next, fixed.files)).await?;
        self.store.set_next_job(job.id, retry.id).await?;

        let attempt = retry.request.attempt;
        let max_attempts = retry.request.max_attempts;

        self.log(
            job.id,
            format!(
                "Auto-fix created retry job {} (attempt {attempt}/{max_attempts}, {changed} file(s) corrected, {} fixer rewrite(s))",
                retry.id,
                fixed.applied.len()
            ),
        )
        .await?;
        self.log(
            retry.id,
            format!("Retry of build {} (attempt {attempt}/{max_attempts})", job.id),
        )
        .await?;

        self.event_bus.publish(
            PlatformEvent::build(EVENT_BUILD_CREATED, retry.id).with_payload(serde_json::json!({
                "project_id": retry.request.project_id,
                "attempt": attempt,
                "parent_job_id": job.id,
            })),
        );
        self.event_bus.publish(
            PlatformEvent::build(EVENT_RETRY_CREATED, job.id).with_payload(serde_json::json!({
                "next_job_id": retry.id,
                "attempt": attempt,
                "max_attempts": max_attempts,
            })),
        );
        tracing::info!(
            job_id = %job.id,
            next_job_id = %retry.id,
            attempt,
            max_attempts,
            "Auto-fix retry queued",
        );

        Ok(AutoFixOutcome::Created {
            job_id: retry.id,
            attempt,
            max_attempts,
        })
    }

    async fn clear_in_progress(&self, id: JobId) {
        if let Err(e) = self.store.set_auto_fix_in_progress(id, false).await {
            tracing::error!(job_id = %id, error = %e, "Failed to clear auto-fix flag");
        }
    }

    async fn log(&self, id: JobId, line: String) -> Result<(), StoreError> {
        self.store.append_logs(id, vec![line]).await
    }

    fn publish_gave_up(&self, id: JobId, reason: GaveUpReason) {
        tracing::info!(job_id = %id, reason = %reason, "Auto-fix gave up");
        self.event_bus.publish(
            PlatformEvent::build(EVENT_AUTOFIX_GAVE_UP, id)
                .with_payload(serde_json::json!({ "reason": reason.message() })),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
