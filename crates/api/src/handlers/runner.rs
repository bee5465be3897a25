//! Handlers for the runner protocol under `/runner`.
//!
//! Runners poll `claim` for work and stream logs and status through `report`.
//! Every endpoint requires [`RunnerAuth`].

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shipyard_core::build_job::BuildJobStatus;
use shipyard_core::error::CoreError;
use shipyard_core::job_events::{EVENT_BUILD_CLAIMED, EVENT_BUILD_FAILED, EVENT_BUILD_SUCCEEDED};
use shipyard_core::report::RunnerReport;
use shipyard_core::types::JobId;
use shipyard_events::PlatformEvent;

use crate::error::{AppError, AppResult};
use crate::middleware::runner_auth::RunnerAuth;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of a claim call.
#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub runner_id: String,
}

/// What a report changed, echoed back to the runner.
#[derive(Debug, Serialize)]
pub struct ReportAck {
    pub job_id: JobId,
    pub status: BuildJobStatus,
    pub logs_appended: usize,
    pub compiler_errors_recorded: bool,
    /// Why the status field was dropped, if it was.
    pub status_ignored: Option<String>,
}

/// POST /api/v1/runner/claim
///
/// Hand the oldest queued build to the calling runner. `{"data": null}` means
/// there is no work.
pub async fn claim(
    _runner: RunnerAuth,
    State(state): State<AppState>,
    Json(input): Json<ClaimRequest>,
) -> AppResult<impl IntoResponse> {
    let runner_id = input.runner_id.trim();
    if runner_id.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "runner_id must not be empty".into(),
        )));
    }

    let claimed = state.store.claim(runner_id).await?;

    match &claimed {
        Some(job) => {
            tracing::info!(job_id = %job.id, runner_id = %runner_id, "Build claimed");
            state.event_bus.publish(
                PlatformEvent::build(EVENT_BUILD_CLAIMED, job.id)
                    .with_payload(serde_json::json!({ "runner_id": runner_id })),
            );
        }
        None => tracing::trace!(runner_id = %runner_id, "No queued builds"),
    }

    Ok(Json(DataResponse { data: claimed }))
}

/// POST /api/v1/runner/builds/{id}/report
///
/// Append logs, record compiler errors, and apply a status change. An
/// inapplicable status is dropped; the rest of the report still lands.
pub async fn report(
    _runner: RunnerAuth,
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    Json(report): Json<RunnerReport>,
) -> AppResult<impl IntoResponse> {
    let reporter = report.runner_id.clone();
    let (job, effect) = state
        .store
        .apply_report(id, report, Utc::now())
        .await?
        .ok_or_else(|| AppError::job_not_found(id))?;

    if let Some(ignored) = &effect.status_ignored {
        tracing::warn!(
            job_id = %id,
            runner_id = reporter.as_deref().unwrap_or_default(),
            reason = %ignored,
            "Ignored reported status",
        );
    }

    if let Some(status) = effect.transitioned_to() {
        tracing::info!(
            job_id = %id,
            status = %status,
            exit_code = ?job.exit_code,
            "Build status changed",
        );
        let event_type = match status {
            BuildJobStatus::Succeeded => Some(EVENT_BUILD_SUCCEEDED),
            BuildJobStatus::Failed => Some(EVENT_BUILD_FAILED),
            _ => None,
        };
        if let Some(event_type) = event_type {
            state.event_bus.publish(
                PlatformEvent::build(event_type, id).with_payload(serde_json::json!({
                    "runner_id": job.runner_id,
                    "exit_code": job.exit_code,
                    "error": job.error,
                    "compiler_errors": job.compiler_errors().len(),
                    "auto_fix": job.request.auto_fix,
                })),
            );
        }
    }

    Ok(Json(DataResponse {
        data: ReportAck {
            job_id: id,
            status: job.status,
            logs_appended: effect.logs_appended,
            compiler_errors_recorded: effect.compiler_errors_recorded,
            status_ignored: effect.status_ignored.map(|e| e.to_string()),
        },
    }))
}
