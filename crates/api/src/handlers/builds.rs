//! Handlers for the `/builds` resource.
//!
//! These endpoints are called by the app-facing side of the platform (job
//! creation, dashboards, the "fix it" button). Runners use `/runner`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use shipyard_core::aggregation::{
    active_jobs, attempt_chain, clamp_limit, compiler_error_frequency, recent_terminal_jobs,
    DEFAULT_RECENT_LIMIT,
};
use shipyard_core::build_job::BuildRequest;
use shipyard_core::job_events::EVENT_BUILD_CREATED;
use shipyard_core::types::JobId;
use shipyard_events::PlatformEvent;

use crate::engine::{AutoFixEngine, AutoFixError};
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Optional `?limit=` for list views.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Create / get
// ---------------------------------------------------------------------------

/// POST /api/v1/builds
///
/// Queue a new build. The request is stored verbatim. Returns 201.
pub async fn create_build(
    State(state): State<AppState>,
    Json(input): Json<BuildRequest>,
) -> AppResult<impl IntoResponse> {
    let job = state.store.create(input).await?;

    tracing::info!(
        job_id = %job.id,
        project_id = %job.request.project_id,
        attempt = job.request.attempt,
        "Build queued",
    );
    state.event_bus.publish(
        PlatformEvent::build(EVENT_BUILD_CREATED, job.id).with_payload(serde_json::json!({
            "project_id": job.request.project_id,
            "attempt": job.request.attempt,
        })),
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

/// GET /api/v1/builds/{id}
pub async fn get_build(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::job_not_found(id))?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/builds/{id}/chain
///
/// Every attempt of the logical build `id` belongs to, oldest first.
pub async fn get_chain(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.store.list_all().await?;
    let chain = attempt_chain(&jobs, id);
    if chain.is_empty() {
        return Err(AppError::job_not_found(id));
    }
    Ok(Json(DataResponse { data: chain }))
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// GET /api/v1/builds/active
///
/// Queued and running builds merged with generations still in progress.
pub async fn list_active(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    // Read the tracker and the store separately; the two locks are never held
    // together.
    let generations = state.generations.list().await;
    let jobs = state.store.list_all().await?;
    Ok(Json(DataResponse {
        data: active_jobs(&jobs, &generations),
    }))
}

/// GET /api/v1/builds/recent?limit=
pub async fn list_recent(
    State(state): State<AppState>,
    Query(params): Query<LimitQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = clamp_limit(params.limit, DEFAULT_RECENT_LIMIT);
    let jobs = state.store.list_all().await?;
    Ok(Json(DataResponse {
        data: recent_terminal_jobs(&jobs, limit),
    }))
}

/// GET /api/v1/builds/stats/errors?limit=
///
/// Most frequent compiler error messages across failed builds.
pub async fn error_stats(
    State(state): State<AppState>,
    Query(params): Query<LimitQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = clamp_limit(params.limit, DEFAULT_RECENT_LIMIT);
    let jobs = state.store.list_all().await?;
    Ok(Json(DataResponse {
        data: compiler_error_frequency(&jobs, limit),
    }))
}

// ---------------------------------------------------------------------------
// Auto-fix
// ---------------------------------------------------------------------------

/// POST /api/v1/builds/{id}/auto-fix
///
/// Ask the code generator to correct a failed build and queue the retry.
/// A policy stop is a 200 with `status: "gave_up"`; a generator failure is a
/// 500 carrying its message. The loop runs on its own task, so a dropped
/// request still lets it finish.
pub async fn trigger_auto_fix(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let engine = AutoFixEngine::new(
        state.store.clone(),
        state.codegen.clone(),
        state.event_bus.clone(),
    );

    let outcome = engine.run_detached(id).await.map_err(|e| match e {
        AutoFixError::NotFound(id) => AppError::job_not_found(id),
        AutoFixError::NotFailed(_) => AppError::BadRequest("job is not in failed state".into()),
        AutoFixError::Store(e) => AppError::Store(e),
        AutoFixError::Codegen(e) => AppError::Codegen(e),
        e @ AutoFixError::Interrupted(_) => AppError::InternalError(e.to_string()),
    })?;

    Ok(Json(DataResponse { data: outcome }))
}
