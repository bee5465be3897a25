//! Handlers for the `/generations` resource: the code-generation front end
//! registers its in-flight requests here so they show up in the active view
//! before a build exists.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use shipyard_core::error::CoreError;
use shipyard_core::generation::GenerationPhase;
use shipyard_core::types::JobId;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartGeneration {
    pub project_id: String,
    pub project_name: String,
}

/// Partial update. At least one field is required.
#[derive(Debug, Deserialize)]
pub struct UpdateGeneration {
    pub phase: Option<GenerationPhase>,
    pub build_job_id: Option<JobId>,
}

fn generation_not_found(id: JobId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Generation",
        id: id.to_string(),
    })
}

/// POST /api/v1/generations
pub async fn start_generation(
    State(state): State<AppState>,
    Json(input): Json<StartGeneration>,
) -> AppResult<impl IntoResponse> {
    let generation = state
        .generations
        .start(input.project_id, input.project_name)
        .await;
    tracing::info!(
        generation_id = %generation.id,
        project_id = %generation.project_id,
        "Generation started",
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: generation })))
}

/// PATCH /api/v1/generations/{id}
///
/// Moving a generation to `done` is final: the entry is returned one last
/// time and dropped from the tracker.
pub async fn update_generation(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    Json(input): Json<UpdateGeneration>,
) -> AppResult<impl IntoResponse> {
    if input.phase.is_none() && input.build_job_id.is_none() {
        return Err(AppError::BadRequest(
            "phase or build_job_id is required".into(),
        ));
    }

    let mut updated = None;
    if let Some(phase) = input.phase {
        updated = Some(
            state
                .generations
                .set_phase(id, phase)
                .await
                .ok_or_else(|| generation_not_found(id))?,
        );
    }
    if let Some(job_id) = input.build_job_id {
        updated = Some(
            state
                .generations
                .link(id, job_id)
                .await
                .ok_or_else(|| generation_not_found(id))?,
        );
    }

    let generation = updated.ok_or_else(|| generation_not_found(id))?;
    if generation.phase == GenerationPhase::Done {
        state.generations.remove(id).await;
    }
    tracing::debug!(
        generation_id = %id,
        phase = ?generation.phase,
        build_job_id = ?generation.build_job_id,
        "Generation updated",
    );
    Ok(Json(DataResponse { data: generation }))
}

/// DELETE /api/v1/generations/{id}
pub async fn remove_generation(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    state
        .generations
        .remove(id)
        .await
        .ok_or_else(|| generation_not_found(id))?;
    Ok(StatusCode::NO_CONTENT)
}
