//! Route definitions for the `/generations` resource.

use axum::routing::{patch, post};
use axum::Router;

use crate::handlers::generations;
use crate::state::AppState;

/// Routes mounted at `/generations`.
///
/// ```text
/// POST   /        -> start_generation
/// PATCH  /{id}    -> update_generation
/// DELETE /{id}    -> remove_generation
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(generations::start_generation))
        .route(
            "/{id}",
            patch(generations::update_generation).delete(generations::remove_generation),
        )
}
