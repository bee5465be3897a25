//! Route definitions for the runner protocol. Every handler requires the
//! runner bearer secret.

use axum::routing::post;
use axum::Router;

use crate::handlers::runner;
use crate::state::AppState;

/// Routes mounted at `/runner`.
///
/// ```text
/// POST   /claim               -> claim
/// POST   /builds/{id}/report  -> report
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/claim", post(runner::claim))
        .route("/builds/{id}/report", post(runner::report))
}
