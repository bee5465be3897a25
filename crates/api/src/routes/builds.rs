//! Route definitions for the `/builds` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::builds;
use crate::state::AppState;

/// Routes mounted at `/builds`.
///
/// ```text
/// POST   /                   -> create_build
/// GET    /active             -> list_active
/// GET    /recent             -> list_recent
/// GET    /stats/errors       -> error_stats
/// GET    /{id}               -> get_build
/// GET    /{id}/chain         -> get_chain
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(builds::create_build))
        .route("/active", get(builds::list_active))
        .route("/recent", get(builds::list_recent))
        .route("/stats/errors", get(builds::error_stats))
        .route("/{id}", get(builds::get_build))
        .route("/{id}/chain", get(builds::get_chain))
}

/// Routes mounted at `/builds` that wait on the code generator and so run
/// under the longer auto-fix timeout.
///
/// ```text
/// POST   /{id}/auto-fix      -> trigger_auto_fix
/// ```
pub fn auto_fix_router() -> Router<AppState> {
    Router::new().route("/{id}/auto-fix", post(builds::trigger_auto_fix))
}
