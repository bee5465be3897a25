pub mod builds;
pub mod generations;
pub mod health;
pub mod runner;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                                   WebSocket job event stream
///
/// /builds                               create (POST)
/// /builds/active                        queued + running + generating
/// /builds/recent?limit=                 latest finished builds
/// /builds/stats/errors?limit=           compiler error frequency
/// /builds/{id}                          get
/// /builds/{id}/chain                    attempt chain
/// /builds/{id}/auto-fix                 trigger auto-fix (POST, see `generator_routes`)
///
/// /runner/claim                         claim next queued build (runner auth)
/// /runner/builds/{id}/report            logs + status report (runner auth)
///
/// /generations                          start (POST)
/// /generations/{id}                     update phase / link (PATCH), remove (DELETE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/builds", builds::router())
        .nest("/runner", runner::router())
        .nest("/generations", generations::router())
}

/// `/api/v1` routes that call the code generator. Mounted separately so the
/// router can give them a longer timeout than [`api_routes`].
pub fn generator_routes() -> Router<AppState> {
    Router::new().nest("/builds", builds::auto_fix_router())
}
