//! Authentication extractors.
//!
//! - [`runner_auth::RunnerAuth`] -- Requires the shared runner bearer secret.

pub mod runner_auth;
