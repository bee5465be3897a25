//! Shared-secret bearer authentication for build runners.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use shipyard_core::error::CoreError;

use crate::error::AppError;
use crate::state::AppState;

/// Proof that the request carried `Authorization: Bearer <RUNNER_SECRET>`.
///
/// ```ignore
/// async fn claim(_runner: RunnerAuth, State(state): State<AppState>) -> AppResult<...> { ... }
/// ```
///
/// Rejects with 503 when no secret is configured and 401 when the header is
/// missing, malformed, or wrong.
#[derive(Debug, Clone, Copy)]
pub struct RunnerAuth;

impl FromRequestParts<AppState> for RunnerAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = state.config.runner_secret.as_deref().ok_or_else(|| {
            AppError::ServiceUnavailable("Runner API is not configured".into())
        })?;

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        if !constant_time_eq(token.as_bytes(), secret.as_bytes()) {
            tracing::warn!("Runner request with invalid secret");
            return Err(AppError::Core(CoreError::Unauthorized(
                "Invalid runner secret".into(),
            )));
        }

        Ok(RunnerAuth)
    }
}

/// Byte comparison whose running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_bytes_match() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
    }

    #[test]
    fn different_bytes_or_lengths_do_not_match() {
        assert!(!constant_time_eq(b"s3cret", b"s3creT"));
        assert!(!constant_time_eq(b"s3cret", b"s3cre"));
        assert!(!constant_time_eq(b"", b"x"));
    }
}
