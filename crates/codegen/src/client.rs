//! HTTP client for the code-generation service.
//!
//! Sends a correction request as JSON to `POST {base_url}/v1/corrections`
//! using [`reqwest`]. The service may answer with a structured file list or
//! with raw model text in the prompt's `--- path ---` block format.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use shipyard_core::auto_fix::CorrectionRequest;
use shipyard_core::types::SourceFiles;

use crate::parse::files_from_markdown;
use crate::{CodeGenerator, CodegenError};

/// Connection settings for the code-generation service.
#[derive(Debug, Clone)]
pub struct CodegenConfig {
    /// Base URL, e.g. `http://codegen:8080`.
    pub base_url: String,
    /// Sent as a bearer token when set.
    pub api_key: Option<String>,
    /// Upper bound on a single correction call.
    pub timeout: Duration,
}

/// One generated file.
#[derive(Debug, Deserialize)]
struct GeneratedFile {
    path: String,
    content: String,
}

/// Accepted response shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CorrectionResponse {
    Files { files: Vec<GeneratedFile> },
    Text { text: String },
}

impl CorrectionResponse {
    fn into_files(self) -> SourceFiles {
        match self {
            Self::Files { files } => files
                .into_iter()
                .filter(|f| !f.path.trim().is_empty())
                .map(|f| (f.path, f.content))
                .collect(),
            Self::Text { text } => files_from_markdown(&text),
        }
    }
}

/// [`CodeGenerator`] backed by the HTTP service.
pub struct HttpCodeGenerator {
    client: reqwest::Client,
    config: CodegenConfig,
}

impl HttpCodeGenerator {
    pub fn new(config: CodegenConfig) -> Result<Self, CodegenError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/corrections", self.config.base_url.trim_end_matches('/'))
    }

    /// Ensure the response has a success status code, or turn it into
    /// [`CodegenError::ApiError`] carrying the body for debugging.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, CodegenError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CodegenError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CodeGenerator for HttpCodeGenerator {
    async fn correct(&self, request: &CorrectionRequest) -> Result<SourceFiles, CodegenError> {
        let body = serde_json::json!({
            "failed_job_id": request.failed_job_id,
            "project_name": request.project_name,
            "bundle_id": request.bundle_id,
            "attempt": request.attempt,
            "max_attempts": request.max_attempts,
            "errors": request.errors,
            "files": request.files,
            "prompt": request.to_prompt(),
        });

        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!(
            job_id = %request.failed_job_id,
            errors = request.errors.len(),
            files = request.files.len(),
            "Requesting code correction",
        );

        let response = Self::ensure_success(builder.send().await?).await?;
        let text = response.text().await?;
        parse_response(&text)
    }
}

/// Parse a correction response body into a file set.
fn parse_response(body: &str) -> Result<SourceFiles, CodegenError> {
    let parsed: CorrectionResponse =
        serde_json::from_str(body).map_err(|e| CodegenError::InvalidResponse(e.to_string()))?;
    Ok(parsed.into_files())
}
