//! Client side of the code-generation service.
//!
//! The auto-fix loop depends only on the [`CodeGenerator`] trait; the HTTP
//! implementation lives in [`client`], and [`parse`] turns free-form model
//! output back into a file set.

pub mod client;
pub mod parse;

use async_trait::async_trait;
use shipyard_core::auto_fix::CorrectionRequest;
use shipyard_core::types::SourceFiles;

pub use client::{CodegenConfig, HttpCodeGenerator};

/// Errors from talking to the code-generation service.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Code generator error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// The service answered, but not with anything we can read.
    #[error("Invalid code generator response: {0}")]
    InvalidResponse(String),
}

/// Something that can rewrite a project to fix compiler errors.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Return corrected versions of the files that needed changes. An empty
    /// set means the generator produced nothing usable.
    async fn correct(&self, request: &CorrectionRequest) -> Result<SourceFiles, CodegenError>;
}
