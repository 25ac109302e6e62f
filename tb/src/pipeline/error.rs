//! Pipeline stage errors

use thiserror::Error;

use crate::llm::{FailureKind, LlmError};

/// Why a pipeline stage could not produce its own output
///
/// Every stage except the stream assembler absorbs these into its fallback.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("model timed out: {0}")]
    ModelTimeout(String),

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("prompt template error: {0}")]
    Template(String),
}

impl PipelineError {
    pub fn template(err: eyre::Report) -> Self {
        PipelineError::Template(err.to_string())
    }

    /// Short machine-readable tag used in stream error payloads
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::ModelUnavailable(_) => "model_unavailable",
            PipelineError::ModelTimeout(_) => "model_timeout",
            PipelineError::MalformedResponse(_) => "malformed_response",
            PipelineError::Template(_) => "template",
        }
    }
}

impl From<LlmError> for PipelineError {
    fn from(err: LlmError) -> Self {
        match err.kind() {
            FailureKind::Timeout => PipelineError::ModelTimeout(err.to_string()),
            FailureKind::Malformed => PipelineError::MalformedResponse(err.to_string()),
            FailureKind::Unavailable => PipelineError::ModelUnavailable(err.to_string()),
        }
    }
}
