// src/infra/errors.rs — Error types for callgrade

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    // Provider errors (per-item, never abort the batch)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    // Response text with no extractable JSON after repair attempts
    #[error("Parse failure: {0}")]
    Parse(String),

    // Normalized record unusable (e.g. zero segments after repair)
    #[error("Data error: {0}")]
    Data(String),

    // Bad rubric / prompt / registry files; fatal before batch work starts
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            PipelineError::Provider {
                retriable: true,
                ..
            } | PipelineError::RateLimited { .. }
        )
    }

    /// Per-item errors degrade into a stub or dropped record; everything else
    /// should stop the run before any batch work starts.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Config(_))
    }
}
