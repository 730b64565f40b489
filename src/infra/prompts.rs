// src/infra/prompts.rs — Prompt template loading

use std::path::Path;

use crate::infra::errors::PipelineError;

/// Read a prompt template. A missing or unreadable file is a fatal
/// configuration error, raised before any batch work starts.
pub fn load_prompt(path: &Path) -> Result<String, PipelineError> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))
}
