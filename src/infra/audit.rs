// src/infra/audit.rs — Append-only audit trail for LLM API calls

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::infra::errors::PipelineError;
use crate::provider::{LlmResponse, Message, Usage};

/// One record per LLM call, success or failure. Only content digests are
/// stored, never the raw text, so the trail stays traceable without
/// duplicating sensitive content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: String,
    pub run_id: String,
    pub phase: String,
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub seed: Option<u64>,
    pub request_id: Option<String>,
    pub latency_ms: f64,
    pub messages_digest_in: String,
    pub response_digest_out: Option<String>,
    pub usage: Option<Usage>,
    pub usage_available: bool,
    pub estimated: bool,
    pub cost_usd: Option<f64>,
    pub status: String,
    pub error: Option<String>,
}

/// Logs every LLM API call to `calls.jsonl` under the run directory.
/// Writes are serialized behind a mutex so lines stay atomic under
/// concurrent workers.
pub struct AuditLogger {
    run_id: String,
    calls_file: PathBuf,
    file: Mutex<File>,
}

impl AuditLogger {
    pub fn new(run_dir: &Path) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(run_dir)?;
        let calls_file = run_dir.join("calls.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&calls_file)?;
        let run_id = run_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".into());
        Ok(Self {
            run_id,
            calls_file,
            file: Mutex::new(file),
        })
    }

    pub fn calls_file(&self) -> &Path {
        &self.calls_file
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_call(
        &self,
        phase: &str,
        provider: &str,
        model: &str,
        messages: &[Message],
        response: Option<&LlmResponse>,
        temperature: f32,
        seed: Option<u64>,
        cost_usd: Option<f64>,
        status: &str,
        error: Option<&str>,
    ) -> Result<(), PipelineError> {
        let messages_json = serde_json::to_string(messages)
            .map_err(|e| PipelineError::Data(format!("serialize messages: {e}")))?;

        let record = AuditRecord {
            ts: chrono::Utc::now().to_rfc3339(),
            run_id: self.run_id.clone(),
            phase: phase.into(),
            provider: provider.into(),
            model: model.into(),
            temperature,
            seed,
            request_id: response.and_then(|r| r.request_id.clone()),
            latency_ms: response.map(|r| r.latency_ms).unwrap_or(0.0),
            messages_digest_in: digest(&messages_json),
            response_digest_out: response.map(|r| digest(&r.text)),
            usage: response.map(|r| r.usage.clone()),
            usage_available: response.map(|r| r.usage.usage_available).unwrap_or(false),
            estimated: response.map(|r| r.usage.estimated).unwrap_or(false),
            cost_usd,
            status: status.into(),
            error: error.map(String::from),
        };

        let line = serde_json::to_string(&record)
            .map_err(|e| PipelineError::Data(format!("serialize audit record: {e}")))?;

        let mut file = self
            .file
            .lock()
            .map_err(|_| PipelineError::Data("audit log mutex poisoned".into()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

fn digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
