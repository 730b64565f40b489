// src/provider/mod.rs — LLM provider layer

pub mod anthropic;
pub mod google;
pub mod mock;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::PipelineError;

/// Core trait that all LLM providers implement. This is the single seam the
/// pipeline depends on; any conforming implementation (real API client or
/// deterministic stub) is substitutable.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;
    fn model_id(&self) -> &str;

    async fn generate(
        &self,
        messages: &[Message],
        temperature: f32,
        seed: Option<u64>,
        max_tokens: Option<u32>,
    ) -> Result<LlmResponse, PipelineError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Token usage for one call. `estimated` means the counts were heuristically
/// derived (text length / 4) rather than provider-reported; consumers must
/// treat estimated costs as approximate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub usage_available: bool,
    pub estimated: bool,
}

impl Usage {
    /// Provider-reported actuals.
    pub fn reported(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            usage_available: true,
            estimated: false,
        }
    }

    /// Heuristic counts for providers that omit usage metadata.
    pub fn estimated(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            usage_available: false,
            estimated: true,
        }
    }
}

/// Standardized response from exactly one provider call; immutable once
/// returned.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Usage,
    pub request_id: Option<String>,
    pub latency_ms: f64,
    pub raw_response: Option<serde_json::Value>,
}

/// Rough token estimate (4 chars ≈ 1 token).
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32
}
