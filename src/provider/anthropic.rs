// src/provider/anthropic.rs — Anthropic Messages API provider

use std::time::Instant;

use async_trait::async_trait;

use super::{estimate_tokens, LlmResponse, Message, Provider, Role, Usage};
use crate::infra::errors::PipelineError;

pub struct AnthropicProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self) -> &str {
        "https://api.anthropic.com/v1/messages"
    }

    // The Messages API takes the system prompt as a top-level field, not a
    // message, and max_tokens is mandatory.
    fn build_request_body(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> serde_json::Value {
        let chat: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": chat,
            "max_tokens": max_tokens.unwrap_or(4096),
            "temperature": temperature,
        });

        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if !system.is_empty() {
            body["system"] = serde_json::json!(system.join("\n\n"));
        }

        body
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        messages: &[Message],
        temperature: f32,
        _seed: Option<u64>,
        max_tokens: Option<u32>,
    ) -> Result<LlmResponse, PipelineError> {
        let body = self.build_request_body(messages, temperature, max_tokens);

        let started = Instant::now();
        let response = self
            .client
            .post(self.api_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Provider {
                provider: "anthropic".into(),
                message: e.to_string(),
                retriable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5);
            return Err(PipelineError::RateLimited {
                provider: "anthropic".into(),
                retry_after_ms: retry_after * 1000,
            });
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Provider {
                provider: "anthropic".into(),
                message: format!("HTTP {}: {}", status, error_body),
                retriable: status.is_server_error(),
            });
        }

        let resp: serde_json::Value = response.json().await.map_err(|e| PipelineError::Provider {
            provider: "anthropic".into(),
            message: format!("Failed to parse response: {}", e),
            retriable: false,
        })?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let text = resp["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|c| c["type"] == "text")
                    .map(|c| c["text"].as_str().unwrap_or(""))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = match resp.get("usage") {
            Some(u) if u.is_object() => Usage::reported(
                u["input_tokens"].as_u64().unwrap_or(0) as u32,
                u["output_tokens"].as_u64().unwrap_or(0) as u32,
            ),
            _ => Usage::estimated(
                messages.iter().map(|m| estimate_tokens(&m.content)).sum(),
                estimate_tokens(&text),
            ),
        };

        let request_id = resp["id"].as_str().map(String::from);

        Ok(LlmResponse {
            text,
            usage,
            request_id,
            latency_ms,
            raw_response: Some(resp),
        })
    }
}
