// src/provider/openai.rs — OpenAI Chat Completions provider

use std::time::Instant;

use async_trait::async_trait;

use super::{estimate_tokens, LlmResponse, Message, Provider, Usage};
use crate::infra::errors::PipelineError;

pub struct OpenAiProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com/v1".into(),
        }
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn build_request_body(
        &self,
        messages: &[Message],
        temperature: f32,
        seed: Option<u64>,
        max_tokens: Option<u32>,
    ) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
        });
        if let Some(seed) = seed {
            body["seed"] = serde_json::json!(seed);
        }
        if let Some(max_tokens) = max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn id(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        messages: &[Message],
        temperature: f32,
        seed: Option<u64>,
        max_tokens: Option<u32>,
    ) -> Result<LlmResponse, PipelineError> {
        let body = self.build_request_body(messages, temperature, seed, max_tokens);

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Provider {
                provider: "openai".into(),
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
                provider: "openai".into(),
                retry_after_ms: retry_after * 1000,
            });
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Provider {
                provider: "openai".into(),
                message: format!("HTTP {}: {}", status, error_body),
                retriable: status.is_server_error(),
            });
        }

        let resp: serde_json::Value = response.json().await.map_err(|e| PipelineError::Provider {
            provider: "openai".into(),
            message: format!("Failed to parse response: {}", e),
            retriable: false,
        })?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let text = resp["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let usage = match resp.get("usage") {
            Some(u) if u.is_object() => Usage::reported(
                u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                u["completion_tokens"].as_u64().unwrap_or(0) as u32,
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
