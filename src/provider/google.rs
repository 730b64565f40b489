// src/provider/google.rs — Google Gemini generateContent provider

use std::time::Instant;

use async_trait::async_trait;

use super::{estimate_tokens, LlmResponse, Message, Provider, Role, Usage};
use crate::infra::errors::PipelineError;

pub struct GoogleProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        )
    }

    // Gemini has no system role in contents; system messages go into
    // systemInstruction and assistant turns map to "model".
    fn build_request_body(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                serde_json::json!({
                    "role": role,
                    "parts": [{"text": m.content}],
                })
            })
            .collect();

        let mut generation_config = serde_json::json!({
            "temperature": temperature,
        });
        if let Some(max_tokens) = max_tokens {
            generation_config["maxOutputTokens"] = serde_json::json!(max_tokens);
        }

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": generation_config,
        });

        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if !system.is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{"text": system.join("\n\n")}],
            });
        }

        body
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn id(&self) -> &str {
        "google"
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
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Provider {
                provider: "google".into(),
                message: e.to_string(),
                retriable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PipelineError::RateLimited {
                provider: "google".into(),
                retry_after_ms: 5000,
            });
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Provider {
                provider: "google".into(),
                message: format!("HTTP {}: {}", status, error_body),
                retriable: status.is_server_error(),
            });
        }

        let resp: serde_json::Value = response.json().await.map_err(|e| PipelineError::Provider {
            provider: "google".into(),
            message: format!("Failed to parse response: {}", e),
            retriable: false,
        })?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let text = resp["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .map(|p| p["text"].as_str().unwrap_or(""))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = match resp.get("usageMetadata") {
            Some(u) if u.is_object() => Usage::reported(
                u["promptTokenCount"].as_u64().unwrap_or(0) as u32,
                u["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
            ),
            _ => Usage::estimated(
                messages.iter().map(|m| estimate_tokens(&m.content)).sum(),
                estimate_tokens(&text),
            ),
        };

        Ok(LlmResponse {
            text,
            usage,
            request_id: resp["responseId"].as_str().map(String::from),
            latency_ms,
            raw_response: Some(resp),
        })
    }
}
