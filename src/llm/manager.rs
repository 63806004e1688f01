//! LLM manager: HTTP client and chat-completion calls.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use anyhow::Context as _;

/// Holds the provider configuration and a pooled HTTP client.
pub struct LlmManager {
    config: LlmConfig,
    /// HTTP client for making requests.
    http_client: reqwest::Client,
}

impl LlmManager {
    /// Create a new LLM manager with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .with_context(|| "failed to build HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Get the HTTP client.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Run one chat completion at temperature 0 in JSON mode and return the
    /// assistant message content.
    pub async fn complete_json(
        &self,
        messages: Vec<serde_json::Value>,
    ) -> std::result::Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": 0,
            "response_format": { "type": "json_object" },
        });

        let chat_completions_url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .http_client
            .post(&chat_completions_url)
            .header("authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ProviderRequest(e.to_string()))?;

        let status = response.status();
        let response_text = response.text().await.map_err(|e| {
            LlmError::ProviderRequest(format!("failed to read response body: {e}"))
        })?;

        let response_body: serde_json::Value =
            serde_json::from_str(&response_text).map_err(|e| {
                LlmError::ProviderRequest(format!(
                    "response ({status}) is not valid JSON: {e}\nBody: {}",
                    truncate_body(&response_text)
                ))
            })?;

        if !status.is_success() {
            let message = response_body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error");
            return Err(LlmError::ProviderStatus {
                status: status.as_u16(),
                message: message.to_string(),
            });
        }

        response_body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                LlmError::ProviderRequest(format!(
                    "response has no message content: {}",
                    truncate_body(&response_text)
                ))
            })
    }
}

/// Keep error messages readable when a provider returns a large body.
fn truncate_body(body: &str) -> &str {
    const LIMIT: usize = 500;
    if body.len() <= LIMIT {
        return body;
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
