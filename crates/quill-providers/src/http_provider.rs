//! Generic HTTP-based LLM provider for OpenAI-compatible APIs.
//!
//! Talks directly to any `/chat/completions` endpoint (OpenAI, DeepSeek,
//! OpenRouter, a local vLLM/Ollama gateway, ...).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, error, warn};

use quill_core::config::ProviderConfig;
use quill_core::types::{ChatCompletionRequest, ChatCompletionResponse, LlmResponse, Message};

use crate::traits::{ChatOptions, LlmProvider, LlmRequestConfig, ProviderError};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ─────────────────────────────────────────────
// HttpProvider
// ─────────────────────────────────────────────

/// An LLM provider that talks to any OpenAI-compatible HTTP API.
pub struct HttpProvider {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://api.openai.com/v1"`).
    api_base: String,
    /// API key for Bearer authentication (may be empty for local gateways).
    api_key: String,
    default_model: String,
    extra_headers: HeaderMap,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl HttpProvider {
    /// Create a provider from the user's config and a default model.
    pub fn new(config: &ProviderConfig, model: &str) -> Result<Self, ProviderError> {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = config.extra_headers {
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    extra_headers.insert(name, val);
                } else {
                    warn!("Invalid header: {}={}", key, value);
                }
            }
        }

        let timeout = if config.timeout_secs == 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            config.timeout_secs
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpProvider {
            client,
            api_base,
            api_key: config.api_key.clone(),
            default_model: model.to_string(),
            extra_headers,
        })
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    async fn send(&self, request_body: &ChatCompletionRequest) -> Result<LlmResponse, ProviderError> {
        let mut request = self
            .client
            .post(self.completions_url())
            .headers(self.extra_headers.clone())
            .json(request_body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "HTTP request failed");
            ProviderError::Request(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(status = %status, body = %body, "API error");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let llm_resp = parsed
            .into_llm_response()
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".into()))?;

        debug!(
            content_len = llm_resp.content.len(),
            tool_calls = llm_resp.tool_calls.len(),
            finish_reason = llm_resp.finish_reason.as_deref().unwrap_or("?"),
            "LLM response received"
        );
        Ok(llm_resp)
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn chat(
        &self,
        messages: &[Message],
        options: ChatOptions<'_>,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        debug!(
            model = %model,
            messages = messages.len(),
            tools = options.tools.map_or(0, |t| t.len()),
            "Calling LLM"
        );

        let tools = options.tools.filter(|t| !t.is_empty()).map(|t| t.to_vec());
        let request_body = ChatCompletionRequest {
            model,
            messages: messages.iter().map(Message::to_api_value).collect(),
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
        };

        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => {
                debug!("LLM call cancelled");
                Err(ProviderError::Cancelled)
            }
            result = self.send(&request_body) => result,
        }
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn display_name(&self) -> &str {
        "OpenAI-compatible"
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
