//! Anthropic provider implementation using the Messages API.

use async_trait::async_trait;
use relais_core::error::RelaisError;
use relais_core::provider::AnalysisProvider;
use relais_core::types::{
    AnalysisRequest, AnalysisResponse, ProviderInfo, ServiceId, ServiceMetrics,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::{analysis_system_prompt, parse_analysis_output, ProviderCounters};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    messages: Vec<MessageBody<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageBody<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// Claude-class analysis client
#[derive(Clone)]
pub struct AnthropicAnalysisProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    info: Arc<ProviderInfo>,
    counters: Arc<ProviderCounters>,
}

impl std::fmt::Debug for AnthropicAnalysisProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicAnalysisProvider")
            .field("info", &self.info)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl AnthropicAnalysisProvider {
    /// Create a new Anthropic provider with default configuration
    pub fn new(api_key: impl Into<String>) -> Result<Self, RelaisError> {
        Self::builder().api_key(api_key).build()
    }

    /// Create a builder for more configuration options
    pub fn builder() -> AnthropicBuilder {
        AnthropicBuilder::default()
    }

    async fn send_message(&self, system: String, content: &str) -> Result<String, RelaisError> {
        let body = MessagesRequest {
            model: &self.info.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![MessageBody {
                role: "user",
                content,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RelaisError::authentication(format!(
                "anthropic returned {status}"
            )));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RelaisError::rate_limit("anthropic returned 429"));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RelaisError::provider(
                self.info.id,
                format!("anthropic returned {status}: {detail}"),
            ));
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(RelaisError::provider(self.info.id, "empty response body"));
        }
        Ok(text)
    }
}

#[async_trait]
impl AnalysisProvider for AnthropicAnalysisProvider {
    fn info(&self) -> Arc<ProviderInfo> {
        self.info.clone()
    }

    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, RelaisError> {
        self.counters.record_attempt();
        let start = std::time::Instant::now();
        match self
            .send_message(analysis_system_prompt(&request.content_type), &request.content)
            .await
        {
            Ok(text) => {
                self.counters.record_success(start.elapsed());
                Ok(parse_analysis_output(self.info.id, &self.info.model, &text))
            }
            Err(err) => {
                self.counters.record_failure();
                Err(err)
            }
        }
    }

    async fn health_check(&self) -> Result<bool, RelaisError> {
        // One-word probe; the Messages API has no dedicated liveness route.
        let probe = MessagesRequest {
            model: &self.info.model,
            max_tokens: 1,
            system: String::new(),
            messages: vec![MessageBody {
                role: "user",
                content: "ping",
            }],
        };
        let result = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&probe)
            .send()
            .await;
        Ok(matches!(result, Ok(resp) if resp.status().is_success()))
    }

    fn metrics(&self) -> ServiceMetrics {
        self.counters.snapshot(self.info.id)
    }
}

/// Builder for Anthropic provider configuration
#[derive(Debug, Default)]
pub struct AnthropicBuilder {
    api_key: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl AnthropicBuilder {
    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set a custom API endpoint
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the model to request
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the per-call network timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the provider
    pub fn build(self) -> Result<AnthropicAnalysisProvider, RelaisError> {
        let api_key = self
            .api_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| RelaisError::configuration("anthropic api key must not be empty"))?;
        let client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(30)))
            .build()?;

        Ok(AnthropicAnalysisProvider {
            client,
            api_key,
            endpoint: self.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            info: Arc::new(ProviderInfo {
                id: ServiceId::Claude,
                name: "Anthropic".to_string(),
                model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            }),
            counters: Arc::new(ProviderCounters::default()),
        })
    }
}
