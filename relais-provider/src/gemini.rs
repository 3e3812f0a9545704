//! Gemini provider implementation using the generateContent API.

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

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-pro";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    system_instruction: Content,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

/// Gemini-class analysis client
#[derive(Clone)]
pub struct GeminiAnalysisProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    info: Arc<ProviderInfo>,
    counters: Arc<ProviderCounters>,
}

impl std::fmt::Debug for GeminiAnalysisProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAnalysisProvider")
            .field("info", &self.info)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl GeminiAnalysisProvider {
    /// Create a new Gemini provider with default configuration
    pub fn new(api_key: impl Into<String>) -> Result<Self, RelaisError> {
        Self::builder().api_key(api_key).build()
    }

    /// Create a builder for more configuration options
    pub fn builder() -> GeminiBuilder {
        GeminiBuilder::default()
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint, self.info.model, self.api_key
        )
    }

    fn text_content(text: impl Into<String>) -> Content {
        Content {
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[async_trait]
impl AnalysisProvider for GeminiAnalysisProvider {
    fn info(&self) -> Arc<ProviderInfo> {
        self.info.clone()
    }

    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, RelaisError> {
        self.counters.record_attempt();
        let body = GenerateContentRequest {
            contents: vec![Self::text_content(request.content)],
            system_instruction: Self::text_content(analysis_system_prompt(&request.content_type)),
        };

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                self.counters.record_failure();
                RelaisError::Network(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            self.counters.record_failure();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(RelaisError::rate_limit("gemini returned 429"));
            }
            let detail = response.text().await.unwrap_or_default();
            return Err(RelaisError::provider(
                self.info.id,
                format!("gemini returned {status}: {detail}"),
            ));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            self.counters.record_failure();
            RelaisError::Network(e)
        })?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.is_empty() {
            self.counters.record_failure();
            return Err(RelaisError::provider(self.info.id, "no candidates in response"));
        }

        self.counters.record_success(start.elapsed());
        Ok(parse_analysis_output(self.info.id, &self.info.model, &text))
    }

    async fn health_check(&self) -> Result<bool, RelaisError> {
        // Model metadata lookup is unmetered and cheap.
        let url = format!(
            "{}/models/{}?key={}",
            self.endpoint, self.info.model, self.api_key
        );
        let result = self.client.get(url).send().await;
        Ok(matches!(result, Ok(resp) if resp.status().is_success()))
    }

    fn metrics(&self) -> ServiceMetrics {
        self.counters.snapshot(self.info.id)
    }
}

/// Builder for Gemini provider configuration
#[derive(Debug, Default)]
pub struct GeminiBuilder {
    api_key: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl GeminiBuilder {
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
    pub fn build(self) -> Result<GeminiAnalysisProvider, RelaisError> {
        let api_key = self
            .api_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| RelaisError::configuration("gemini api key must not be empty"))?;
        let client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(30)))
            .build()?;

        Ok(GeminiAnalysisProvider {
            client,
            api_key,
            endpoint: self
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            info: Arc::new(ProviderInfo {
                id: ServiceId::Gemini,
                name: "Google Gemini".to_string(),
                model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            }),
            counters: Arc::new(ProviderCounters::default()),
        })
    }
}
