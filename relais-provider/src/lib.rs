//! # Relais Providers
//!
//! Provider client implementations for relais (OpenAI, Anthropic, Gemini)
//! plus the default factory wiring clients into the service manager.

pub mod anthropic;
pub mod gemini;
pub mod openai;

// Re-exports
pub use anthropic::{AnthropicAnalysisProvider, AnthropicBuilder};
pub use gemini::{GeminiAnalysisProvider, GeminiBuilder};
pub use openai::{OpenAiAnalysisProvider, OpenAiBuilder};

use relais_core::config::ProviderConfig;
use relais_core::error::RelaisError;
use relais_core::layer::Layer;
use relais_core::provider::{AnalysisProvider, ProviderFactory};
use relais_core::types::{AnalysisResponse, ServiceId, ServiceMetrics};
use relais_layer::{LoggingLayer, RetryLayer};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Confidence reported when a vendor answers with plain prose instead of the
/// requested JSON shape.
const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Shared system prompt: every vendor is asked for the same JSON shape so
/// responses stay comparable across the fallback chain.
pub(crate) fn analysis_system_prompt(content_type: &str) -> String {
    format!(
        "You are a content analysis service. Analyze the user's {content_type} content \
         and respond with a JSON object of the form \
         {{\"analysis\": \"<your analysis>\", \"confidence\": <0.0-1.0>}}. \
         Respond with JSON only."
    )
}

#[derive(Debug, Deserialize)]
struct AnalysisOutput {
    analysis: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Interpret a vendor's raw text answer.
///
/// Models occasionally wrap JSON in markdown fences or ignore the format
/// request entirely; both degrade gracefully instead of failing the call.
pub(crate) fn parse_analysis_output(id: ServiceId, model: &str, raw: &str) -> AnalysisResponse {
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    match serde_json::from_str::<AnalysisOutput>(trimmed) {
        Ok(output) => AnalysisResponse::new(
            id,
            model,
            output.analysis,
            output.confidence.unwrap_or(FALLBACK_CONFIDENCE),
        ),
        Err(_) => AnalysisResponse::new(id, model, trimmed, FALLBACK_CONFIDENCE),
    }
}

/// Vendor-side counters each client keeps for its own diagnostics.
///
/// The service manager's collector stays authoritative for reporting.
#[derive(Debug, Default)]
pub struct ProviderCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    total_latency_micros: AtomicU64,
    last_request: Mutex<Option<SystemTime>>,
}

impl ProviderCounters {
    pub fn record_attempt(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(SystemTime::now());
        }
    }

    pub fn record_success(&self, latency: Duration) {
        self.successful.fetch_add(1, Ordering::Relaxed);
        self.total_latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, id: ServiceId) -> ServiceMetrics {
        let successful = self.successful.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let average = if successful == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(self.total_latency_micros.load(Ordering::Relaxed) / successful)
        };
        ServiceMetrics {
            service_id: id,
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: successful,
            failed_requests: failed,
            average_response_time: average,
            last_request_time: self.last_request.lock().ok().and_then(|last| *last),
            // The client's own coarse view; fewer failures than successes
            // counts as healthy.
            is_healthy: failed <= successful,
        }
    }
}

/// Create an OpenAI-compatible provider for a custom endpoint.
///
/// Several vendors speak the OpenAI chat protocol behind their own base URL;
/// this wires one up under the `gpt4` service id.
pub fn openai_compatible(
    api_key: impl Into<String>,
    api_base: impl Into<String>,
    model: impl Into<String>,
) -> OpenAiAnalysisProvider {
    OpenAiAnalysisProvider::builder()
        .api_key(api_key)
        .api_base(api_base)
        .model(model)
        .build()
}

/// Factory producing the built-in vendor clients.
///
/// Every client is composed with the retry layer (honoring the per-provider
/// `max_retries`) and the logging layer before it reaches the manager.
#[derive(Debug, Clone, Default)]
pub struct DefaultProviderFactory;

impl DefaultProviderFactory {
    pub fn new() -> Self {
        Self
    }

    fn compose<P: AnalysisProvider>(
        client: P,
        config: &ProviderConfig,
    ) -> Arc<dyn AnalysisProvider> {
        let retried = RetryLayer::new()
            .with_max_retries(config.max_retries)
            .layer(client);
        Arc::new(LoggingLayer::new().layer(retried))
    }
}

impl ProviderFactory for DefaultProviderFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn AnalysisProvider>, RelaisError> {
        if config.api_key.is_empty() {
            return Err(RelaisError::configuration(format!(
                "{} api key must not be empty",
                config.service_id
            )));
        }
        match config.service_id {
            ServiceId::Gpt4 => {
                let mut builder = OpenAiAnalysisProvider::builder().api_key(&config.api_key);
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.api_base(endpoint);
                }
                if let Some(model) = &config.model {
                    builder = builder.model(model);
                }
                Ok(Self::compose(builder.build(), config))
            }
            ServiceId::Claude => {
                let mut builder = AnthropicAnalysisProvider::builder()
                    .api_key(&config.api_key)
                    .timeout(config.timeout);
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.endpoint(endpoint);
                }
                if let Some(model) = &config.model {
                    builder = builder.model(model);
                }
                Ok(Self::compose(builder.build()?, config))
            }
            ServiceId::Gemini => {
                let mut builder = GeminiAnalysisProvider::builder()
                    .api_key(&config.api_key)
                    .timeout(config.timeout);
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.endpoint(endpoint);
                }
                if let Some(model) = &config.model {
                    builder = builder.model(model);
                }
                Ok(Self::compose(builder.build()?, config))
            }
        }
    }
}
