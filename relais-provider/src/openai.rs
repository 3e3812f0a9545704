//! OpenAI provider implementation using the async-openai crate.

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    ResponseFormat as OpenAIResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;
use relais_core::error::RelaisError;
use relais_core::provider::AnalysisProvider;
use relais_core::types::{
    AnalysisRequest, AnalysisResponse, ProviderInfo, ServiceId, ServiceMetrics,
};
use std::sync::Arc;

use crate::{analysis_system_prompt, parse_analysis_output, ProviderCounters};

const DEFAULT_MODEL: &str = "gpt-4";

/// GPT-4-class analysis client backed by the OpenAI chat completions API
#[derive(Clone)]
pub struct OpenAiAnalysisProvider {
    client: Client<OpenAIConfig>,
    info: Arc<ProviderInfo>,
    counters: Arc<ProviderCounters>,
}

impl std::fmt::Debug for OpenAiAnalysisProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAnalysisProvider")
            .field("info", &self.info)
            .finish()
    }
}

impl OpenAiAnalysisProvider {
    /// Create a new OpenAI provider with default configuration
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::builder().api_key(api_key).build()
    }

    /// Create a builder for more configuration options
    pub fn builder() -> OpenAiBuilder {
        OpenAiBuilder::default()
    }

    fn build_messages(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, RelaisError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(analysis_system_prompt(&request.content_type))
            .build()
            .map_err(|e| {
                RelaisError::provider(self.info.id, format!("failed to build system message: {e}"))
            })?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(request.content.clone())
            .build()
            .map_err(|e| {
                RelaisError::provider(self.info.id, format!("failed to build user message: {e}"))
            })?;
        Ok(vec![
            ChatCompletionRequestMessage::System(system),
            ChatCompletionRequestMessage::User(user),
        ])
    }
}

#[async_trait]
impl AnalysisProvider for OpenAiAnalysisProvider {
    fn info(&self) -> Arc<ProviderInfo> {
        self.info.clone()
    }

    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, RelaisError> {
        self.counters.record_attempt();

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.info.model)
            .messages(self.build_messages(&request)?)
            .response_format(OpenAIResponseFormat::JsonObject)
            .build()
            .map_err(|e| {
                RelaisError::provider(self.info.id, format!("failed to build request: {e}"))
            })?;

        let start = std::time::Instant::now();
        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| {
                self.counters.record_failure();
                RelaisError::provider(self.info.id, e.to_string())
            })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or_else(|| {
                self.counters.record_failure();
                RelaisError::provider(self.info.id, "no choices in response")
            })?;

        self.counters.record_success(start.elapsed());
        Ok(parse_analysis_output(self.info.id, &self.info.model, content))
    }

    async fn health_check(&self) -> Result<bool, RelaisError> {
        // Listing models is the cheapest authenticated round trip.
        Ok(self.client.models().list().await.is_ok())
    }

    fn metrics(&self) -> ServiceMetrics {
        self.counters.snapshot(self.info.id)
    }
}

/// Builder for OpenAI provider configuration
#[derive(Debug, Default)]
pub struct OpenAiBuilder {
    api_key: Option<String>,
    api_base: Option<String>,
    model: Option<String>,
}

impl OpenAiBuilder {
    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set a custom API base URL (for OpenAI-compatible endpoints)
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Set the model to request
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Build the provider
    pub fn build(self) -> OpenAiAnalysisProvider {
        let mut config = OpenAIConfig::new();
        if let Some(api_key) = self.api_key {
            config = config.with_api_key(api_key);
        }
        if let Some(api_base) = self.api_base {
            config = config.with_api_base(api_base);
        }

        OpenAiAnalysisProvider {
            client: Client::with_config(config),
            info: Arc::new(ProviderInfo {
                id: ServiceId::Gpt4,
                name: "OpenAI".to_string(),
                model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            }),
            counters: Arc::new(ProviderCounters::default()),
        }
    }
}
