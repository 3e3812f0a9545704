//! Logging layer for provider operations.

use async_trait::async_trait;
use relais_core::error::RelaisError;
use relais_core::layer::{Layer, LayeredProvider};
use relais_core::provider::AnalysisProvider;
use relais_core::types::{AnalysisRequest, AnalysisResponse, ProviderInfo, ServiceMetrics};
use std::sync::Arc;

/// Logging layer that logs provider operations.
#[derive(Debug, Clone)]
pub struct LoggingLayer {
    prefix: String,
}

impl LoggingLayer {
    /// Create a new logging layer
    pub fn new() -> Self {
        Self {
            prefix: "[relais]".to_string(),
        }
    }

    /// Create a logging layer with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: AnalysisProvider> Layer<P> for LoggingLayer {
    type LayeredProvider = LoggingProvider<P>;

    fn layer(&self, inner: P) -> Self::LayeredProvider {
        LoggingProvider {
            inner,
            prefix: self.prefix.clone(),
        }
    }
}

/// Provider wrapped with logging
#[derive(Debug)]
pub struct LoggingProvider<P> {
    inner: P,
    prefix: String,
}

#[async_trait]
impl<P: AnalysisProvider> LayeredProvider for LoggingProvider<P> {
    type Inner = P;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    async fn layered_analyze(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisResponse, RelaisError> {
        let info = self.inner.info();
        tracing::debug!(
            "{} analyze request: service={}, content_type={}, bytes={}",
            self.prefix,
            info.id,
            request.content_type,
            request.content.len()
        );

        let start = std::time::Instant::now();
        let result = self.inner.analyze(request).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::debug!(
                    "{} analyze success: service={}, confidence={:.2}, elapsed={:?}",
                    self.prefix,
                    info.id,
                    response.confidence,
                    elapsed
                );
            }
            Err(e) => {
                tracing::error!(
                    "{} analyze error: service={}, error={:?}, elapsed={:?}",
                    self.prefix,
                    info.id,
                    e,
                    elapsed
                );
            }
        }

        result
    }

    async fn layered_health_check(&self) -> Result<bool, RelaisError> {
        let result = self.inner.health_check().await;
        if let Ok(healthy) = &result {
            tracing::debug!(
                "{} health_check: service={}, healthy={}",
                self.prefix,
                self.inner.info().id,
                healthy
            );
        }
        result
    }
}

#[async_trait]
impl<P: AnalysisProvider> AnalysisProvider for LoggingProvider<P> {
    fn info(&self) -> Arc<ProviderInfo> {
        LayeredProvider::layered_info(self)
    }

    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, RelaisError> {
        LayeredProvider::layered_analyze(self, request).await
    }

    async fn health_check(&self) -> Result<bool, RelaisError> {
        LayeredProvider::layered_health_check(self).await
    }

    fn metrics(&self) -> ServiceMetrics {
        LayeredProvider::layered_metrics(self)
    }
}
