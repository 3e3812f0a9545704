//! Layer trait and abstractions.
//!
//! Layers provide a composable way to wrap providers with cross-cutting
//! concerns like logging and retry before they are handed to the service
//! manager.

use crate::error::RelaisError;
use crate::provider::AnalysisProvider;
use crate::types::{AnalysisRequest, AnalysisResponse, ProviderInfo, ServiceMetrics};
use async_trait::async_trait;
use std::sync::Arc;

/// Layer trait for wrapping providers.
///
/// Each layer wraps an inner provider and returns a new provider with
/// enhanced capabilities.
pub trait Layer<P: AnalysisProvider> {
    /// The type of the layered provider
    type LayeredProvider: AnalysisProvider;

    /// Wrap the inner provider with this layer
    fn layer(&self, inner: P) -> Self::LayeredProvider;
}

/// Helper trait for layered providers.
///
/// Provides default forwarding implementations for provider methods;
/// implementers only override the methods they want to intercept.
#[async_trait]
pub trait LayeredProvider: Sized + AnalysisProvider {
    /// The inner provider type
    type Inner: AnalysisProvider;

    /// Get a reference to the inner provider
    fn inner(&self) -> &Self::Inner;

    /// Default implementation for info - forwards to inner
    fn layered_info(&self) -> Arc<ProviderInfo> {
        self.inner().info()
    }

    /// Default implementation for analyze - forwards to inner
    async fn layered_analyze(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisResponse, RelaisError> {
        self.inner().analyze(request).await
    }

    /// Default implementation for health_check - forwards to inner
    async fn layered_health_check(&self) -> Result<bool, RelaisError> {
        self.inner().health_check().await
    }

    /// Default implementation for metrics - forwards to inner
    fn layered_metrics(&self) -> ServiceMetrics {
        self.inner().metrics()
    }
}

/// Macro to implement AnalysisProvider by forwarding to LayeredProvider
/// methods.
///
/// This reduces boilerplate for layered providers.
#[macro_export]
macro_rules! impl_layered_provider {
    ($type:ty) => {
        #[async_trait::async_trait]
        impl $crate::provider::AnalysisProvider for $type {
            fn info(&self) -> std::sync::Arc<$crate::types::ProviderInfo> {
                $crate::layer::LayeredProvider::layered_info(self)
            }

            async fn analyze(
                &self,
                request: $crate::types::AnalysisRequest,
            ) -> Result<$crate::types::AnalysisResponse, $crate::error::RelaisError> {
                $crate::layer::LayeredProvider::layered_analyze(self, request).await
            }

            async fn health_check(&self) -> Result<bool, $crate::error::RelaisError> {
                $crate::layer::LayeredProvider::layered_health_check(self).await
            }

            fn metrics(&self) -> $crate::types::ServiceMetrics {
                $crate::layer::LayeredProvider::layered_metrics(self)
            }
        }
    };
}
