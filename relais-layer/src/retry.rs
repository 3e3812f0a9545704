//! Retry layer with exponential backoff.

use async_trait::async_trait;
use relais_core::error::RelaisError;
use relais_core::layer::{Layer, LayeredProvider};
use relais_core::provider::AnalysisProvider;
use relais_core::types::{AnalysisRequest, AnalysisResponse, ProviderInfo, ServiceMetrics};
use std::sync::Arc;
use std::time::Duration;

/// Retry layer configuration
#[derive(Debug, Clone)]
pub struct RetryLayer {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryLayer {
    /// Create a new retry layer with default settings
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculate delay for a given attempt
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(self.max_delay)
    }
}

impl Default for RetryLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: AnalysisProvider> Layer<P> for RetryLayer {
    type LayeredProvider = RetryProvider<P>;

    fn layer(&self, inner: P) -> Self::LayeredProvider {
        RetryProvider {
            inner,
            config: self.clone(),
        }
    }
}

/// Provider wrapped with retry logic
#[derive(Debug)]
pub struct RetryProvider<P> {
    inner: P,
    config: RetryLayer,
}

impl<P: AnalysisProvider> RetryProvider<P> {
    /// Execute with retry logic
    async fn execute_with_retry<T, F, Fut>(&self, mut operation: F) -> Result<T, RelaisError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, RelaisError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.config.max_retries {
                        return Err(e);
                    }

                    let delay = self.config.calculate_delay(attempt);
                    tracing::debug!(
                        "Retry attempt {}/{}, waiting {:?}",
                        attempt + 1,
                        self.config.max_retries,
                        delay
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl<P: AnalysisProvider> LayeredProvider for RetryProvider<P> {
    type Inner = P;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    async fn layered_analyze(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisResponse, RelaisError> {
        // Clone request for retry attempts
        let request_clone = request.clone();
        self.execute_with_retry(|| {
            let request = request_clone.clone();
            async move { self.inner.analyze(request).await }
        })
        .await
    }

    // Health probes are not retried: a probe exists to observe the current
    // state, and retrying would mask exactly what it measures.
}

#[async_trait]
impl<P: AnalysisProvider> AnalysisProvider for RetryProvider<P> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use relais_core::types::ServiceId;
    use std::fmt;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        calls: AtomicU32,
        succeed_after: u32,
        retryable: bool,
    }

    impl fmt::Debug for FlakyProvider {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("FlakyProvider").finish()
        }
    }

    #[async_trait]
    impl AnalysisProvider for FlakyProvider {
        fn info(&self) -> Arc<ProviderInfo> {
            Arc::new(ProviderInfo {
                id: ServiceId::Gpt4,
                name: "flaky".to_string(),
                model: "flaky-1".to_string(),
            })
        }

        async fn analyze(
            &self,
            _request: AnalysisRequest,
        ) -> Result<AnalysisResponse, RelaisError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.succeed_after {
                Ok(AnalysisResponse::new(ServiceId::Gpt4, "flaky-1", "ok", 0.8))
            } else if self.retryable {
                Err(RelaisError::rate_limit("slow down"))
            } else {
                Err(RelaisError::validation("bad input"))
            }
        }

        async fn health_check(&self) -> Result<bool, RelaisError> {
            Ok(true)
        }

        fn metrics(&self) -> ServiceMetrics {
            ServiceMetrics::zeroed(ServiceId::Gpt4)
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new("hello", "text/plain")
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            succeed_after: 2,
            retryable: true,
        };
        let layered = RetryLayer::new()
            .with_initial_delay(Duration::from_millis(1))
            .layer(provider);

        let response = layered.analyze(request()).await.unwrap();
        assert!(response.success);
        assert_eq!(layered.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            succeed_after: 2,
            retryable: false,
        };
        let layered = RetryLayer::new()
            .with_initial_delay(Duration::from_millis(1))
            .layer(provider);

        assert!(layered.analyze(request()).await.is_err());
        assert_eq!(layered.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let provider = FlakyProvider {
            calls: AtomicU32::new(0),
            succeed_after: u32::MAX,
            retryable: true,
        };
        let layered = RetryLayer::new()
            .with_max_retries(2)
            .with_initial_delay(Duration::from_millis(1))
            .layer(provider);

        assert!(layered.analyze(request()).await.is_err());
        assert_eq!(layered.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_is_capped_at_max_delay() {
        let layer = RetryLayer::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(250))
            .with_backoff_multiplier(2.0);
        assert_eq!(layer.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(layer.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(layer.calculate_delay(2), Duration::from_millis(250));
    }
}
