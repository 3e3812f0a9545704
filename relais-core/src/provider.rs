//! Provider trait and factory abstractions.

use crate::config::ProviderConfig;
use crate::error::RelaisError;
use crate::types::{AnalysisRequest, AnalysisResponse, ProviderInfo, ServiceMetrics};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Core trait every AI analysis backend implements.
///
/// Clients only implement the raw vendor call plus a liveness probe; routing,
/// breaker protection, and manager-level metrics live in the orchestration
/// layer above.
#[async_trait]
pub trait AnalysisProvider: Send + Sync + Debug + 'static {
    /// Get provider information
    fn info(&self) -> Arc<ProviderInfo>;

    /// Analyze a piece of content.
    ///
    /// Any non-success condition (HTTP error, vendor-side refusal, malformed
    /// response) surfaces as an error; the fallback loop decides whether
    /// another provider gets the request.
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, RelaisError>;

    /// Cheap liveness probe.
    ///
    /// Health probes do not feed circuit breaker statistics, so a probe
    /// against a struggling vendor cannot keep its breaker open by itself.
    async fn health_check(&self) -> Result<bool, RelaisError>;

    /// The provider's own view of its counters.
    ///
    /// The service manager's collector is authoritative for reporting; this
    /// exists for vendor-side bookkeeping and diagnostics.
    fn metrics(&self) -> ServiceMetrics;
}

/// Constructs provider clients from configuration.
///
/// The service manager is generic over this seam, so tests substitute
/// doubles through the public contract instead of poking registry internals.
pub trait ProviderFactory: Send + Sync + 'static {
    /// Build the client for `config.service_id`.
    ///
    /// Fails with [`RelaisError::UnsupportedServiceType`] or
    /// [`RelaisError::Configuration`] when no client can be built; the
    /// manager then skips that service and keeps the rest of the registry
    /// usable.
    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn AnalysisProvider>, RelaisError>;
}
