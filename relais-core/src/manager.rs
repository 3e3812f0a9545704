//! The service manager: registry construction, fallback routing, lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::breaker::CircuitBreaker;
use crate::config::{ServiceManagerConfig, ServiceManagerConfigPatch};
use crate::error::RelaisError;
use crate::metrics::MetricsCollector;
use crate::provider::ProviderFactory;
use crate::registry::ServiceRegistry;
use crate::types::{AnalysisRequest, AnalysisResponse, ServiceId, ServiceMetrics};

/// Compute the candidate order for one request: preferred first (if
/// enabled), then the default service, then the configured fallback order,
/// de-duplicated and filtered to the enabled set.
pub fn candidate_order(
    config: &ServiceManagerConfig,
    preferred: Option<ServiceId>,
) -> Vec<ServiceId> {
    let mut candidates = Vec::with_capacity(config.enabled_services.len() + 1);
    let mut push = |id: ServiceId, candidates: &mut Vec<ServiceId>| {
        if config.enabled_services.contains(&id) && !candidates.contains(&id) {
            candidates.push(id);
        }
    };
    if let Some(id) = preferred {
        push(id, &mut candidates);
    }
    push(config.default_service, &mut candidates);
    for id in &config.fallback_order {
        push(*id, &mut candidates);
    }
    candidates
}

/// Long-lived orchestrator serving concurrent analysis calls.
///
/// Owns the registry of (provider, breaker) pairs and the authoritative
/// metrics. Providers are constructed through the injected
/// [`ProviderFactory`], so the manager itself never names a concrete vendor
/// client.
pub struct ServiceManager {
    config: RwLock<ServiceManagerConfig>,
    registry: ServiceRegistry,
    metrics: MetricsCollector,
    factory: Arc<dyn ProviderFactory>,
    initialized: AtomicBool,
    /// Serializes initialize/update/cleanup against each other
    lifecycle: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceManager")
            .field("enabled_services", &self.enabled_services())
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .finish()
    }
}

impl ServiceManager {
    /// Create a configured-but-not-initialized manager
    pub fn new(
        config: ServiceManagerConfig,
        factory: Arc<dyn ProviderFactory>,
    ) -> Result<Self, RelaisError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            registry: ServiceRegistry::new(),
            metrics: MetricsCollector::new(),
            factory,
            initialized: AtomicBool::new(false),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    /// Build one registry entry per enabled service.
    ///
    /// Idempotent: a second call (including concurrent ones) is a no-op. A
    /// factory failure skips that service only; every other enabled service
    /// is still registered, and the first failure is reported after the
    /// loop finishes.
    pub async fn initialize(&self) -> Result<(), RelaisError> {
        let _guard = self.lifecycle.lock().await;
        if self.initialized.load(Ordering::SeqCst) {
            tracing::debug!("service manager already initialized");
            return Ok(());
        }

        let config = self.config_snapshot();
        let mut first_failure = None;
        for id in &config.enabled_services {
            if let Err(err) = self.register_service(&config, *id) {
                tracing::warn!(service = %id, error = %err, "skipping service registration");
                first_failure.get_or_insert(err);
            }
        }
        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!(services = self.registry.len(), "service manager initialized");

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Analyze content through the first healthy candidate.
    ///
    /// Candidates are tried strictly in order; the first success returns
    /// immediately and later candidates are never invoked. Breaker
    /// fast-fails advance the chain like any other failure. When the chain
    /// is exhausted the per-service errors are aggregated into
    /// [`RelaisError::AllServicesFailed`].
    pub async fn analyze_content(
        &self,
        content: impl Into<String>,
        content_type: impl Into<String>,
        preferred_service: Option<ServiceId>,
    ) -> Result<AnalysisResponse, RelaisError> {
        let mut request = AnalysisRequest::new(content, content_type);
        if let Some(id) = preferred_service {
            request = request.with_preferred_service(id);
        }
        request.validate()?;

        let candidates = {
            let config = self.config_snapshot();
            candidate_order(&config, preferred_service)
        };

        let mut failures: Vec<(ServiceId, String)> = Vec::new();
        for id in candidates {
            let Some(breaker) = self.registry.get(id) else {
                continue;
            };
            self.metrics.record_attempt(id);
            let start = Instant::now();
            match breaker.fire(request.clone()).await {
                Ok(response) => {
                    let elapsed = start.elapsed();
                    self.metrics.record_success(id, elapsed);
                    tracing::debug!(service = %id, ?elapsed, "analysis succeeded");
                    return Ok(response.with_processing_time(elapsed));
                }
                Err(err) => {
                    self.metrics.record_failure(id);
                    tracing::debug!(service = %id, error = %err, "candidate failed, advancing");
                    failures.push((id, err.to_string()));
                }
            }
        }
        Err(RelaisError::AllServicesFailed { failures })
    }

    /// Run the named services side by side over the same content.
    ///
    /// Each service still goes through its own breaker and is counted in the
    /// manager metrics; one vendor failing does not fail the comparison.
    pub async fn compare_analyses(
        &self,
        content: impl Into<String>,
        content_type: impl Into<String>,
        services: &[ServiceId],
    ) -> Result<HashMap<ServiceId, Result<AnalysisResponse, RelaisError>>, RelaisError> {
        if services.is_empty() {
            return Err(RelaisError::validation("services must not be empty"));
        }
        let request = AnalysisRequest::new(content, content_type);
        request.validate()?;

        let mut breakers = Vec::with_capacity(services.len());
        for id in services {
            let breaker = self
                .registry
                .get(*id)
                .ok_or_else(|| RelaisError::validation(format!("service {id} is not enabled")))?;
            breakers.push((*id, breaker));
        }

        let calls = breakers.into_iter().map(|(id, breaker)| {
            let request = request.clone();
            async move {
                self.metrics.record_attempt(id);
                let start = Instant::now();
                let result = breaker.fire(request).await;
                match result {
                    Ok(response) => {
                        let elapsed = start.elapsed();
                        self.metrics.record_success(id, elapsed);
                        (id, Ok(response.with_processing_time(elapsed)))
                    }
                    Err(err) => {
                        self.metrics.record_failure(id);
                        (id, Err(err))
                    }
                }
            }
        });
        Ok(futures::future::join_all(calls).await.into_iter().collect())
    }

    /// Probe one service's liveness.
    ///
    /// Delegates to the provider's own `health_check`; the result also
    /// overrides the breaker-derived health flag in the metrics snapshot.
    /// Probes never feed breaker statistics.
    pub async fn service_health(&self, id: ServiceId) -> Result<bool, RelaisError> {
        let breaker = self
            .registry
            .get(id)
            .ok_or(RelaisError::ServiceNotFound(id))?;
        let healthy = breaker.provider().health_check().await.unwrap_or(false);
        self.metrics.record_health_probe(id, healthy);
        Ok(healthy)
    }

    /// Probe every registered service, keyed identically to
    /// [`enabled_services`](Self::enabled_services).
    pub async fn all_service_health(&self) -> HashMap<ServiceId, bool> {
        let mut health = HashMap::new();
        for id in self.enabled_services() {
            if let Ok(healthy) = self.service_health(id).await {
                health.insert(id, healthy);
            }
        }
        health
    }

    /// Snapshot one service's manager-level counters, without side effects
    pub fn service_metrics(&self, id: ServiceId) -> Result<ServiceMetrics, RelaisError> {
        let breaker = self
            .registry
            .get(id)
            .ok_or(RelaisError::ServiceNotFound(id))?;
        self.metrics
            .snapshot(id, breaker.state())
            .ok_or(RelaisError::ServiceNotFound(id))
    }

    /// Snapshot every registered service's counters
    pub fn all_service_metrics(&self) -> HashMap<ServiceId, ServiceMetrics> {
        self.enabled_services()
            .into_iter()
            .filter_map(|id| self.service_metrics(id).ok().map(|m| (id, m)))
            .collect()
    }

    /// Ids of the currently registered services, in configuration order
    pub fn enabled_services(&self) -> Vec<ServiceId> {
        let config = self.config_snapshot();
        config
            .enabled_services
            .into_iter()
            .filter(|id| self.registry.contains(*id))
            .collect()
    }

    /// Merge a partial configuration update.
    ///
    /// Newly enabled services are registered immediately; services dropped
    /// from the enabled set are disposed immediately so no provider
    /// connection outlives its configuration.
    pub async fn update_configuration(
        &self,
        patch: ServiceManagerConfigPatch,
    ) -> Result<(), RelaisError> {
        let _guard = self.lifecycle.lock().await;
        let merged = self.config_snapshot().merged(patch)?;

        for id in self.registry.ids() {
            if !merged.enabled_services.contains(&id) {
                tracing::info!(service = %id, "disposing service removed from configuration");
                self.registry.remove(id);
                self.metrics.remove(id);
            }
        }

        let mut first_failure = None;
        for id in &merged.enabled_services {
            if let Err(err) = self.register_service(&merged, *id) {
                tracing::warn!(service = %id, error = %err, "skipping service registration");
                first_failure.get_or_insert(err);
            }
        }

        *self.write_config() = merged;
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Tear down every registry entry and empty the enabled set.
    ///
    /// Safe to call from any state, including before `initialize()`; a
    /// subsequent `analyze_content` fails immediately.
    pub async fn cleanup(&self) {
        let _guard = self.lifecycle.lock().await;
        let disposed = self.registry.drain();
        self.metrics.clear();
        {
            let mut config = self.write_config();
            config.enabled_services.clear();
            config.fallback_order.clear();
        }
        self.initialized.store(false, Ordering::SeqCst);
        tracing::info!(services = disposed.len(), "service manager cleaned up");
    }

    /// Build and register the (provider, breaker, metrics) entry for one
    /// service; existing entries are left untouched.
    fn register_service(
        &self,
        config: &ServiceManagerConfig,
        id: ServiceId,
    ) -> Result<(), RelaisError> {
        if self.registry.contains(id) {
            return Ok(());
        }
        let provider_config = config
            .provider_config(id)
            .ok_or_else(|| RelaisError::configuration(format!("no configuration for {id}")))?;
        let provider = self.factory.create(provider_config)?;
        let breaker = CircuitBreaker::new(id, provider, config.circuit_breaker_options.clone());
        self.registry.insert(id, Arc::new(breaker));
        self.metrics.register(id);
        tracing::debug!(service = %id, "registered service");
        Ok(())
    }

    fn config_snapshot(&self) -> ServiceManagerConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn write_config(&self) -> std::sync::RwLockWriteGuard<'_, ServiceManagerConfig> {
        self.config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
