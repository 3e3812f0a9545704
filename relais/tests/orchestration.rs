//! End-to-end orchestration tests driving the public contract with
//! factory-injected provider doubles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relais::{
    AnalysisProvider, AnalysisRequest, AnalysisResponse, CircuitBreakerOptions, ProviderConfig,
    ProviderFactory, RelaisError, ServiceId, ServiceManager, ServiceManagerConfig,
    ServiceManagerConfigPatch, ServiceMetrics,
};
use relais::types::ProviderInfo;

#[derive(Debug)]
struct StubProvider {
    id: ServiceId,
    fail: AtomicBool,
    calls: AtomicU32,
}

impl StubProvider {
    fn new(id: ServiceId) -> Arc<Self> {
        Arc::new(Self {
            id,
            fail: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        })
    }

    fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisProvider for StubProvider {
    fn info(&self) -> Arc<ProviderInfo> {
        Arc::new(ProviderInfo {
            id: self.id,
            name: format!("stub-{}", self.id),
            model: format!("{}-model", self.id),
        })
    }

    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, RelaisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(RelaisError::provider(self.id, "stub failure"))
        } else {
            Ok(AnalysisResponse::new(
                self.id,
                format!("{}-model", self.id),
                format!("analyzed: {}", request.content),
                0.9,
            ))
        }
    }

    async fn health_check(&self) -> Result<bool, RelaisError> {
        Ok(!self.fail.load(Ordering::SeqCst))
    }

    fn metrics(&self) -> ServiceMetrics {
        ServiceMetrics::zeroed(self.id)
    }
}

/// Hands the same stub back for every create call so tests keep a handle on
/// the provider behind the registry, and counts creations to catch
/// duplicate initialization.
#[derive(Default)]
struct StubFactory {
    providers: Mutex<HashMap<ServiceId, Arc<StubProvider>>>,
    creations: Mutex<HashMap<ServiceId, u32>>,
}

impl StubFactory {
    fn provider(&self, id: ServiceId) -> Arc<StubProvider> {
        self.providers
            .lock()
            .unwrap()
            .entry(id)
            .or_insert_with(|| StubProvider::new(id))
            .clone()
    }

    fn creations(&self, id: ServiceId) -> u32 {
        self.creations.lock().unwrap().get(&id).copied().unwrap_or(0)
    }
}

impl ProviderFactory for StubFactory {
    fn create(
        &self,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn AnalysisProvider>, RelaisError> {
        *self
            .creations
            .lock()
            .unwrap()
            .entry(config.service_id)
            .or_default() += 1;
        Ok(self.provider(config.service_id))
    }
}

fn breaker_options() -> CircuitBreakerOptions {
    CircuitBreakerOptions {
        timeout: Duration::from_millis(500),
        error_threshold_percentage: 50,
        reset_timeout: Duration::from_millis(50),
        rolling_window: Duration::from_secs(10),
        volume_threshold: 2,
    }
}

fn two_service_config() -> ServiceManagerConfig {
    ServiceManagerConfig::new(vec![
        ProviderConfig::new(ServiceId::Gpt4, "test-key"),
        ProviderConfig::new(ServiceId::Claude, "test-key"),
    ])
    .unwrap()
    .with_circuit_breaker_options(breaker_options())
}

async fn manager_with_factory(
    config: ServiceManagerConfig,
) -> (Arc<StubFactory>, ServiceManager) {
    let factory = Arc::new(StubFactory::default());
    let manager = ServiceManager::new(config, factory.clone()).unwrap();
    manager.initialize().await.unwrap();
    (factory, manager)
}

#[tokio::test]
async fn healthy_default_service_answers_without_touching_fallbacks() {
    let (factory, manager) = manager_with_factory(two_service_config()).await;

    let response = manager
        .analyze_content("hello", "text/plain", None)
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.metadata.service_id, ServiceId::Gpt4);
    assert_eq!(response.content, "analyzed: hello");
    assert_eq!(factory.provider(ServiceId::Gpt4).calls(), 1);
    // Short-circuit on success: the fallback never sees the request.
    assert_eq!(factory.provider(ServiceId::Claude).calls(), 0);
}

#[tokio::test]
async fn failing_default_falls_back_to_next_candidate() {
    let (factory, manager) = manager_with_factory(two_service_config()).await;
    factory.provider(ServiceId::Gpt4).set_failing(true);

    let response = manager
        .analyze_content("hello", "text/plain", None)
        .await
        .unwrap();

    assert_eq!(response.metadata.service_id, ServiceId::Claude);
    assert_eq!(factory.provider(ServiceId::Gpt4).calls(), 1);
    assert_eq!(factory.provider(ServiceId::Claude).calls(), 1);
}

#[tokio::test]
async fn preferred_service_is_tried_first() {
    let (factory, manager) = manager_with_factory(two_service_config()).await;

    let response = manager
        .analyze_content("hello", "text/plain", Some(ServiceId::Claude))
        .await
        .unwrap();

    assert_eq!(response.metadata.service_id, ServiceId::Claude);
    assert_eq!(factory.provider(ServiceId::Gpt4).calls(), 0);
}

#[tokio::test]
async fn exhausted_chain_aggregates_every_failure() {
    let (factory, manager) = manager_with_factory(two_service_config()).await;
    factory.provider(ServiceId::Gpt4).set_failing(true);
    factory.provider(ServiceId::Claude).set_failing(true);

    let err = manager
        .analyze_content("hello", "text/plain", None)
        .await
        .unwrap_err();

    assert!(matches!(err, RelaisError::AllServicesFailed { .. }));
    let message = err.to_string();
    assert!(message.contains("All AI services failed"));
    assert!(message.contains("gpt4"));
    assert!(message.contains("claude"));
    assert_eq!(err.failures().len(), 2);
}

#[tokio::test]
async fn open_breaker_skips_provider_entirely() {
    let (factory, manager) = manager_with_factory(two_service_config()).await;
    let gpt4 = factory.provider(ServiceId::Gpt4);
    gpt4.set_failing(true);

    // Two failures hit the 50% threshold at volume 2 and open the breaker.
    for _ in 0..2 {
        manager.analyze_content("hello", "text/plain", None).await.ok();
    }
    let calls_before = gpt4.calls();

    let response = manager
        .analyze_content("hello", "text/plain", None)
        .await
        .unwrap();

    assert_eq!(response.metadata.service_id, ServiceId::Claude);
    assert_eq!(gpt4.calls(), calls_before);
}

#[tokio::test]
async fn breaker_recovers_after_reset_timeout() {
    let (factory, manager) = manager_with_factory(two_service_config()).await;
    let gpt4 = factory.provider(ServiceId::Gpt4);
    gpt4.set_failing(true);
    for _ in 0..2 {
        manager.analyze_content("hello", "text/plain", None).await.ok();
    }

    gpt4.set_failing(false);
    tokio::time::sleep(Duration::from_millis(60)).await;

    let response = manager
        .analyze_content("hello", "text/plain", None)
        .await
        .unwrap();
    assert_eq!(response.metadata.service_id, ServiceId::Gpt4);
}

#[tokio::test]
async fn health_map_is_keyed_like_enabled_services() {
    let (factory, manager) = manager_with_factory(two_service_config()).await;
    factory.provider(ServiceId::Claude).set_failing(true);

    let health = manager.all_service_health().await;
    let enabled = manager.enabled_services();

    assert_eq!(health.len(), enabled.len());
    for id in &enabled {
        assert!(health.contains_key(id));
    }
    assert_eq!(health[&ServiceId::Gpt4], true);
    assert_eq!(health[&ServiceId::Claude], false);
}

#[tokio::test]
async fn unknown_service_lookups_are_rejected() {
    let (_, manager) = manager_with_factory(two_service_config()).await;

    assert!(matches!(
        manager.service_health(ServiceId::Gemini).await,
        Err(RelaisError::ServiceNotFound(ServiceId::Gemini))
    ));
    assert!(matches!(
        manager.service_metrics(ServiceId::Gemini),
        Err(RelaisError::ServiceNotFound(ServiceId::Gemini))
    ));
}

#[tokio::test]
async fn metrics_count_every_dispatch_attempt() {
    let (factory, manager) = manager_with_factory(two_service_config()).await;
    factory.provider(ServiceId::Gpt4).set_failing(true);

    manager
        .analyze_content("hello", "text/plain", None)
        .await
        .unwrap();

    let gpt4 = manager.service_metrics(ServiceId::Gpt4).unwrap();
    assert_eq!(gpt4.total_requests, 1);
    assert_eq!(gpt4.failed_requests, 1);
    assert_eq!(gpt4.successful_requests, 0);

    let claude = manager.service_metrics(ServiceId::Claude).unwrap();
    assert_eq!(claude.total_requests, 1);
    assert_eq!(claude.successful_requests, 1);

    let all = manager.all_service_metrics();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn initialize_twice_creates_no_duplicates() {
    let (factory, manager) = manager_with_factory(two_service_config()).await;
    let before = manager.enabled_services();

    manager.initialize().await.unwrap();

    assert_eq!(manager.enabled_services(), before);
    assert_eq!(factory.creations(ServiceId::Gpt4), 1);
    assert_eq!(factory.creations(ServiceId::Claude), 1);
}

#[tokio::test]
async fn update_configuration_matches_enabled_set_exactly() {
    let config = ServiceManagerConfig::new(vec![
        ProviderConfig::new(ServiceId::Gpt4, "test-key"),
        ProviderConfig::new(ServiceId::Claude, "test-key"),
        ProviderConfig::new(ServiceId::Gemini, "test-key"),
    ])
    .unwrap()
    .with_circuit_breaker_options(breaker_options());
    let (_, manager) = manager_with_factory(config).await;

    manager
        .update_configuration(ServiceManagerConfigPatch {
            enabled_services: Some(vec![ServiceId::Claude, ServiceId::Gemini]),
            fallback_order: Some(vec![ServiceId::Claude, ServiceId::Gemini]),
            default_service: Some(ServiceId::Claude),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(
        manager.enabled_services(),
        vec![ServiceId::Claude, ServiceId::Gemini]
    );
    // The disposed service is gone from lookups too.
    assert!(manager.service_metrics(ServiceId::Gpt4).is_err());
}

#[tokio::test]
async fn invalid_patch_is_rejected_whole() {
    let (_, manager) = manager_with_factory(two_service_config()).await;
    let before = manager.enabled_services();

    let err = manager
        .update_configuration(ServiceManagerConfigPatch::enabled_services(vec![
            ServiceId::Claude,
        ]))
        .await;

    // default_service stays gpt4, which the patch would disable.
    assert!(err.is_err());
    assert_eq!(manager.enabled_services(), before);
}

#[tokio::test]
async fn cleanup_empties_the_registry_and_fails_fast() {
    let (_, manager) = manager_with_factory(two_service_config()).await;

    manager.cleanup().await;

    assert!(manager.enabled_services().is_empty());
    let err = manager
        .analyze_content("hello", "text/plain", None)
        .await
        .unwrap_err();
    assert!(matches!(err, RelaisError::AllServicesFailed { .. }));
}

#[tokio::test]
async fn cleanup_before_initialize_is_safe() {
    let factory = Arc::new(StubFactory::default());
    let manager = ServiceManager::new(two_service_config(), factory).unwrap();
    manager.cleanup().await;
    assert!(manager.enabled_services().is_empty());
}

#[tokio::test]
async fn blank_input_is_a_validation_error() {
    let (_, manager) = manager_with_factory(two_service_config()).await;

    let err = manager.analyze_content("", "text/plain", None).await.unwrap_err();
    assert!(matches!(err, RelaisError::Validation(_)));

    let err = manager.analyze_content("hello", " ", None).await.unwrap_err();
    assert!(matches!(err, RelaisError::Validation(_)));
}

#[tokio::test]
async fn compare_runs_each_requested_service() -> anyhow::Result<()> {
    let (factory, manager) = manager_with_factory(two_service_config()).await;
    factory.provider(ServiceId::Claude).set_failing(true);

    let results = manager
        .compare_analyses("hello", "text/plain", &[ServiceId::Gpt4, ServiceId::Claude])
        .await?;

    assert_eq!(results.len(), 2);
    assert!(results[&ServiceId::Gpt4].is_ok());
    assert!(results[&ServiceId::Claude].is_err());
    Ok(())
}

#[tokio::test]
async fn compare_validates_its_service_list() {
    let (_, manager) = manager_with_factory(two_service_config()).await;

    assert!(matches!(
        manager.compare_analyses("hello", "text/plain", &[]).await,
        Err(RelaisError::Validation(_))
    ));
    assert!(matches!(
        manager
            .compare_analyses("hello", "text/plain", &[ServiceId::Gemini])
            .await,
        Err(RelaisError::Validation(_))
    ));
}

#[tokio::test]
async fn concurrent_analyze_calls_share_breaker_state() {
    let (factory, manager) = manager_with_factory(two_service_config()).await;
    factory.provider(ServiceId::Gpt4).set_failing(true);
    let manager = Arc::new(manager);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager.analyze_content("hello", "text/plain", None).await
            })
        })
        .collect();
    for task in tasks {
        // Every call lands on the healthy fallback regardless of breaker
        // state at dispatch time.
        let response = task.await.unwrap().unwrap();
        assert_eq!(response.metadata.service_id, ServiceId::Claude);
    }

    let metrics = manager.service_metrics(ServiceId::Claude).unwrap();
    assert_eq!(metrics.successful_requests, 8);
}
