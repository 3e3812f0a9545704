//! Circuit breaker protecting calls to a single provider.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::CircuitBreakerOptions;
use crate::error::RelaisError;
use crate::provider::AnalysisProvider;
use crate::types::{AnalysisRequest, AnalysisResponse, ServiceId};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation, calls pass through
    Closed,
    /// Failing, calls are rejected without touching the provider
    Open,
    /// Testing recovery, exactly one trial call is admitted
    HalfOpen,
}

impl BreakerState {
    /// Whether this state admits calls at all
    pub fn allows_requests(&self) -> bool {
        matches!(self, BreakerState::Closed | BreakerState::HalfOpen)
    }
}

/// One outcome sample in the rolling window.
#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    failed: bool,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    window: VecDeque<Sample>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Three-state breaker wrapping exactly one provider client.
///
/// Failure accounting uses a rolling window: the breaker opens when the
/// failure percentage over [`CircuitBreakerOptions::rolling_window`] reaches
/// the configured threshold and at least `volume_threshold` samples are
/// present. Fast-fails from an open breaker are not added to the window, so
/// an open breaker cannot deepen its own statistics.
pub struct CircuitBreaker {
    service: ServiceId,
    provider: Arc<dyn AnalysisProvider>,
    options: CircuitBreakerOptions,
    inner: Mutex<BreakerInner>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service", &self.service)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Wrap a provider client in a closed breaker
    pub fn new(
        service: ServiceId,
        provider: Arc<dyn AnalysisProvider>,
        options: CircuitBreakerOptions,
    ) -> Self {
        Self {
            service,
            provider,
            options,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// The wrapped provider client
    pub fn provider(&self) -> &Arc<dyn AnalysisProvider> {
        &self.provider
    }

    /// Current state, applying the open-to-half-open timer transition
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock_inner();
        self.advance_open_state(&mut inner);
        inner.state
    }

    /// Execute one analysis call through the breaker.
    ///
    /// The provider call runs under the breaker's hard `timeout`; exceeding
    /// it counts as a failure sample. An open breaker rejects immediately
    /// with [`RelaisError::CircuitOpen`].
    pub async fn fire(&self, request: AnalysisRequest) -> Result<AnalysisResponse, RelaisError> {
        let trial = self.admit()?;

        let outcome = tokio::time::timeout(self.options.timeout, self.provider.analyze(request)).await;
        match outcome {
            Ok(Ok(response)) => {
                self.record_success(trial);
                Ok(response)
            }
            Ok(Err(err)) => {
                self.record_failure(trial);
                Err(err)
            }
            Err(_) => {
                self.record_failure(trial);
                Err(RelaisError::timeout(format!(
                    "{} call exceeded {:?}",
                    self.service, self.options.timeout
                )))
            }
        }
    }

    /// Decide whether a call may proceed; returns whether it is the
    /// half-open trial call.
    fn admit(&self) -> Result<bool, RelaisError> {
        let mut inner = self.lock_inner();
        self.advance_open_state(&mut inner);
        match inner.state {
            BreakerState::Closed => Ok(false),
            BreakerState::Open => {
                tracing::debug!(service = %self.service, "circuit open, rejecting call");
                Err(RelaisError::CircuitOpen(self.service))
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    tracing::debug!(service = %self.service, "trial already in flight, rejecting call");
                    Err(RelaisError::CircuitOpen(self.service))
                } else {
                    inner.trial_in_flight = true;
                    Ok(true)
                }
            }
        }
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.lock_inner();
        if trial {
            tracing::info!(service = %self.service, "trial call succeeded, closing circuit");
            inner.state = BreakerState::Closed;
            inner.window.clear();
            inner.opened_at = None;
            inner.trial_in_flight = false;
            return;
        }
        let now = Instant::now();
        inner.window.push_back(Sample { at: now, failed: false });
        self.prune_window(&mut inner, now);
    }

    fn record_failure(&self, trial: bool) {
        let mut inner = self.lock_inner();
        if trial {
            tracing::warn!(service = %self.service, "trial call failed, reopening circuit");
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            inner.trial_in_flight = false;
            inner.window.clear();
            return;
        }
        let now = Instant::now();
        inner.window.push_back(Sample { at: now, failed: true });
        self.prune_window(&mut inner, now);

        if inner.state == BreakerState::Closed && self.over_threshold(&inner) {
            tracing::warn!(
                service = %self.service,
                samples = inner.window.len(),
                "error rate over threshold, opening circuit"
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(now);
            inner.window.clear();
        }
    }

    /// Open moves to half-open once `reset_timeout` has elapsed.
    fn advance_open_state(&self, inner: &mut BreakerInner) {
        if inner.state != BreakerState::Open {
            return;
        }
        if let Some(opened_at) = inner.opened_at {
            if opened_at.elapsed() >= self.options.reset_timeout {
                tracing::info!(service = %self.service, "reset timeout elapsed, circuit half-open");
                inner.state = BreakerState::HalfOpen;
                inner.trial_in_flight = false;
            }
        }
    }

    fn over_threshold(&self, inner: &BreakerInner) -> bool {
        let total = inner.window.len() as u32;
        if total < self.options.volume_threshold {
            return false;
        }
        let failed = inner.window.iter().filter(|s| s.failed).count() as u32;
        failed * 100 >= u32::from(self.options.error_threshold_percentage) * total
    }

    fn prune_window(&self, inner: &mut BreakerInner, now: Instant) {
        while let Some(sample) = inner.window.front() {
            if now.duration_since(sample.at) > self.options.rolling_window {
                inner.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // Lock poisoning only happens if a holder panicked; the state is a
        // plain counter window, still safe to reuse.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderInfo;
    use crate::types::ServiceMetrics;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct ScriptedProvider {
        fail: AtomicBool,
        calls: AtomicU32,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                calls: AtomicU32::new(0),
                delay: None,
            }
        }

        fn failing() -> Self {
            let p = Self::new();
            p.fail.store(true, Ordering::SeqCst);
            p
        }
    }

    #[async_trait]
    impl AnalysisProvider for ScriptedProvider {
        fn info(&self) -> Arc<ProviderInfo> {
            Arc::new(ProviderInfo {
                id: ServiceId::Gpt4,
                name: "scripted".to_string(),
                model: "scripted-1".to_string(),
            })
        }

        async fn analyze(&self, _request: AnalysisRequest) -> Result<AnalysisResponse, RelaisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                Err(RelaisError::provider(ServiceId::Gpt4, "scripted failure"))
            } else {
                Ok(AnalysisResponse::new(ServiceId::Gpt4, "scripted-1", "ok", 0.9))
            }
        }

        async fn health_check(&self) -> Result<bool, RelaisError> {
            Ok(!self.fail.load(Ordering::SeqCst))
        }

        fn metrics(&self) -> ServiceMetrics {
            ServiceMetrics::zeroed(ServiceId::Gpt4)
        }
    }

    fn options() -> CircuitBreakerOptions {
        CircuitBreakerOptions {
            timeout: Duration::from_millis(200),
            error_threshold_percentage: 50,
            reset_timeout: Duration::from_millis(50),
            rolling_window: Duration::from_secs(10),
            volume_threshold: 3,
        }
    }

    fn breaker(provider: ScriptedProvider) -> (Arc<ScriptedProvider>, CircuitBreaker) {
        let provider = Arc::new(provider);
        let cb = CircuitBreaker::new(ServiceId::Gpt4, provider.clone(), options());
        (provider, cb)
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new("hello", "text/plain")
    }

    #[tokio::test]
    async fn opens_after_error_rate_exceeds_threshold() {
        let (_, cb) = breaker(ScriptedProvider::failing());

        for _ in 0..3 {
            assert!(cb.fire(request()).await.is_err());
        }
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn below_volume_threshold_stays_closed() {
        let (_, cb) = breaker(ScriptedProvider::failing());

        cb.fire(request()).await.ok();
        cb.fire(request()).await.ok();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn open_breaker_fast_fails_without_calling_provider() {
        let (provider, cb) = breaker(ScriptedProvider::failing());
        for _ in 0..3 {
            cb.fire(request()).await.ok();
        }
        assert_eq!(cb.state(), BreakerState::Open);

        let calls_before = provider.calls.load(Ordering::SeqCst);
        let err = cb.fire(request()).await.unwrap_err();
        assert!(matches!(err, RelaisError::CircuitOpen(ServiceId::Gpt4)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn recovers_through_half_open_trial() {
        let (provider, cb) = breaker(ScriptedProvider::failing());
        for _ in 0..3 {
            cb.fire(request()).await.ok();
        }
        assert_eq!(cb.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        // Service recovered; the trial closes the circuit.
        provider.fail.store(false, Ordering::SeqCst);
        assert!(cb.fire(request()).await.is_ok());
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn failed_trial_reopens_and_restarts_timer() {
        let (_, cb) = breaker(ScriptedProvider::failing());
        for _ in 0..3 {
            cb.fire(request()).await.ok();
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cb.fire(request()).await.is_err());
        assert_eq!(cb.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[tokio::test]
    async fn half_open_admits_exactly_one_trial() {
        let (provider, cb) = breaker(ScriptedProvider::failing());
        for _ in 0..3 {
            cb.fire(request()).await.ok();
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        // Hold the single trial slot open with a slow success.
        provider.fail.store(false, Ordering::SeqCst);
        let cb = Arc::new(cb);
        let slow = {
            let cb = cb.clone();
            tokio::spawn(async move { cb.fire(request()).await })
        };
        tokio::task::yield_now().await;

        let concurrent = cb.fire(request()).await;
        // Either the trial already completed (closing the circuit) or the
        // concurrent call was rejected; it must never panic or hang.
        if let Err(err) = concurrent {
            assert!(matches!(err, RelaisError::CircuitOpen(_)));
        }
        assert!(slow.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn slow_call_counts_as_failure() {
        let mut provider = ScriptedProvider::new();
        provider.delay = Some(Duration::from_millis(500));
        let (_, cb) = breaker(provider);

        for _ in 0..3 {
            let err = cb.fire(request()).await.unwrap_err();
            assert!(matches!(err, RelaisError::Timeout(_)));
        }
        assert_eq!(cb.state(), BreakerState::Open);
    }
}
