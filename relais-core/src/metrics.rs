//! Manager-level metrics bookkeeping, one row per registered service.

use dashmap::DashMap;
use std::time::{Duration, Instant, SystemTime};

use crate::breaker::BreakerState;
use crate::types::{ServiceId, ServiceMetrics};

/// How long an explicit health probe result overrides the breaker-derived
/// health flag.
const HEALTH_OVERRIDE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct MetricsRow {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    /// Sum of successful-call latencies, for the running mean
    total_response_time: Duration,
    last_request_time: Option<SystemTime>,
    health_override: Option<(bool, Instant)>,
}

impl MetricsRow {
    fn average_response_time(&self) -> Duration {
        if self.successful_requests == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.successful_requests as u32
        }
    }
}

/// Concurrent per-service counters.
///
/// Every dispatch attempt is counted here, whether it reached the network or
/// was short-circuited by an open breaker. Rows live for the manager's
/// lifetime; `cleanup()` empties the map.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    rows: DashMap<ServiceId, MetricsRow>,
}

impl MetricsCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a zeroed row for a service
    pub fn register(&self, id: ServiceId) {
        self.rows.entry(id).or_default();
    }

    /// Drop a service's counters
    pub fn remove(&self, id: ServiceId) {
        self.rows.remove(&id);
    }

    /// Drop every row
    pub fn clear(&self) {
        self.rows.clear();
    }

    /// Count a dispatch attempt before the call is made
    pub fn record_attempt(&self, id: ServiceId) {
        let mut row = self.rows.entry(id).or_default();
        row.total_requests += 1;
        row.last_request_time = Some(SystemTime::now());
    }

    /// Count a success and fold its latency into the running mean
    pub fn record_success(&self, id: ServiceId, latency: Duration) {
        let mut row = self.rows.entry(id).or_default();
        row.successful_requests += 1;
        row.total_response_time += latency;
    }

    /// Count a failure (provider error, timeout, or breaker fast-fail)
    pub fn record_failure(&self, id: ServiceId) {
        let mut row = self.rows.entry(id).or_default();
        row.failed_requests += 1;
    }

    /// Record an explicit health probe result, which overrides the
    /// breaker-derived flag until it ages out.
    pub fn record_health_probe(&self, id: ServiceId, healthy: bool) {
        let mut row = self.rows.entry(id).or_default();
        row.health_override = Some((healthy, Instant::now()));
    }

    /// Snapshot a service's counters.
    ///
    /// `is_healthy` derives from the breaker state (`Closed`/`HalfOpen` are
    /// healthy) unless a recent explicit probe says otherwise.
    pub fn snapshot(&self, id: ServiceId, breaker_state: BreakerState) -> Option<ServiceMetrics> {
        let row = self.rows.get(&id)?;
        let is_healthy = match row.health_override {
            Some((healthy, at)) if at.elapsed() < HEALTH_OVERRIDE_TTL => healthy,
            _ => breaker_state.allows_requests(),
        };
        Some(ServiceMetrics {
            service_id: id,
            total_requests: row.total_requests,
            successful_requests: row.successful_requests,
            failed_requests: row.failed_requests,
            average_response_time: row.average_response_time(),
            last_request_time: row.last_request_time,
            is_healthy,
        })
    }
}
