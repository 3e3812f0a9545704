//! Configuration for the service manager and its providers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::RelaisError;
use crate::types::ServiceId;

/// Static connection settings for one provider.
///
/// Immutable once the service has been initialized; a later configuration
/// update replaces the whole entry rather than mutating it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub service_id: ServiceId,
    pub api_key: String,
    /// Override of the vendor's default API endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Model identifier; each client falls back to a vendor default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-call network timeout used by the client itself
    #[serde(default = "default_provider_timeout", with = "duration_millis")]
    pub timeout: Duration,
}

fn default_max_retries() -> u32 {
    3
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(30)
}

impl ProviderConfig {
    /// Create a provider config with default retry/timeout settings
    pub fn new(service_id: ServiceId, api_key: impl Into<String>) -> Self {
        Self {
            service_id,
            api_key: api_key.into(),
            endpoint: None,
            model: None,
            max_retries: default_max_retries(),
            timeout: default_provider_timeout(),
        }
    }

    /// Set a custom API endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the model to request from the vendor
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the per-call network timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Circuit breaker tuning shared by every registered service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerOptions {
    /// Hard per-call deadline enforced by the breaker
    #[serde(default = "default_breaker_timeout", with = "duration_millis")]
    pub timeout: Duration,
    /// Failure percentage over the rolling window that opens the breaker
    #[serde(default = "default_error_threshold")]
    pub error_threshold_percentage: u8,
    /// How long an open breaker waits before admitting a trial call
    #[serde(default = "default_reset_timeout", with = "duration_millis")]
    pub reset_timeout: Duration,
    /// Width of the rolling failure-rate window
    #[serde(default = "default_rolling_window", with = "duration_millis")]
    pub rolling_window: Duration,
    /// Minimum samples in the window before the threshold is evaluated
    #[serde(default = "default_volume_threshold")]
    pub volume_threshold: u32,
}

fn default_breaker_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_error_threshold() -> u8 {
    50
}

fn default_reset_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_rolling_window() -> Duration {
    Duration::from_secs(10)
}

fn default_volume_threshold() -> u32 {
    5
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            timeout: default_breaker_timeout(),
            error_threshold_percentage: default_error_threshold(),
            reset_timeout: default_reset_timeout(),
            rolling_window: default_rolling_window(),
            volume_threshold: default_volume_threshold(),
        }
    }
}

/// Full configuration supplied to [`ServiceManager::new`].
///
/// [`ServiceManager::new`]: crate::manager::ServiceManager::new
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceManagerConfig {
    pub services: Vec<ProviderConfig>,
    pub enabled_services: Vec<ServiceId>,
    pub fallback_order: Vec<ServiceId>,
    pub default_service: ServiceId,
    #[serde(default)]
    pub circuit_breaker_options: CircuitBreakerOptions,
}

impl ServiceManagerConfig {
    /// Create a configuration with every listed service enabled and the
    /// first one as the default.
    pub fn new(services: Vec<ProviderConfig>) -> Result<Self, RelaisError> {
        let enabled: Vec<ServiceId> = services.iter().map(|s| s.service_id).collect();
        let default_service = *enabled
            .first()
            .ok_or_else(|| RelaisError::configuration("at least one service is required"))?;
        let config = Self {
            services,
            fallback_order: enabled.clone(),
            enabled_services: enabled,
            default_service,
            circuit_breaker_options: CircuitBreakerOptions::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from its JSON representation
    pub fn from_json_str(json: &str) -> Result<Self, RelaisError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set which services are enabled
    pub fn with_enabled_services(mut self, enabled: Vec<ServiceId>) -> Self {
        self.enabled_services = enabled;
        self
    }

    /// Set the fallback order tried after the default service
    pub fn with_fallback_order(mut self, order: Vec<ServiceId>) -> Self {
        self.fallback_order = order;
        self
    }

    /// Set the default first-choice service
    pub fn with_default_service(mut self, default_service: ServiceId) -> Self {
        self.default_service = default_service;
        self
    }

    /// Set circuit breaker tuning
    pub fn with_circuit_breaker_options(mut self, options: CircuitBreakerOptions) -> Self {
        self.circuit_breaker_options = options;
        self
    }

    /// Look up the connection settings for a service
    pub fn provider_config(&self, id: ServiceId) -> Option<&ProviderConfig> {
        self.services.iter().find(|s| s.service_id == id)
    }

    /// Enforce the structural invariants:
    /// `enabled ⊆ configured`, `fallback ⊆ enabled`, `default ∈ enabled`.
    pub fn validate(&self) -> Result<(), RelaisError> {
        for id in &self.enabled_services {
            if self.provider_config(*id).is_none() {
                return Err(RelaisError::configuration(format!(
                    "enabled service {id} has no provider configuration"
                )));
            }
        }
        for id in &self.fallback_order {
            if !self.enabled_services.contains(id) {
                return Err(RelaisError::configuration(format!(
                    "fallback service {id} is not enabled"
                )));
            }
        }
        if !self.enabled_services.contains(&self.default_service) {
            return Err(RelaisError::configuration(format!(
                "default service {} is not enabled",
                self.default_service
            )));
        }
        Ok(())
    }

    /// Merge a partial update into this configuration, returning the merged
    /// result after re-validating the invariants.
    pub fn merged(&self, patch: ServiceManagerConfigPatch) -> Result<Self, RelaisError> {
        let mut next = self.clone();
        if let Some(services) = patch.services {
            // Replace or append per service id, keep untouched entries.
            for incoming in services {
                match next
                    .services
                    .iter_mut()
                    .find(|s| s.service_id == incoming.service_id)
                {
                    Some(existing) => *existing = incoming,
                    None => next.services.push(incoming),
                }
            }
        }
        if let Some(enabled) = patch.enabled_services {
            next.enabled_services = enabled;
        }
        if let Some(order) = patch.fallback_order {
            next.fallback_order = order;
        }
        if let Some(default_service) = patch.default_service {
            next.default_service = default_service;
        }
        if let Some(options) = patch.circuit_breaker_options {
            next.circuit_breaker_options = options;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial configuration accepted by
/// [`ServiceManager::update_configuration`]; absent fields keep their
/// current value.
///
/// [`ServiceManager::update_configuration`]: crate::manager::ServiceManager::update_configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceManagerConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<ProviderConfig>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_services: Option<Vec<ServiceId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_order: Option<Vec<ServiceId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_service: Option<ServiceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker_options: Option<CircuitBreakerOptions>,
}

impl ServiceManagerConfigPatch {
    /// Patch the enabled service set
    pub fn enabled_services(enabled: Vec<ServiceId>) -> Self {
        Self {
            enabled_services: Some(enabled),
            ..Default::default()
        }
    }
}

/// Durations serialized as integer milliseconds on the wire.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
