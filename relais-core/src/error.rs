//! Error types for relais operations.

use crate::types::ServiceId;

/// The main error type for analysis orchestration.
#[derive(Debug, thiserror::Error)]
pub enum RelaisError {
    /// Malformed caller input (missing content, empty service list, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configured service has no known client implementation
    #[error("Unsupported service type: {0}")]
    UnsupportedServiceType(String),

    /// A service id that is not currently registered
    #[error("Service not found: {0}")]
    ServiceNotFound(ServiceId),

    /// A single provider call failed
    #[error("Provider error ({service}): {message}")]
    Provider { service: ServiceId, message: String },

    /// Fast-fail produced by an open circuit breaker
    #[error("Circuit breaker open for service: {0}")]
    CircuitOpen(ServiceId),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Rate limit errors
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Request timeout errors
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Every candidate in the fallback chain failed
    #[error("All AI services failed: {}", format_failures(failures))]
    AllServicesFailed { failures: Vec<(ServiceId, String)> },
}

fn format_failures(failures: &[(ServiceId, String)]) -> String {
    if failures.is_empty() {
        return "no services were available".to_string();
    }
    failures
        .iter()
        .map(|(id, msg)| format!("{id}: {msg}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl RelaisError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a provider error
    pub fn provider(service: ServiceId, message: impl Into<String>) -> Self {
        Self::Provider {
            service,
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limit(msg: impl Into<String>) -> Self {
        Self::RateLimit(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelaisError::Network(_) | RelaisError::Timeout(_) | RelaisError::RateLimit(_)
        )
    }

    /// Per-service failures carried by an [`RelaisError::AllServicesFailed`]
    pub fn failures(&self) -> &[(ServiceId, String)] {
        match self {
            RelaisError::AllServicesFailed { failures } => failures,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_error_enumerates_every_failure() {
        let err = RelaisError::AllServicesFailed {
            failures: vec![
                (ServiceId::Gpt4, "connection refused".to_string()),
                (ServiceId::Claude, "429 too many requests".to_string()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("All AI services failed"));
        assert!(msg.contains("gpt4: connection refused"));
        assert!(msg.contains("claude: 429 too many requests"));
    }

    #[test]
    fn retryable_classification() {
        assert!(RelaisError::timeout("deadline exceeded").is_retryable());
        assert!(RelaisError::rate_limit("slow down").is_retryable());
        assert!(!RelaisError::validation("missing content").is_retryable());
        assert!(!RelaisError::CircuitOpen(ServiceId::Gemini).is_retryable());
    }
}
