//! # Relais Core
//!
//! Core abstractions and orchestration for resilient multi-provider AI
//! analysis.
//!
//! This crate provides the foundational traits and types for routing
//! analysis requests across interchangeable AI providers, with per-provider
//! circuit breakers, fallback chains, and manager-level metrics.

pub mod breaker;
pub mod config;
pub mod error;
pub mod layer;
pub mod manager;
pub mod metrics;
pub mod provider;
pub mod registry;
pub mod types;

// Re-exports
pub use breaker::{BreakerState, CircuitBreaker};
pub use config::{
    CircuitBreakerOptions, ProviderConfig, ServiceManagerConfig, ServiceManagerConfigPatch,
};
pub use error::RelaisError;
pub use layer::{Layer, LayeredProvider};
pub use manager::ServiceManager;
pub use metrics::MetricsCollector;
pub use provider::{AnalysisProvider, ProviderFactory};
pub use registry::ServiceRegistry;
pub use types::*;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, RelaisError>;
