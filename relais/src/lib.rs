//! # Relais
//!
//! Resilient multi-provider AI analysis orchestration.
//!
//! Relais routes each analysis request across a configurable set of
//! interchangeable AI providers (OpenAI, Anthropic, Gemini), transparently
//! substituting a healthy provider when the preferred or default one is
//! failing, degraded, or over its error budget.
//!
//! ## Features
//!
//! - **Fallback chains**: preferred service first, then the default, then
//!   the configured fallback order, until one succeeds
//! - **Circuit breakers**: per-provider three-state breakers with a rolling
//!   failure-rate window and hard per-call timeouts
//! - **Metrics**: authoritative per-service counters updated on every
//!   dispatch attempt
//! - **Composable layers**: logging and retry middleware around each client
//! - **Factory injection**: providers are constructed through a pluggable
//!   factory, so test doubles come in through the public contract
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use relais::{ProviderConfig, ServiceId, ServiceManager, ServiceManagerConfig};
//! use relais::provider::DefaultProviderFactory;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceManagerConfig::new(vec![
//!     ProviderConfig::new(ServiceId::Gpt4, std::env::var("OPENAI_API_KEY")?),
//!     ProviderConfig::new(ServiceId::Claude, std::env::var("ANTHROPIC_API_KEY")?),
//! ])?;
//!
//! let manager = ServiceManager::new(config, Arc::new(DefaultProviderFactory::new()))?;
//! manager.initialize().await?;
//!
//! let response = manager
//!     .analyze_content("What is Rust?", "text/plain", None)
//!     .await?;
//! println!("{} said: {}", response.metadata.service_id, response.content);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Includes `providers` and `layers`
//! - `providers`: Built-in provider clients (OpenAI, Anthropic, Gemini)
//! - `layers`: Built-in layers (logging, retry)
//! - `full`: All features enabled

// Re-export core types and traits
pub use relais_core::*;

// Re-export providers under `provider` module
#[cfg(feature = "relais-provider")]
pub mod provider {
    //! AI provider client implementations.
    pub use relais_provider::*;
}

// Re-export layers under `layer` module
#[cfg(feature = "relais-layer")]
pub mod layer {
    //! Built-in middleware layers.
    pub use relais_layer::*;
}

// Convenience re-exports at root level for common types
pub use relais_core::{
    config::{CircuitBreakerOptions, ProviderConfig, ServiceManagerConfig, ServiceManagerConfigPatch},
    error::RelaisError,
    manager::ServiceManager,
    provider::{AnalysisProvider, ProviderFactory},
    types::{AnalysisRequest, AnalysisResponse, ServiceId, ServiceMetrics},
};
