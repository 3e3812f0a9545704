//! # Relais Layers
//!
//! Built-in layers for relais providers.
//!
//! Currently implemented layers:
//! - `LoggingLayer`: Logs all provider operations with timing information
//! - `RetryLayer`: Automatic retry with exponential backoff for retryable errors
//!
//! ## Usage
//!
//! ```ignore
//! use relais_core::layer::Layer;
//! use relais_layer::{LoggingLayer, RetryLayer};
//!
//! let provider = LoggingLayer::new()
//!     .layer(RetryLayer::new().with_max_retries(3).layer(client));
//! ```

pub mod logging;
pub mod retry;

// Re-exports
pub use logging::{LoggingLayer, LoggingProvider};
pub use retry::{RetryLayer, RetryProvider};
