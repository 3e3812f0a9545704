//! Core types for analysis orchestration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RelaisError;

/// Identifier of a known analysis provider.
///
/// A closed set: configuration naming anything else is rejected when it is
/// parsed, so an unknown service id can never reach the dispatch path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ServiceId {
    Gpt4,
    Claude,
    Gemini,
}

impl ServiceId {
    /// All known service ids
    pub const ALL: [ServiceId; 3] = [ServiceId::Gpt4, ServiceId::Claude, ServiceId::Gemini];

    /// The wire name used in configuration and response metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::Gpt4 => "gpt4",
            ServiceId::Claude => "claude",
            ServiceId::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceId {
    type Err = RelaisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gpt4" => Ok(ServiceId::Gpt4),
            "claude" => Ok(ServiceId::Claude),
            "gemini" => Ok(ServiceId::Gemini),
            other => Err(RelaisError::UnsupportedServiceType(other.to_string())),
        }
    }
}

/// One content-analysis request, created and discarded per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub content: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_service: Option<ServiceId>,
}

impl AnalysisRequest {
    /// Create a new analysis request
    pub fn new(content: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: content_type.into(),
            preferred_service: None,
        }
    }

    /// Route this request to a preferred service first
    pub fn with_preferred_service(mut self, service: ServiceId) -> Self {
        self.preferred_service = Some(service);
        self
    }

    /// Reject requests the orchestrator cannot route
    pub fn validate(&self) -> Result<(), RelaisError> {
        if self.content.trim().is_empty() {
            return Err(RelaisError::validation("content must not be empty"));
        }
        if self.content_type.trim().is_empty() {
            return Err(RelaisError::validation("content_type must not be empty"));
        }
        Ok(())
    }
}

/// Metadata describing which backend produced a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub service_id: ServiceId,
    pub model: String,
    pub request_id: String,
}

/// Result of a single analysis, returned to the caller and not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub content: String,
    /// Provider-reported confidence in `[0.0, 1.0]`
    pub confidence: f64,
    /// Wall-clock time the provider call took
    pub processing_time: Duration,
    pub metadata: ResponseMetadata,
}

impl AnalysisResponse {
    /// Create a successful response
    pub fn new(
        service_id: ServiceId,
        model: impl Into<String>,
        content: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            success: true,
            content: content.into(),
            confidence: confidence.clamp(0.0, 1.0),
            processing_time: Duration::ZERO,
            metadata: ResponseMetadata {
                service_id,
                model: model.into(),
                request_id: uuid::Uuid::new_v4().to_string(),
            },
        }
    }

    /// Stamp the measured call latency onto the response
    pub fn with_processing_time(mut self, elapsed: Duration) -> Self {
        self.processing_time = elapsed;
        self
    }
}

/// Manager-level counters for one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub service_id: ServiceId,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Running mean over successful calls
    pub average_response_time: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_time: Option<std::time::SystemTime>,
    pub is_healthy: bool,
}

impl ServiceMetrics {
    /// Zeroed counters for a freshly registered service
    pub fn zeroed(service_id: ServiceId) -> Self {
        Self {
            service_id,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            average_response_time: Duration::ZERO,
            last_request_time: None,
            is_healthy: true,
        }
    }
}

/// Provider information
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub id: ServiceId,
    pub name: String,
    pub model: String,
}
