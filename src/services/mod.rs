//! External collaborators
//!
//! The pipeline talks to three rate-limited services, each behind a narrow
//! async trait:
//! - [`DocumentUnderstanding`] turns one image (already within the size
//!   ceilings) into text
//! - [`TextQuality`] rewrites text for readability, best effort
//! - [`MatchScorer`] scores a batch of records against a profile
//!
//! Concrete HTTP/JSON adapters live in [`remote`].

pub mod remote;

pub use remote::{HttpDocumentUnderstanding, HttpMatchScorer, HttpTextQuality, ServiceClient};

use crate::retry::RetryError;
use crate::scoring::MatchResult;
use crate::storage::DetailRecord;
use crate::HarvestError;
use async_trait::async_trait;
use thiserror::Error;

/// Failure of an external service call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("rate limited")]
    RateLimited,

    #[error("service unavailable (status {status})")]
    Unavailable { status: u16 },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Rate-limit and 5xx-class signals are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Unavailable { .. } | Self::Transient(_)
        )
    }
}

impl ServiceError {
    /// Converts into a pipeline error attributed to `service`
    pub fn into_harvest_error(self, service: &str) -> HarvestError {
        let service = service.to_string();
        match self {
            ServiceError::RateLimited => HarvestError::RateLimited { service },
            ServiceError::Unavailable { status } => HarvestError::ServiceUnavailable {
                service,
                message: format!("status {}", status),
            },
            ServiceError::Transient(message) => {
                HarvestError::ServiceUnavailable { service, message }
            }
            ServiceError::Rejected { status, message } => HarvestError::ServiceRejected {
                service,
                message: format!("status {}: {}", status, message),
            },
            ServiceError::Malformed(message) => HarvestError::ServiceRejected {
                service,
                message: format!("malformed response: {}", message),
            },
        }
    }
}

impl RetryError<ServiceError> {
    /// Converts into a pipeline error attributed to `service`
    pub fn into_harvest_error(self, service: &str) -> HarvestError {
        match self {
            RetryError::Rejected(e) => e.into_harvest_error(service),
            RetryError::Exhausted {
                operation,
                attempts,
                last,
            } => HarvestError::RetriesExhausted {
                operation,
                attempts,
                last: format!("{}: {}", service, last),
            },
        }
    }
}

/// Encoded image handed to the document understanding service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            mime_type: "image/png".to_string(),
            bytes,
        }
    }
}

/// Extracts text from a single image
#[async_trait]
pub trait DocumentUnderstanding: Send + Sync {
    async fn ocr(&self, image: &ImagePayload) -> Result<String, ServiceError>;
}

/// Rewrites text for readability
#[async_trait]
pub trait TextQuality: Send + Sync {
    async fn rewrite(&self, text: &str) -> Result<String, ServiceError>;
}

/// Scores records against a profile
///
/// The rubric lives entirely behind this interface.
#[async_trait]
pub trait MatchScorer: Send + Sync {
    async fn score(
        &self,
        profile: &str,
        batch: &[DetailRecord],
    ) -> Result<Vec<MatchResult>, ServiceError>;
}
