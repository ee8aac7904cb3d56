//! Provisioning errors

use crate::api::ApiError;
use crate::validate::ValidationError;
use std::time::Duration;
use thiserror::Error;

/// Why a provisioning request ended without a config
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Activation failed: {0}")]
    ActivationFailed(String),

    #[error("Required data missing: {0}")]
    DataMissing(#[from] ValidationError),

    #[error("Failed to parse {stage} response: {detail}")]
    ResponseParseFailed { stage: &'static str, detail: String },

    #[error("Provisioning timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl ProvisionError {
    /// Stable name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ProvisionError::MethodNotAllowed => "method_not_allowed",
            ProvisionError::RegistrationFailed(_) => "registration_failed",
            ProvisionError::ActivationFailed(_) => "activation_failed",
            ProvisionError::DataMissing(_) => "data_missing",
            ProvisionError::ResponseParseFailed { .. } => "response_parse_failed",
            ProvisionError::Timeout(_) => "timeout",
        }
    }

    /// Map a failed register call
    pub fn registration(err: ApiError) -> Self {
        match err {
            ApiError::Parse(detail) => ProvisionError::ResponseParseFailed { stage: "registration", detail },
            other => ProvisionError::RegistrationFailed(other.to_string()),
        }
    }

    /// Map a failed activate call
    pub fn activation(err: ApiError) -> Self {
        match err {
            ApiError::Parse(detail) => ProvisionError::ResponseParseFailed { stage: "activation", detail },
            other => ProvisionError::ActivationFailed(other.to_string()),
        }
    }
}
