//! Error types for logpilot-model.
//!
//! Errors name the endpoint or model involved so a failed generation call can
//! be diagnosed from a single log line.

use thiserror::Error;

/// Result type alias for logpilot-model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur in logpilot-model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    // ========================================================================
    // Transport errors
    // ========================================================================
    /// The HTTP request could not be sent or timed out.
    #[error("Request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    /// The server answered with a non-success status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    // ========================================================================
    // Response errors
    // ========================================================================
    /// The response body did not have the expected shape.
    #[error("Invalid response from model '{model}': {message}")]
    InvalidResponse { model: String, message: String },

    // ========================================================================
    // Guard errors
    // ========================================================================
    /// The prompt exceeds the configured input budget.
    #[error("Input too long ({tokens} tokens). Max allowed: {max}.")]
    InputTooLong { tokens: usize, max: usize },

    /// Client configuration is unusable.
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error constructors
// ============================================================================

impl ModelError {
    /// Create a request error.
    pub fn request(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether the failure was a timeout or connection problem.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request { .. })
    }
}
