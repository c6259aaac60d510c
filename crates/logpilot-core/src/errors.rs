//! Error types for logpilot-core.

use thiserror::Error;

/// Domain-specific errors for LogPilot operations.
#[derive(Error, Debug)]
pub enum PilotError {
    /// Configuration file exists but cannot be read or parsed.
    #[error("Config invalid: {0}")]
    InvalidConfig(String),

    /// A configuration value is invalid.
    ///
    /// Used for validation errors detected after parsing (e.g., retrievalTopK=0).
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// Invalid argument provided to an operation.
    #[error("{0}")]
    InvalidArgument(String),

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// The generation service failed (transport, timeout, malformed output).
    #[error("Generation failed: {message}")]
    Generation {
        /// Description of the failure.
        message: String,
    },

    /// The prompt was rejected by the token guard before any request.
    #[error("Prompt too long: ~{tokens} tokens, limit is {max}")]
    PromptTooLong {
        /// Estimated prompt size.
        tokens: usize,
        /// Configured input budget.
        max: usize,
    },

    /// The structured query engine rejected or failed a statement.
    #[error("Query failed: {message}")]
    Query {
        /// Engine error text.
        message: String,
    },

    /// The knowledge retriever failed.
    #[error("Retrieval failed: {message}")]
    Retrieval {
        /// Description of the failure.
        message: String,
    },

    /// The conversation store failed.
    #[error("Conversation store error: {message}")]
    Conversation {
        /// Description of the failure.
        message: String,
    },

    /// Web search failed.
    #[error("Web search failed: {0}")]
    WebSearch(String),

    /// Writing a shadow evaluation row failed.
    #[error("Shadow sink error: {0}")]
    ShadowSink(String),

    // =========================================================================
    // Orchestration Errors
    // =========================================================================
    /// The state machine visited more nodes than its hard ceiling allows.
    #[error("Node visit limit of {limit} exceeded (last node: {last_node})")]
    NodeLimitExceeded {
        /// Configured ceiling.
        limit: usize,
        /// The node that would have been visited next.
        last_node: String,
    },

    /// A node panicked while handling a request.
    #[error("Request execution panicked: {0}")]
    Panicked(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A wrapped generic error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PilotError {
    /// Create a generation error.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create a retrieval error.
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval {
            message: message.into(),
        }
    }

    /// Create a conversation store error.
    pub fn conversation(message: impl Into<String>) -> Self {
        Self::Conversation {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
            hint: hint.into(),
        }
    }
}
