//! # logpilot-model
//!
//! Inference layer for LogPilot: text generation and embeddings.
//!
//! Both clients speak the OpenAI-compatible HTTP API, so a local Ollama server
//! and hosted providers are interchangeable through configuration.
//!
//! ## Design Principles
//!
//! 1. **Production-only**: no mock implementations. Test doubles live in consuming crates.
//! 2. **Bounded calls**: every request carries a timeout, and prompts over the
//!    input budget are rejected before they are sent.
//! 3. **Tiered models**: callers ask for `fast` or `smart`; the registry maps
//!    tiers to provider model names.
//!
//! ## Usage
//!
//! ```ignore
//! use logpilot_model::{ChatClient, ChatConfig, ModelTier};
//!
//! let client = ChatClient::new(ChatConfig::default())?;
//! let text = client.generate("Classify: count errors", ModelTier::Fast)?;
//! ```

pub mod chat;
pub mod config;
pub mod embedding;
pub mod error;
pub mod tokens;

pub use chat::ChatClient;
pub use config::{
    ChatConfig, EmbeddingConfig, ModelTier, DEFAULT_API_BASE, DEFAULT_CHAT_MODEL,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_MAX_INPUT_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT,
};
pub use embedding::HttpEmbeddingModel;
pub use error::{ModelError, ModelResult};
pub use tokens::{count_tokens, estimate_tokens};

use serde::Serialize;

// ============================================================================
// Embedding Model Trait
// ============================================================================

/// Trait for embedding models.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow use across threads.
pub trait EmbeddingModel: Send + Sync + std::fmt::Debug {
    /// Generate embeddings for a batch of texts, one vector per input.
    fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>>;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> ModelResult<Vec<f32>> {
        self.embed(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::invalid_response(self.model_id(), "no embedding returned"))
    }

    /// Get the model ID.
    fn model_id(&self) -> &str;
}

// ============================================================================
// Health
// ============================================================================

/// Provider readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ready,
    Error,
}

/// Result of a provider health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
