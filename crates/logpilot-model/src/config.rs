//! Client configuration and the fast/smart model registry.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default OpenAI-compatible endpoint (a local Ollama server).
pub const DEFAULT_API_BASE: &str = "http://localhost:11434/v1";

/// Default chat model for both tiers.
pub const DEFAULT_CHAT_MODEL: &str = "llama3";

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default input budget in tokens.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 4096;

// ============================================================================
// ModelTier
// ============================================================================

/// Which class of model a call needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Low-latency model for routing, judging and rewriting.
    #[default]
    Fast,
    /// Stronger model for harder reasoning.
    Smart,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Smart => write!(f, "smart"),
        }
    }
}

impl FromStr for ModelTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "smart" | "reasoning" => Ok(Self::Smart),
            _ => Err(format!("Unknown model tier: '{}'. Use 'fast' or 'smart'.", s)),
        }
    }
}

// ============================================================================
// ChatConfig
// ============================================================================

/// Everything the chat client needs to reach a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Base URL ending before `/chat/completions`.
    pub api_base: String,
    /// Bearer token, if the provider needs one.
    pub api_key: Option<String>,
    /// Model name used for [`ModelTier::Fast`].
    pub fast_model: String,
    /// Model name used for [`ModelTier::Smart`].
    pub smart_model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_input_tokens: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            fast_model: DEFAULT_CHAT_MODEL.to_string(),
            smart_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
        }
    }
}

impl ChatConfig {
    /// Resolve the provider model name for a tier.
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast_model,
            ModelTier::Smart => &self.smart_model,
        }
    }

    /// A copy of this config that routes every tier to `model`.
    ///
    /// Used to build the shadow-evaluation client.
    pub fn pinned_to(&self, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            fast_model: model.clone(),
            smart_model: model,
            ..self.clone()
        }
    }
}

// ============================================================================
// EmbeddingConfig
// ============================================================================

/// Configuration for the HTTP embedding client.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn endpoint(api_base: &str, path: &str) -> String {
    format!("{}/{}", api_base.trim_end_matches('/'), path.trim_start_matches('/'))
}
