//! Adapter layer for logpilot-model and logpilot-utils.
//!
//! - Error conversion from `ModelError` to `PilotError`
//! - `GenerationService` for [`ChatClient`]
//! - `WebSearcher` for [`WebSearchClient`]

use logpilot_model::{ChatClient, ModelError, ModelTier};
use logpilot_utils::{SearchResult, WebSearchClient};

use crate::collaborators::{GenerationService, WebSearcher};
use crate::errors::PilotError;

// ============================================================================
// Error Conversion
// ============================================================================

/// Convert a logpilot-model error to a logpilot-core error.
pub fn from_model_error(err: ModelError) -> PilotError {
    match err {
        ModelError::InputTooLong { tokens, max } => PilotError::PromptTooLong { tokens, max },
        ModelError::InvalidConfig { message } => PilotError::InvalidConfig(message),
        ModelError::Json(json_err) => PilotError::generation(format!("bad JSON: {}", json_err)),
        err @ (ModelError::Request { .. }
        | ModelError::Http { .. }
        | ModelError::InvalidResponse { .. }) => PilotError::generation(err.to_string()),
    }
}

// ============================================================================
// Trait implementations
// ============================================================================

impl GenerationService for ChatClient {
    fn generate(&self, prompt: &str, tier: ModelTier) -> Result<String, PilotError> {
        ChatClient::generate(self, prompt, tier).map_err(from_model_error)
    }
}

impl WebSearcher for WebSearchClient {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, PilotError> {
        WebSearchClient::search(self, query, max_results)
            .map_err(|e| PilotError::WebSearch(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpilot_model::ChatConfig;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            from_model_error(ModelError::InputTooLong {
                tokens: 9000,
                max: 4096
            }),
            PilotError::PromptTooLong {
                tokens: 9000,
                max: 4096
            }
        ));
        assert!(matches!(
            from_model_error(ModelError::request("http://x/chat/completions", "timed out")),
            PilotError::Generation { .. }
        ));
    }

    #[test]
    fn test_prompt_guard_surfaces_as_pilot_error() {
        let config = ChatConfig {
            max_input_tokens: 4,
            ..ChatConfig::default()
        };
        let client = ChatClient::new(config).unwrap();
        let service: &dyn GenerationService = &client;
        let err = service
            .generate(&"word ".repeat(100), ModelTier::Fast)
            .unwrap_err();
        assert!(matches!(err, PilotError::PromptTooLong { .. }));
    }
}
