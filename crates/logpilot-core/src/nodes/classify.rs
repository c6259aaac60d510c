//! Intent classifier. Anything unclear routes to `ambiguous`.

use serde::Deserialize;
use tracing::{debug, warn};

use super::NodeContext;
use crate::collaborators::ModelTier;
use crate::judge::extract_json_object;
use crate::prompts;
use crate::types::{Intent, RequestState};

#[derive(Debug, Deserialize)]
struct ClassifierReply {
    intent: String,
    #[serde(default)]
    reasoning: String,
}

pub fn classify_intent(ctx: &NodeContext<'_>, state: &mut RequestState) {
    let prompt = prompts::classify_prompt(state.effective_query());
    state.intent = match ctx.generator.generate(&prompt, ModelTier::Fast) {
        Ok(text) => parse_intent(&text),
        Err(e) => {
            warn!("classify: generation failed, routing as ambiguous: {}", e);
            Intent::Ambiguous
        }
    };
    debug!("classify: {}", state.intent);
}

/// Structured reply first, raw text as the label otherwise.
pub fn parse_intent(text: &str) -> Intent {
    let structured = extract_json_object(text)
        .and_then(|object| serde_json::from_str::<ClassifierReply>(object).ok());
    let label = match structured {
        Some(reply) => {
            debug!("classify: reasoning: {}", reply.reasoning);
            reply.intent
        }
        None => text.to_string(),
    };
    normalize_label(&label).parse().unwrap_or_default()
}

fn normalize_label(label: &str) -> String {
    label
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.'))
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_")
}
