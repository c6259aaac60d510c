//! Query rewriter: turns a follow-up into a standalone question.

use tracing::{debug, warn};

use super::NodeContext;
use crate::collaborators::ModelTier;
use crate::prompts;
use crate::types::RequestState;

/// Preambles models prepend to the rewritten question.
const PREAMBLES: &[&str] = &["Here is the rewritten query:", "Rewritten query:", "Query:"];

pub fn rewrite_query(ctx: &NodeContext<'_>, state: &mut RequestState) {
    if state.history.is_empty() {
        debug!("rewrite: no history, keeping query verbatim");
        state.rewritten_query = Some(state.query().to_string());
        return;
    }

    let prompt = prompts::rewrite_prompt(
        state.query(),
        &state.history,
        state.context_feedback.as_deref(),
    );
    let rewritten = match ctx.generator.generate(&prompt, ModelTier::Fast) {
        Ok(text) => {
            let cleaned = strip_preambles(&text);
            if cleaned.is_empty() {
                warn!("rewrite: empty rewrite, keeping original query");
                state.query().to_string()
            } else {
                cleaned
            }
        }
        Err(e) => {
            warn!("rewrite: generation failed, keeping original query: {}", e);
            state.query().to_string()
        }
    };
    debug!("rewrite: {}", rewritten);
    state.rewritten_query = Some(rewritten);
}

/// Remove known preambles (case-insensitive) from a generated rewrite.
pub fn strip_preambles(text: &str) -> String {
    let mut rest = text.trim();
    for preamble in PREAMBLES {
        let matches = rest
            .get(..preamble.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(preamble));
        if matches {
            rest = rest[preamble.len()..].trim();
        }
    }
    rest.to_string()
}
