//! Answer synthesis and answer validation.

use tracing::{debug, info, warn};

use super::NodeContext;
use crate::collaborators::ModelTier;
use crate::judge::parse_verdict;
use crate::prompts;
use crate::shadow::ShadowJob;
use crate::types::{Intent, RequestState};

const AMBIGUOUS_CONTEXT: &str = "Ambiguous intent. No data source was consulted; \
                                 answer conversationally or ask the user to clarify.";

/// Answer the user's original question from the context of the path taken.
pub fn synthesize_answer(ctx: &NodeContext<'_>, state: &mut RequestState) {
    let context = path_context(state);
    let feedback = match state.answer_valid {
        Some(false) => state.answer_feedback.as_deref(),
        _ => None,
    };
    let prompt =
        prompts::synthesize_prompt(state.query(), &context, &state.history, feedback);

    match ctx.generator.generate(&prompt, ModelTier::Smart) {
        Ok(answer) => {
            debug!("synthesize: {} chars", answer.len());
            state.final_answer = Some(answer.trim().to_string());
        }
        Err(e) => {
            // An earlier attempt's answer stays as the best available one.
            warn!("synthesize: generation failed: {}", e);
            state.answer_feedback = Some(format!("answer generation failed: {}", e));
        }
    }

    if let Some(shadow) = ctx.shadow {
        shadow.submit(ShadowJob {
            prompt,
            query: state.query().to_string(),
        });
    }
}

pub fn validate_answer(ctx: &NodeContext<'_>, state: &mut RequestState) {
    let Some(answer) = state.final_answer.clone() else {
        state.answer_valid = Some(false);
        state.answer_feedback = Some("no answer was generated".to_string());
        return;
    };

    let prompt = prompts::validate_answer_prompt(state.query(), &answer);
    let verdict = ctx
        .generator
        .generate(&prompt, ModelTier::Fast)
        .map_err(|e| e.to_string())
        .and_then(|text| parse_verdict(&text).map_err(|e| e.to_string()));

    match verdict {
        Ok(verdict) => {
            info!("validate: answer {}", if verdict.valid { "accepted" } else { "rejected" });
            state.answer_valid = Some(verdict.valid);
            state.answer_feedback = Some(verdict.feedback);
        }
        Err(e) => {
            warn!("validate: judge unusable, accepting answer: {}", e);
            state.answer_valid = Some(true);
            state.answer_feedback = None;
        }
    }
}

/// The context block the synthesizer sees for the path that was taken.
pub fn path_context(state: &RequestState) -> String {
    match state.intent {
        Intent::Sql => {
            let sql = state.sql_query.as_deref().unwrap_or("(none)");
            match (&state.sql_error, &state.sql_result) {
                (Some(error), _) => format!("SQL: {}\nSQL Error: {}", sql, error),
                (None, Some(result)) => format!("SQL: {}\nResult: {}", sql, result),
                (None, None) => format!("SQL: {}\nResult: (not executed)", sql),
            }
        }
        Intent::Rag => {
            let mut context = format!(
                "Retrieved Context:\n{}",
                state.rag_context.as_deref().unwrap_or_default()
            );
            if state.context_valid == Some(false) {
                context.push_str(
                    "\n\nNote: this context was judged insufficient for the question. \
                     Say what is missing rather than guessing.",
                );
            }
            context
        }
        Intent::WebSearch => match &state.web_results {
            Some(results) => format!("Web Search Results:\n{}", results),
            None => AMBIGUOUS_CONTEXT.to_string(),
        },
        Intent::Ambiguous => AMBIGUOUS_CONTEXT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::testing::{context, FakeEngine, FakeRetriever, ScriptedGenerator};

    fn fakes() -> (FakeEngine, FakeRetriever, OrchestratorConfig) {
        (
            FakeEngine::default(),
            FakeRetriever::default(),
            OrchestratorConfig::default(),
        )
    }

    #[test]
    fn test_sql_context_prefers_error() {
        let mut state = RequestState::new("count errors", Vec::new());
        state.intent = Intent::Sql;
        state.sql_query = Some("SELECT COUNT(*) FROM logs".into());
        state.sql_result = Some("[(100,)]".into());
        assert_eq!(
            path_context(&state),
            "SQL: SELECT COUNT(*) FROM logs\nResult: [(100,)]"
        );

        state.sql_error = Some("no such table: log".into());
        assert!(path_context(&state).contains("SQL Error: no such table: log"));
    }

    #[test]
    fn test_web_without_results_reads_as_ambiguous() {
        let mut state = RequestState::new("what is 429", Vec::new());
        state.intent = Intent::WebSearch;
        assert_eq!(path_context(&state), AMBIGUOUS_CONTEXT);
        state.web_results = Some("1. Too Many Requests".into());
        assert!(path_context(&state).starts_with("Web Search Results:\n"));
    }

    #[test]
    fn test_rag_context_flags_invalid() {
        let mut state = RequestState::new("why", Vec::new());
        state.intent = Intent::Rag;
        state.rag_context = Some("Documentation:\nx".into());
        state.context_valid = Some(true);
        assert!(!path_context(&state).contains("insufficient"));
        state.context_valid = Some(false);
        assert!(path_context(&state).contains("insufficient"));
    }

    #[test]
    fn test_synthesize_passes_feedback_on_retry() {
        let generator = ScriptedGenerator::ok(&["first", "second"]);
        let (engine, retriever, config) = fakes();
        let ctx = context(&generator, &engine, &retriever, &config);

        let mut state = RequestState::new("q", Vec::new());
        synthesize_answer(&ctx, &mut state);
        assert_eq!(state.final_answer.as_deref(), Some("first"));

        state.answer_valid = Some(false);
        state.answer_feedback = Some("be specific".into());
        synthesize_answer(&ctx, &mut state);
        assert_eq!(state.final_answer.as_deref(), Some("second"));

        let prompts = generator.prompts();
        assert!(!prompts[0].contains("be specific"));
        assert!(prompts[1].contains("be specific"));
    }

    #[test]
    fn test_synthesize_failure_keeps_previous_answer() {
        let generator = ScriptedGenerator::new(vec![Err("model offline")]);
        let (engine, retriever, config) = fakes();
        let ctx = context(&generator, &engine, &retriever, &config);

        let mut state = RequestState::new("q", Vec::new());
        state.final_answer = Some("I don't know".into());
        synthesize_answer(&ctx, &mut state);
        assert_eq!(state.final_answer.as_deref(), Some("I don't know"));
        assert!(state
            .answer_feedback
            .as_deref()
            .is_some_and(|f| f.contains("model offline")));
    }

    #[test]
    fn test_synthesize_failure_without_prior_answer_leaves_none() {
        let generator = ScriptedGenerator::new(vec![Err("model offline")]);
        let (engine, retriever, config) = fakes();
        let ctx = context(&generator, &engine, &retriever, &config);

        let mut state = RequestState::new("q", Vec::new());
        synthesize_answer(&ctx, &mut state);
        assert_eq!(state.final_answer, None);
    }

    #[test]
    fn test_validate_fails_open() {
        let generator = ScriptedGenerator::new(vec![
            Ok("not json at all"),
            Err("timeout"),
            Ok(r#"{"valid": false, "feedback": "too vague"}"#),
        ]);
        let (engine, retriever, config) = fakes();
        let ctx = context(&generator, &engine, &retriever, &config);

        let mut state = RequestState::new("q", Vec::new());
        state.final_answer = Some("I don't know".into());

        validate_answer(&ctx, &mut state);
        assert_eq!(state.answer_valid, Some(true));
        validate_answer(&ctx, &mut state);
        assert_eq!(state.answer_valid, Some(true));
        validate_answer(&ctx, &mut state);
        assert_eq!(state.answer_valid, Some(false));
        assert_eq!(state.answer_feedback.as_deref(), Some("too vague"));
    }

    #[test]
    fn test_validate_missing_answer_without_judge() {
        let generator = ScriptedGenerator::default();
        let (engine, retriever, config) = fakes();
        let ctx = context(&generator, &engine, &retriever, &config);

        let mut state = RequestState::new("q", Vec::new());
        validate_answer(&ctx, &mut state);
        assert_eq!(state.answer_valid, Some(false));
        assert_eq!(generator.calls(), 0);
    }
}
