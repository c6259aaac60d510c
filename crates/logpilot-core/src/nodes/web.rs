//! Web search node.

use tracing::{debug, warn};

use logpilot_utils::format_results;

use super::NodeContext;
use crate::types::RequestState;

pub const NO_WEB_RESULTS: &str = "No web search results found.";

pub fn web_search(ctx: &NodeContext<'_>, state: &mut RequestState) {
    let Some(searcher) = ctx.web_searcher else {
        // Routing never reaches this node without a searcher.
        state.web_results = None;
        return;
    };

    let query = state.effective_query().to_string();
    let results = match searcher.search(&query, ctx.web_max_results) {
        Ok(results) if results.is_empty() => NO_WEB_RESULTS.to_string(),
        Ok(results) => {
            debug!("web: {} results", results.len());
            format_results(&results)
        }
        Err(e) => {
            warn!("web: search failed: {}", e);
            format!("Error performing web search: {}", e)
        }
    };
    state.web_results = Some(results);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{SearchResult, WebSearcher};
    use crate::config::OrchestratorConfig;
    use crate::errors::PilotError;
    use crate::testing::{context, FakeEngine, FakeRetriever, ScriptedGenerator};

    struct StaticSearcher(Result<Vec<SearchResult>, String>);

    impl WebSearcher for StaticSearcher {
        fn search(&self, _query: &str, max: usize) -> Result<Vec<SearchResult>, PilotError> {
            self.0
                .clone()
                .map(|r| r.into_iter().take(max).collect())
                .map_err(PilotError::WebSearch)
        }
    }

    fn run(searcher: &StaticSearcher) -> Option<String> {
        let generator = ScriptedGenerator::default();
        let engine = FakeEngine::default();
        let retriever = FakeRetriever::default();
        let config = OrchestratorConfig::default();
        let mut ctx = context(&generator, &engine, &retriever, &config);
        ctx.web_searcher = Some(searcher);

        let mut state = RequestState::new("what does HTTP 429 mean", Vec::new());
        web_search(&ctx, &mut state);
        state.web_results
    }

    #[test]
    fn test_formats_results() {
        let searcher = StaticSearcher(Ok(vec![SearchResult {
            title: "429 Too Many Requests".into(),
            url: "https://example.org/429".into(),
            snippet: "The user has sent too many requests.".into(),
        }]));
        let text = run(&searcher).unwrap();
        assert!(text.starts_with("1. 429 Too Many Requests"));
        assert!(text.contains("Source: https://example.org/429"));
    }

    #[test]
    fn test_empty_and_error() {
        assert_eq!(run(&StaticSearcher(Ok(Vec::new()))).as_deref(), Some(NO_WEB_RESULTS));
        let text = run(&StaticSearcher(Err("connection reset".into()))).unwrap();
        assert!(text.starts_with("Error performing web search:"));
        assert!(text.contains("connection reset"));
    }
}
