//! End-to-end runs of the worked examples through fake collaborators.

mod common;

use std::sync::Arc;

use common::{Harness, MemorySink, Stage, StageGenerator, StaticSearcher};
use logpilot_core::{
    AnswerStatus, Collaborators, GenerationService, Intent, ModelTier, Node, Orchestrator,
    OrchestratorConfig, PilotError, SearchResult, ShadowWorker, Turn,
};

const VALID: &str = r#"{"valid": true, "feedback": ""}"#;

#[test]
fn test_count_errors() {
    let generator = StageGenerator::new()
        .reply(Stage::Classify, r#"{"intent": "sql", "reasoning": "a count"}"#)
        .reply(Stage::GenerateSql, "```sql\nSELECT count(*) FROM logs\n```")
        .reply(Stage::Synthesize, "There are 100 errors in the logs.")
        .reply(Stage::ValidateAnswer, VALID);
    let harness = Harness::new(generator);
    harness.engine.push_rows(Ok(common::count_rows(100)));

    let orchestrator = harness.orchestrator();
    let execution = orchestrator.execute("Count errors", Vec::new());
    assert_eq!(
        execution.trace,
        [
            Node::RewriteQuery,
            Node::ClassifyIntent,
            Node::GenerateSql,
            Node::ValidateSql,
            Node::ExecuteSql,
            Node::SynthesizeAnswer,
            Node::ValidateAnswer
        ]
    );
    assert_eq!(execution.state.rewritten_query.as_deref(), Some("Count errors"));
    assert_eq!(harness.generator.calls(Stage::Rewrite), 0);
    assert_eq!(execution.state.sql_valid, Some(true));
    assert_eq!(execution.state.sql_result.as_deref(), Some("[(100,)]"));

    let synthesize = harness.generator.prompts(Stage::Synthesize);
    assert!(synthesize[0].contains("SQL: SELECT count(*) FROM logs\nResult: [(100,)]"));
    assert_eq!(
        harness.engine.calls.lock().unwrap().as_slice(),
        ["SELECT count(*) FROM logs"]
    );
}

#[test]
fn test_count_errors_response() {
    let generator = StageGenerator::new()
        .reply(Stage::Classify, "sql")
        .reply(Stage::GenerateSql, "SELECT count(*) FROM logs")
        .reply(Stage::Synthesize, "There are 100 errors in the logs.")
        .reply(Stage::ValidateAnswer, VALID);
    let harness = Harness::new(generator);
    harness.engine.push_rows(Ok(common::count_rows(100)));

    let response = harness.orchestrator().answer("Count errors", Vec::new());
    assert_eq!(response.status, AnswerStatus::Ok);
    assert_eq!(response.intent, Intent::Sql);
    assert!(response.answer.contains("100"));
    assert_eq!(response.sql.as_deref(), Some("SELECT count(*) FROM logs"));
    assert_eq!(response.sql_result.as_deref(), Some("[(100,)]"));
    assert_eq!(response.context, None);
    assert_eq!(response.metadata.retry_count, 0);
    assert_eq!(response.metadata.trace.first().map(String::as_str), Some("rewrite_query"));
    assert!(response.metadata.latency >= 0.0);
}

#[test]
fn test_auth_failure_recovers_after_context_retry() {
    let generator = StageGenerator::new()
        .always(Stage::Classify, Ok("rag"))
        .script(
            Stage::VerifyContext,
            &[
                Ok(r#"{"valid": false, "feedback": "context is about the database, not auth"}"#),
                Ok(VALID),
            ],
        )
        .reply(Stage::Synthesize, "Auth tokens are expiring for many users.")
        .reply(Stage::ValidateAnswer, VALID);
    let harness = Harness::new(generator);
    harness
        .retriever
        .push(vec![common::pattern("connection pool exhausted on db-primary", "3")])
        .push(vec![common::pattern("auth token expired for user <*>", "17")]);

    let execution = harness.orchestrator().execute("Why is auth failing?", Vec::new());
    assert_eq!(execution.state.context_valid, Some(true));
    assert_eq!(execution.visits(Node::RewriteQuery), 2);
    assert_eq!(execution.visits(Node::RetrieveContext), 2);
    assert_eq!(execution.state.retries.context_retries, 1);
    assert_eq!(execution.state.retry_count, 1);
    assert_eq!(harness.retriever.queries.lock().unwrap().len(), 2);

    let verify = harness.generator.prompts(Stage::VerifyContext);
    assert!(verify[0].contains("connection pool exhausted"));
    assert!(verify[1].contains("auth token expired"));
    assert!(verify[1].contains("Found 1 relevant log patterns"));
}

#[test]
fn test_context_retry_feeds_feedback_into_rewrite() {
    let generator = StageGenerator::new()
        .script(
            Stage::Rewrite,
            &[Ok("Why is the database failing?"), Ok("Why are auth logins failing?")],
        )
        .always(Stage::Classify, Ok("rag"))
        .script(
            Stage::VerifyContext,
            &[
                Ok(r#"{"valid": false, "feedback": "context is about the database, not auth"}"#),
                Ok(VALID),
            ],
        )
        .reply(Stage::Synthesize, "Auth tokens are expiring.")
        .reply(Stage::ValidateAnswer, VALID);
    let harness = Harness::new(generator);
    harness
        .retriever
        .push(vec![common::card("Restart db-primary when the pool is exhausted.", "db")])
        .push(vec![common::card("Rotate the auth signing key.", "auth")]);
    let history = vec![
        Turn::user("auth is down again"),
        Turn::assistant("Which service are you looking at?"),
    ];

    let execution = harness.orchestrator().execute("why is it failing?", history);
    assert_eq!(execution.state.context_valid, Some(true));

    let rewrites = harness.generator.prompts(Stage::Rewrite);
    assert_eq!(rewrites.len(), 2);
    assert!(!rewrites[0].contains("Reviewer feedback"));
    assert!(rewrites[1].contains("Reviewer feedback: context is about the database, not auth"));
    assert_eq!(
        harness.retriever.queries.lock().unwrap().as_slice(),
        ["Why is the database failing?", "Why are auth logins failing?"]
    );
}

#[test]
fn test_lazy_answer_is_retried() {
    let generator = StageGenerator::new()
        .reply(Stage::Classify, "ambiguous")
        .script(
            Stage::Synthesize,
            &[
                Ok("I don't know"),
                Ok("Errors spiked at 10:00 because auth tokens expired."),
            ],
        )
        .script(
            Stage::ValidateAnswer,
            &[
                Ok(r#"{"valid": false, "feedback": "Explain what you found"}"#),
                Ok(VALID),
            ],
        );
    let harness = Harness::new(generator);

    let response = harness.orchestrator().answer("what happened?", Vec::new());
    assert!(response.is_ok());
    assert_eq!(response.answer, "Errors spiked at 10:00 because auth tokens expired.");
    assert_eq!(response.metadata.retry_count, 1);
    assert_eq!(response.metadata.retries.answer_retries, 1);

    let synthesize = harness.generator.prompts(Stage::Synthesize);
    assert!(!synthesize[0].contains("previous answer was rejected"));
    assert!(synthesize[1].contains("previous answer was rejected: Explain what you found"));
}

#[test]
fn test_web_search_path() {
    let generator = StageGenerator::new()
        .reply(Stage::Classify, "web_search")
        .reply(Stage::Synthesize, "HTTP 429 means the client is being rate limited.")
        .reply(Stage::ValidateAnswer, VALID);
    let harness = Harness::new(generator);
    let searcher = StaticSearcher(vec![SearchResult {
        title: "429 Too Many Requests".into(),
        url: "https://developer.mozilla.org/docs/Web/HTTP/Status/429".into(),
        snippet: "The user has sent too many requests in a given amount of time.".into(),
    }]);
    let collaborators = Collaborators {
        web_searcher: Some(Arc::new(searcher)),
        ..harness.collaborators()
    };
    let orchestrator = Orchestrator::new(collaborators, OrchestratorConfig::default());

    let response = orchestrator.answer("what does HTTP 429 mean?", Vec::new());
    assert_eq!(response.intent, Intent::WebSearch);
    assert!(response.metadata.trace.contains(&"web_search".to_string()));
    let context = response.context.unwrap();
    assert!(context.contains("1. 429 Too Many Requests"));
    assert!(context.contains("Source: https://developer.mozilla.org"));

    let synthesize = harness.generator.prompts(Stage::Synthesize);
    assert!(synthesize[0].contains("Web Search Results:"));
}

#[test]
fn test_shadow_replays_synthesis() {
    let generator = StageGenerator::new()
        .reply(Stage::Classify, "ambiguous")
        .reply(Stage::Synthesize, "Hello! Ask me about your logs.")
        .reply(Stage::ValidateAnswer, VALID);
    let harness = Harness::new(generator);
    let shadow_generator = StageGenerator::new().always(Stage::Synthesize, Ok("Hi there."));
    let sink = Arc::new(MemorySink::default());
    let worker =
        ShadowWorker::spawn(Arc::new(shadow_generator), sink.clone(), "candidate-model", 4)
            .unwrap();

    let orchestrator = harness.orchestrator().with_shadow(worker.handle());
    let response = orchestrator.answer("hi", Vec::new());
    assert!(response.is_ok());
    worker.shutdown();

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].query, "hi");
    assert_eq!(records[0].shadow_model, "candidate-model");
    assert_eq!(records[0].answer.as_deref(), Some("Hi there."));
}

#[test]
fn test_shadow_failure_does_not_affect_answer() {
    let generator = StageGenerator::new()
        .reply(Stage::Classify, "ambiguous")
        .reply(Stage::Synthesize, "Hello!")
        .reply(Stage::ValidateAnswer, VALID);
    let harness = Harness::new(generator);
    let shadow_generator = StageGenerator::new().panic_on(Stage::Synthesize);
    let sink = Arc::new(MemorySink::default());
    let worker =
        ShadowWorker::spawn(Arc::new(shadow_generator), sink.clone(), "broken-model", 4).unwrap();

    let orchestrator = harness.orchestrator().with_shadow(worker.handle());
    let response = orchestrator.answer("hi", Vec::new());
    assert_eq!(response.answer, "Hello!");
    worker.shutdown();

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].answer, None);
}

/// Answers every question by echoing it, so concurrent runs are traceable.
struct EchoGenerator;

impl GenerationService for EchoGenerator {
    fn generate(&self, prompt: &str, _tier: ModelTier) -> Result<String, PilotError> {
        match Stage::of(prompt) {
            Stage::Classify => Ok("ambiguous".to_string()),
            Stage::Synthesize => {
                let question = prompt
                    .lines()
                    .find_map(|l| l.strip_prefix("Question: "))
                    .unwrap_or_default();
                Ok(format!("Answer to {}", question))
            }
            Stage::ValidateAnswer => Ok(VALID.to_string()),
            other => Err(PilotError::generation(format!("unexpected {:?}", other))),
        }
    }
}

#[test]
fn test_concurrent_requests_do_not_share_state() {
    let harness = Harness::new(StageGenerator::new());
    let collaborators = Collaborators {
        generator: Arc::new(EchoGenerator),
        ..harness.collaborators()
    };
    let orchestrator = Arc::new(Orchestrator::new(collaborators, OrchestratorConfig::default()));

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let orchestrator = Arc::clone(&orchestrator);
                scope.spawn(move || {
                    let query = format!("question {}", i);
                    (query.clone(), orchestrator.answer(&query, Vec::new()))
                })
            })
            .collect();

        for handle in handles {
            let (query, response) = handle.join().unwrap();
            assert!(response.is_ok());
            assert_eq!(response.answer, format!("Answer to {}", query));
            assert_eq!(response.metadata.rewritten_query.as_deref(), Some(query.as_str()));
            assert_eq!(response.metadata.trace.len(), 4);
        }
    });
}
