//! Prompt builders for every generation call the orchestrator makes.

use crate::types::Turn;

/// Schema summary given to the SQL generator.
const LOGS_SCHEMA_HINT: &str = "\
Table logs (
  timestamp TEXT      -- 'YYYY-MM-DD HH:MM:SS', sortable as text
  severity TEXT       -- INFO, WARN, ERROR, ...
  service_name TEXT
  trace_id TEXT
  body TEXT           -- the log message
  environment TEXT
  app_id TEXT
  department TEXT
  host TEXT
  region TEXT
  context TEXT        -- JSON; use json_extract(context, '$.key')
)";

/// Render turns as `User: ...` / `AI: ...` lines.
pub fn format_history(history: &[Turn]) -> String {
    history
        .iter()
        .map(|t| format!("{}: {}\n", t.role.prompt_label(), t.content))
        .collect()
}

pub fn rewrite_prompt(query: &str, history: &[Turn], context_feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "You rewrite follow-up questions about application logs into standalone questions.\n\
         Use the conversation to resolve pronouns and implicit references.\n\
         If the question is already standalone, return it unchanged.\n\n\
         Conversation:\n{}\n\
         Follow-up question: {}\n",
        format_history(history),
        query
    );
    if let Some(feedback) = context_feedback.filter(|f| !f.trim().is_empty()) {
        prompt.push_str(&format!(
            "\nA previous phrasing retrieved irrelevant context. Reviewer feedback: {}\n\
             Rephrase so that a search finds better matches.\n",
            feedback
        ));
    }
    prompt.push_str("\nReturn ONLY the rewritten question.");
    prompt
}

pub fn classify_prompt(query: &str) -> String {
    format!(
        "Classify the user's question about an observability system.\n\n\
         Intents:\n\
         - sql: counts, aggregations, filters or listings over log records \
           (\"how many errors\", \"top services by warnings\", \"show latest logs\").\n\
         - rag: root causes, explanations, runbooks, known issues or recurring patterns \
           (\"why is auth failing\", \"how do I fix the payment timeout\").\n\
         - web_search: general technical knowledge unrelated to our own logs \
           (\"what does HTTP 429 mean\").\n\
         - ambiguous: greetings, chit-chat, or too vague to route.\n\n\
         Question: {}\n\n\
         Respond with JSON only: {{\"intent\": \"sql|rag|web_search|ambiguous\", \"reasoning\": \"<one sentence>\"}}",
        query
    )
}

pub fn sql_generate_prompt(query: &str) -> String {
    format!(
        "You are an expert SQL analyst writing SQLite queries over application logs.\n\n\
         {}\n\n\
         Rules:\n\
         - Only SELECT statements.\n\
         - Use GROUP BY whenever the question asks for a breakdown \"by\" something.\n\
         - Limit listings to 50 rows unless asked otherwise.\n\n\
         Question: {}\n\n\
         Output ONLY the SQL query.",
        LOGS_SCHEMA_HINT, query
    )
}

pub fn sql_fix_prompt(query: &str, bad_sql: &str, error: &str) -> String {
    format!(
        "You are an expert SQL analyst.\n\
         The following SQLite query generated for the question \"{}\" is invalid.\n\n\
         Invalid SQL: {}\n\
         Error: {}\n\n\
         Fix the SQL query. Output ONLY the fixed SQL query.",
        query, bad_sql, error
    )
}

pub fn verify_context_prompt(query: &str, context: &str) -> String {
    format!(
        "You check whether retrieved context can answer a question about application logs.\n\n\
         Question: {}\n\n\
         Context:\n{}\n\n\
         Is the context relevant and sufficient to answer the question?\n\
         Respond with JSON only: {{\"valid\": true|false, \"feedback\": \"<what is missing or wrong>\"}}",
        query, context
    )
}

pub fn synthesize_prompt(
    query: &str,
    context: &str,
    history: &[Turn],
    answer_feedback: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are LogPilot, an assistant for on-call engineers.\n\
         Answer the question using only the context below. If the context reports an error \
         or no data, say so plainly and suggest a next step.\n\n\
         Conversation so far:\n{}\n\
         Context:\n{}\n\n\
         Question: {}\n",
        format_history(history),
        context,
        query
    );
    if let Some(feedback) = answer_feedback.filter(|f| !f.trim().is_empty()) {
        prompt.push_str(&format!(
            "\nYour previous answer was rejected: {}\nWrite a better answer.\n",
            feedback
        ));
    }
    prompt.push_str("\nAnswer:");
    prompt
}

pub fn validate_answer_prompt(query: &str, answer: &str) -> String {
    format!(
        "You review answers given to engineers.\n\n\
         Question: {}\n\n\
         Answer: {}\n\n\
         Does the answer actually address the question? Evasive answers such as \"I don't know\" \
         without explanation are not acceptable.\n\
         Respond with JSON only: {{\"valid\": true|false, \"feedback\": \"<how to improve>\"}}",
        query, answer
    )
}
