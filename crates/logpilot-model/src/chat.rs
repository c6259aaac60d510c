//! OpenAI-compatible chat completion client.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{endpoint, ChatConfig, ModelTier};
use crate::error::{ModelError, ModelResult};
use crate::tokens::count_tokens;
use crate::{HealthReport, HealthStatus};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Blocking chat client. Cheap to share behind an `Arc`; holds no per-request state.
#[derive(Debug, Clone)]
pub struct ChatClient {
    config: ChatConfig,
    http: Client,
}

impl ChatClient {
    /// Build a client with the configured request timeout.
    pub fn new(config: ChatConfig) -> ModelResult<Self> {
        if config.api_base.trim().is_empty() {
            return Err(ModelError::invalid_config("api base URL is empty"));
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::invalid_config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Generate a completion for a single user prompt.
    pub fn generate(&self, prompt: &str, tier: ModelTier) -> ModelResult<String> {
        let tokens = count_tokens(prompt);
        if tokens > self.config.max_input_tokens {
            return Err(ModelError::InputTooLong {
                tokens,
                max: self.config.max_input_tokens,
            });
        }

        let model = self.config.model_for(tier);
        let url = endpoint(&self.config.api_base, "chat/completions");
        debug!("LLM call ({}/{}): {} input tokens", tier, model, tokens);
        trace!("Prompt: {}", prompt);

        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            stream: false,
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| ModelError::request(&url, e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| ModelError::request(&url, e.to_string()))?;
        if !status.is_success() {
            return Err(ModelError::Http {
                endpoint: url,
                status: status.as_u16(),
                body: text,
            });
        }

        parse_chat_response(model, &text)
    }

    /// Probe `GET {api_base}/models`.
    pub fn check_health(&self) -> HealthReport {
        let url = endpoint(&self.config.api_base, "models");
        let model = self.config.fast_model.clone();

        let result = self
            .http
            .get(&url)
            .send()
            .map_err(|e| ModelError::request(&url, e.to_string()))
            .and_then(|resp| {
                let status = resp.status();
                if status.is_success() {
                    resp.json::<ModelList>()
                        .map_err(|e| ModelError::invalid_response(&model, e.to_string()))
                } else {
                    Err(ModelError::Http {
                        endpoint: url.clone(),
                        status: status.as_u16(),
                        body: resp.text().unwrap_or_default(),
                    })
                }
            });

        match result {
            Ok(list) => {
                let tagged = format!("{}:", model);
                let available = list
                    .data
                    .iter()
                    .any(|m| m.id == model || m.id.starts_with(&tagged));
                HealthReport {
                    status: HealthStatus::Ready,
                    model,
                    details: if available || list.data.is_empty() {
                        None
                    } else {
                        Some("model not listed by provider".to_string())
                    },
                }
            }
            Err(e) => HealthReport {
                status: HealthStatus::Error,
                model,
                details: Some(e.to_string()),
            },
        }
    }
}

/// Extract the first choice's content from a chat completion body.
fn parse_chat_response(model: &str, body: &str) -> ModelResult<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ModelError::invalid_response(model, e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ModelError::invalid_response(model, "response has no choices"))
}
