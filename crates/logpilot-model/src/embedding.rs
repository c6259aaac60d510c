//! HTTP embedding client (`POST {api_base}/embeddings`).

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{endpoint, EmbeddingConfig};
use crate::error::{ModelError, ModelResult};
use crate::EmbeddingModel;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embedding model served over an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingModel {
    config: EmbeddingConfig,
    http: Client,
}

impl HttpEmbeddingModel {
    pub fn new(config: EmbeddingConfig) -> ModelResult<Self> {
        if config.model.trim().is_empty() {
            return Err(ModelError::invalid_config("embedding model name is empty"));
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::invalid_config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }
}

impl EmbeddingModel for HttpEmbeddingModel {
    fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = endpoint(&self.config.api_base, "embeddings");
        debug!("Embedding {} texts with {}", texts.len(), self.config.model);

        let mut request = self.http.post(&url).json(&EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| ModelError::request(&url, e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ModelError::request(&url, e.to_string()))?;
        if !status.is_success() {
            return Err(ModelError::Http {
                endpoint: url,
                status: status.as_u16(),
                body,
            });
        }

        parse_embeddings(&self.config.model, &body, texts.len())
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

/// Order embeddings by `index` and check one came back per input.
fn parse_embeddings(model: &str, body: &str, expected: usize) -> ModelResult<Vec<Vec<f32>>> {
    let mut parsed: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| ModelError::invalid_response(model, e.to_string()))?;
    if parsed.data.len() != expected {
        return Err(ModelError::invalid_response(
            model,
            format!("expected {} embeddings, got {}", expected, parsed.data.len()),
        ));
    }
    parsed.data.sort_by_key(|d| d.index);
    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}
