//! Knowledge base maintenance: runbook cards and log patterns.
//!
//! Cards are markdown files. The first `# ` heading becomes the card topic
//! (the file stem when there is none). Patterns come from the log store, one
//! record per distinct `template_id`, so retrieval can anchor them back to
//! concrete log rows.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use logpilot_db::{
    KnowledgeRecord, Metadata, TemplatePattern, CLUSTER_ID_KEY, RUNBOOK_CARD_TYPE, TYPE_KEY,
};
use logpilot_model::EmbeddingModel;

use crate::errors::PilotError;
use crate::model_adapter::from_model_error;

/// Texts embedded per request.
const EMBED_BATCH: usize = 32;

/// A file that could not be turned into a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of [`crate::PilotEngine::ingest_cards`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub added: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Record counts by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KnowledgeStats {
    pub cards: usize,
    pub patterns: usize,
    pub other: usize,
}

impl KnowledgeStats {
    pub fn total(&self) -> usize {
        self.cards + self.patterns + self.other
    }
}

/// A parsed card, not yet embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDraft {
    pub id: String,
    pub topic: String,
    pub content: String,
    pub source: PathBuf,
}

/// Read a markdown card from disk.
pub fn read_card(path: &Path) -> Result<CardDraft, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let content = content.trim().to_string();
    if content.is_empty() {
        return Err("file is empty".to_string());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("card")
        .to_string();
    let topic = content
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|heading| heading.trim().to_string())
        .filter(|heading| !heading.is_empty())
        .unwrap_or_else(|| stem.clone());

    Ok(CardDraft {
        id: format!("card:{}", stem),
        topic,
        content,
        source: path.to_path_buf(),
    })
}

/// Parse `paths` into card drafts, collecting unreadable files.
pub fn collect_cards(paths: &[PathBuf]) -> (Vec<CardDraft>, Vec<SkippedFile>) {
    let mut cards = Vec::new();
    let mut skipped = Vec::new();
    for path in paths {
        match read_card(path) {
            Ok(card) => cards.push(card),
            Err(reason) => {
                warn!("kb: skipping {}: {}", path.display(), reason);
                skipped.push(SkippedFile {
                    path: path.clone(),
                    reason,
                });
            }
        }
    }
    (cards, skipped)
}

pub fn card_metadata(card: &CardDraft) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(TYPE_KEY.into(), Value::from(RUNBOOK_CARD_TYPE));
    metadata.insert("topic".into(), Value::from(card.topic.as_str()));
    metadata.insert(
        "source".into(),
        Value::from(card.source.display().to_string()),
    );
    metadata
}

pub fn pattern_metadata(pattern: &TemplatePattern) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(CLUSTER_ID_KEY.into(), Value::from(pattern.template_id.as_str()));
    metadata.insert("service_name".into(), Value::from(pattern.service_name.as_str()));
    metadata.insert("severity".into(), Value::from(pattern.severity.as_str()));
    metadata.insert("occurrences".into(), Value::from(pattern.occurrences));
    metadata
}

/// Embed cards into knowledge records.
pub fn card_records(
    cards: &[CardDraft],
    embedder: &dyn EmbeddingModel,
) -> Result<Vec<KnowledgeRecord>, PilotError> {
    let texts: Vec<&str> = cards.iter().map(|c| c.content.as_str()).collect();
    let vectors = embed_all(embedder, &texts)?;
    Ok(cards
        .iter()
        .zip(vectors)
        .map(|(card, vector)| KnowledgeRecord {
            id: card.id.clone(),
            content: card.content.clone(),
            metadata: card_metadata(card),
            vector,
        })
        .collect())
}

/// Embed template patterns into knowledge records.
pub fn pattern_records(
    patterns: &[TemplatePattern],
    embedder: &dyn EmbeddingModel,
) -> Result<Vec<KnowledgeRecord>, PilotError> {
    let texts: Vec<&str> = patterns.iter().map(|p| p.body.as_str()).collect();
    let vectors = embed_all(embedder, &texts)?;
    Ok(patterns
        .iter()
        .zip(vectors)
        .map(|(pattern, vector)| KnowledgeRecord {
            id: format!("pattern:{}", pattern.template_id),
            content: pattern.body.clone(),
            metadata: pattern_metadata(pattern),
            vector,
        })
        .collect())
}

fn embed_all(embedder: &dyn EmbeddingModel, texts: &[&str]) -> Result<Vec<Vec<f32>>, PilotError> {
    let mut vectors = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(EMBED_BATCH) {
        let batch = embedder.embed(chunk).map_err(from_model_error)?;
        if batch.len() != chunk.len() {
            return Err(PilotError::retrieval(format!(
                "embedding model returned {} vectors for {} texts",
                batch.len(),
                chunk.len()
            )));
        }
        vectors.extend(batch);
    }
    debug!("kb: embedded {} texts", vectors.len());
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpilot_model::ModelResult;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct LengthEmbedder;

    impl EmbeddingModel for LengthEmbedder {
        fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn model_id(&self) -> &str {
            "length"
        }
    }

    #[test]
    fn test_read_card_topic() {
        let dir = TempDir::new().unwrap();
        let with_heading = dir.path().join("auth-tokens.md");
        fs::write(&with_heading, "Intro\n# Auth token expiry\nRestart the pods.").unwrap();
        let plain = dir.path().join("disk.md");
        fs::write(&plain, "Clean /var/log when the disk fills.").unwrap();
        let empty = dir.path().join("empty.md");
        fs::write(&empty, "  \n").unwrap();

        let card = read_card(&with_heading).unwrap();
        assert_eq!(card.id, "card:auth-tokens");
        assert_eq!(card.topic, "Auth token expiry");
        assert_eq!(read_card(&plain).unwrap().topic, "disk");

        let (cards, skipped) =
            collect_cards(&[with_heading, plain, empty.clone(), dir.path().join("missing.md")]);
        assert_eq!(cards.len(), 2);
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].path, empty);
    }

    #[test]
    fn test_records_carry_kind_metadata() {
        let card = CardDraft {
            id: "card:x".into(),
            topic: "x".into(),
            content: "restart it".into(),
            source: PathBuf::from("x.md"),
        };
        let records = card_records(&[card], &LengthEmbedder).unwrap();
        assert_eq!(records[0].metadata[TYPE_KEY], RUNBOOK_CARD_TYPE);
        assert_eq!(records[0].vector, vec![10.0, 1.0]);

        let pattern = TemplatePattern {
            template_id: "17".into(),
            body: "token expired for user <*>".into(),
            service_name: "auth-service".into(),
            severity: "ERROR".into(),
            occurrences: 42,
        };
        let records = pattern_records(&[pattern], &LengthEmbedder).unwrap();
        assert_eq!(records[0].id, "pattern:17");
        assert_eq!(records[0].metadata[CLUSTER_ID_KEY], "17");
        assert_eq!(records[0].metadata["occurrences"], 42);
    }
}
