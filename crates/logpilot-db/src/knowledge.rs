//! File-backed knowledge vector store.
//!
//! Records are kept in a JSONL file and searched by linear-scan cosine
//! similarity. Two kinds of records live here: documentation cards
//! (`type = "runbook_card"`) and mined log patterns (carrying `cluster_id`).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{DbError, DbResult};

/// Filename for the JSONL data file.
const DATA_FILENAME: &str = "knowledge.jsonl";

/// Metadata key identifying a log-pattern record.
pub const CLUSTER_ID_KEY: &str = "cluster_id";

/// Metadata key naming the record kind.
pub const TYPE_KEY: &str = "type";

/// Metadata `type` value of documentation cards.
pub const RUNBOOK_CARD_TYPE: &str = "runbook_card";

/// Free-form metadata attached to a record.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A record to store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    /// Stable key; upserting the same id replaces the record.
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeHit {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub score: f32,
}

/// JSONL-backed knowledge store.
pub struct KnowledgeStore {
    dir: PathBuf,
    records: RwLock<HashMap<String, KnowledgeRecord>>,
}

impl std::fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStore").field("dir", &self.dir).finish()
    }
}

impl KnowledgeStore {
    /// Open or create a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> DbResult<Self> {
        let dir = dir.into();
        debug!("Opening KnowledgeStore at {:?}", dir);
        fs::create_dir_all(&dir).map_err(|e| DbError::knowledge_io(&dir, e.to_string()))?;

        let store = Self {
            dir,
            records: RwLock::new(HashMap::new()),
        };

        let data_path = store.data_path();
        if data_path.exists() {
            store.load_from_file(&data_path)?;
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn data_path(&self) -> PathBuf {
        self.dir.join(DATA_FILENAME)
    }

    fn load_from_file(&self, path: &Path) -> DbResult<()> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut records = self
            .records
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))?;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<KnowledgeRecord>(&line) {
                Ok(record) => {
                    records.insert(record.id.clone(), record);
                }
                Err(e) => {
                    debug!("Skipping invalid line {}: {}", line_num + 1, e);
                }
            }
        }

        debug!("Loaded {} knowledge records", records.len());
        Ok(())
    }

    fn save_to_file(&self, records: &HashMap<String, KnowledgeRecord>) -> DbResult<()> {
        let data_path = self.data_path();
        let tmp_path = self.dir.join(format!("{}.tmp", DATA_FILENAME));

        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            let mut ids: Vec<&String> = records.keys().collect();
            ids.sort();
            for id in ids {
                serde_json::to_writer(&mut writer, &records[id])?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp_path, &data_path)
            .map_err(|e| DbError::knowledge_io(&data_path, e.to_string()))?;
        Ok(())
    }

    /// Insert or replace records, then persist.
    ///
    /// All vectors in a store share one dimension, fixed by the first record.
    pub fn upsert(&self, batch: &[KnowledgeRecord]) -> DbResult<()> {
        debug!("Upserting {} knowledge records", batch.len());
        let mut records = self
            .records
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))?;

        let mut dimension = records.values().next().map(|r| r.vector.len());
        for record in batch {
            let expected = *dimension.get_or_insert(record.vector.len());
            if record.vector.len() != expected {
                return Err(DbError::DimensionMismatch {
                    expected,
                    actual: record.vector.len(),
                });
            }
        }

        for record in batch {
            records.insert(record.id.clone(), record.clone());
        }
        self.save_to_file(&records)
    }

    /// Remove records by id, then persist.
    pub fn delete(&self, ids: &[String]) -> DbResult<usize> {
        let mut records = self
            .records
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))?;
        let removed = ids.iter().filter(|id| records.remove(*id).is_some()).count();
        self.save_to_file(&records)?;
        Ok(removed)
    }

    /// Top-`limit` records by cosine similarity to `embedding`.
    pub fn query(&self, embedding: &[f32], limit: usize) -> DbResult<Vec<KnowledgeHit>> {
        trace!("Querying KnowledgeStore, limit={}", limit);
        let records = self
            .records
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;

        let mut scored: Vec<(f32, &KnowledgeRecord)> = records
            .values()
            .map(|r| (cosine_similarity(embedding, &r.vector), r))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, r)| KnowledgeHit {
                id: r.id.clone(),
                content: r.content.clone(),
                metadata: r.metadata.clone(),
                score,
            })
            .collect())
    }

    pub fn len(&self) -> DbResult<usize> {
        let records = self
            .records
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;
        Ok(records.len())
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Count of (cards, patterns, other).
    pub fn kind_counts(&self) -> DbResult<(usize, usize, usize)> {
        let records = self
            .records
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;
        let mut counts = (0, 0, 0);
        for r in records.values() {
            if r.metadata.contains_key(CLUSTER_ID_KEY) {
                counts.1 += 1;
            } else if r.metadata.get(TYPE_KEY).and_then(|v| v.as_str()) == Some(RUNBOOK_CARD_TYPE) {
                counts.0 += 1;
            } else {
                counts.2 += 1;
            }
        }
        Ok(counts)
    }
}

// ============================================================================
// Similarity
// ============================================================================

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: &str, content: &str, metadata: serde_json::Value, vector: Vec<f32>) -> KnowledgeRecord {
        KnowledgeRecord {
            id: id.to_string(),
            content: content.to_string(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            vector,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_query_ranks_by_similarity() {
        let temp = TempDir::new().unwrap();
        let store = KnowledgeStore::open(temp.path()).unwrap();
        store
            .upsert(&[
                record("a", "auth failures", json!({"cluster_id": 1}), vec![1.0, 0.0, 0.0]),
                record("b", "db timeouts", json!({"cluster_id": 2}), vec![0.0, 1.0, 0.0]),
                record("c", "runbook", json!({"type": "runbook_card"}), vec![0.7, 0.7, 0.0]),
            ])
            .unwrap();

        let hits = store.query(&[1.0, 0.1, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "c");
    }

    #[test]
    fn test_persists_and_reloads() {
        let temp = TempDir::new().unwrap();
        {
            let store = KnowledgeStore::open(temp.path()).unwrap();
            store
                .upsert(&[record("a", "x", json!({"type": "runbook_card"}), vec![1.0, 2.0])])
                .unwrap();
        }
        let store = KnowledgeStore::open(temp.path()).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.kind_counts().unwrap(), (1, 0, 0));
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let temp = TempDir::new().unwrap();
        let store = KnowledgeStore::open(temp.path()).unwrap();
        store.upsert(&[record("p", "old", json!({}), vec![1.0])]).unwrap();
        store.upsert(&[record("p", "new", json!({}), vec![1.0])]).unwrap();
        let hits = store.query(&[1.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "new");
    }

    #[test]
    fn test_dimension_mismatch() {
        let temp = TempDir::new().unwrap();
        let store = KnowledgeStore::open(temp.path()).unwrap();
        store.upsert(&[record("a", "x", json!({}), vec![1.0, 2.0])]).unwrap();
        let err = store.upsert(&[record("b", "y", json!({}), vec![1.0])]).unwrap_err();
        assert!(matches!(err, DbError::DimensionMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_skips_corrupt_lines() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(DATA_FILENAME),
            "not json\n{\"id\":\"a\",\"content\":\"ok\",\"vector\":[1.0]}\n",
        )
        .unwrap();
        let store = KnowledgeStore::open(temp.path()).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_delete() {
        let temp = TempDir::new().unwrap();
        let store = KnowledgeStore::open(temp.path()).unwrap();
        store.upsert(&[record("a", "x", json!({}), vec![1.0])]).unwrap();
        assert_eq!(store.delete(&["a".to_string(), "zz".to_string()]).unwrap(), 1);
        assert!(store.is_empty().unwrap());
    }
}
