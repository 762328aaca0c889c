use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
    pub embedding: Vec<f32>,
}

/// One record of an ingest file, before embedding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocumentInput {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument<'a> {
    pub document: &'a StoredDocument,
    pub score: f32,
}

/// Flat, file-backed vector store. Search is a linear scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStore {
    documents: Vec<StoredDocument>,
}

impl VectorStore {
    /// Load from `path`; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "vector store not found, starting empty");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("read vector store {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parse vector store {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let content = serde_json::to_string(self)?;
        fs::write(path, content).with_context(|| format!("write vector store {}", path.display()))?;
        info!(path = %path.display(), documents = self.documents.len(), "vector store saved");
        Ok(())
    }

    /// Insert `doc`, replacing any document with the same id in place.
    pub fn upsert(&mut self, doc: StoredDocument) {
        match self.documents.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc,
            None => self.documents.push(doc),
        }
    }

    pub fn get(&self, id: &str) -> Option<&StoredDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn documents(&self) -> &[StoredDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The `k` documents most similar to `query`, best first. Equal scores keep
    /// insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredDocument<'_>>> {
        let mut scored = Vec::with_capacity(self.documents.len());
        for document in &self.documents {
            if document.embedding.len() != query.len() {
                bail!(
                    "embedding dimension mismatch: document {} has {}, query has {}",
                    document.id,
                    document.embedding.len(),
                    query.len()
                );
            }
            scored.push(ScoredDocument {
                document,
                score: cosine_similarity(&document.embedding, query),
            });
        }
        // sort_by is stable, so ties stay in insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Cosine similarity of two equal-length vectors; 0.0 when either is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Read ingest records from a JSON array or a JSON-lines file.
pub fn read_inputs(path: &Path) -> Result<Vec<DocumentInput>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read input {}", path.display()))?;
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(&content)
            .with_context(|| format!("parse JSON array in {}", path.display()));
    }
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<DocumentInput>(line)
                .with_context(|| format!("parse line {} of {}", i + 1, path.display()))
        })
        .collect()
}
