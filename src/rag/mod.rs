//! Retrieval-augmented answering over a local vector store.

mod store;

pub use store::{StoredDocument, VectorStore};
use store::read_inputs;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::llm::{ChatMessage, OpenAIClient, SamplingOptions};

/// Texts sent per embeddings request.
pub const EMBED_BATCH_SIZE: usize = 16;

const GROUNDED_SAMPLING: SamplingOptions = SamplingOptions {
    temperature: Some(0.0),
    max_tokens: Some(500),
    top_p: Some(0.5),
};

#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub answer: String,
    pub source_id: String,
    pub score: f32,
    /// Top matches as (id, score), best first. The answer uses only the first.
    pub matches: Vec<(String, f32)>,
}

/// Embed every record of `input` and upsert it into the store at `store_path`.
/// Returns the number of distinct documents written; a repeated id counts once.
pub async fn ingest(
    client: &OpenAIClient,
    embedding_model: &str,
    store_path: &Path,
    input: &Path,
) -> Result<usize> {
    let inputs = read_inputs(input)?;
    let mut store = VectorStore::load(store_path)?;
    let mut written = HashSet::new();

    for batch in inputs.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
        let embeddings = client
            .embed(embedding_model, &texts)
            .await
            .context("embed documents")?;
        for (doc, embedding) in batch.iter().zip(embeddings) {
            let id = doc
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            written.insert(id.clone());
            store.upsert(StoredDocument {
                id,
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
                embedding,
            });
        }
        debug!(batch = batch.len(), total = store.len(), "embedded batch");
    }

    store.save(store_path)?;
    info!(
        records = inputs.len(),
        ingested = written.len(),
        store = %store_path.display(),
        "ingest complete"
    );
    Ok(written.len())
}

/// Context handed to the model for a matched document: its text, plus its
/// metadata when there is any.
fn document_context(doc: &StoredDocument) -> String {
    match &doc.metadata {
        Value::Null => doc.text.clone(),
        meta => format!("{}\n{}", doc.text, meta),
    }
}

pub fn grounded_prompt(context: &str, query: &str) -> String {
    format!(
        "You are a chatbot that can have a conversation about any topic related to the provided context.\n\
         Give explicit answers from the provided context or say 'I don't know' if it does not have an answer.\n\
         provided context: {context}\n\n\
         User: {query}\n\
         Chatbot:"
    )
}

/// Answer `query` from the single best-matching document in `store`.
pub async fn answer(
    client: &OpenAIClient,
    embedding_model: &str,
    store: &VectorStore,
    query: &str,
    top_k: usize,
) -> Result<RagAnswer> {
    if store.is_empty() {
        bail!("vector store is empty; run `tdl rag ingest <FILE>` first");
    }
    let query_embedding = client
        .embed(embedding_model, &[query.to_string()])
        .await
        .context("embed query")?
        .into_iter()
        .next()
        .context("no embedding returned for query")?;

    let hits = store.search(&query_embedding, top_k.max(1))?;
    let best = hits.first().context("no document matched")?;
    debug!(id = %best.document.id, score = best.score, "best match");

    let prompt = grounded_prompt(&document_context(best.document), query);
    let answer = client
        .chat_once_with(vec![ChatMessage::user(prompt)], GROUNDED_SAMPLING)
        .await?;
    Ok(RagAnswer {
        answer,
        source_id: best.document.id.clone(),
        score: best.score,
        matches: hits
            .iter()
            .map(|h| (h.document.id.clone(), h.score))
            .collect(),
    })
}
