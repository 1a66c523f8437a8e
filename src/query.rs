//! Retrieval-augmented query engine.
//!
//! A [`QueryEngine`] answers one question in a single call. The standard
//! implementation, [`RetrievalQueryEngine`], runs the pipeline:
//!
//! ```text
//! question ─▶ embed ─▶ vector search (top k) ─▶ QA prompt ─▶ chat model ─▶ answer
//! ```
//!
//! The question is passed through verbatim; nothing is rewritten or
//! condensed against earlier turns.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::llm::ChatModel;
use crate::models::Passage;
use crate::prompts::qa_prompt;
use crate::store::VectorStore;

/// Answer to one question plus the passages it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub response: String,
    pub sources: Vec<Passage>,
}

/// Retrieval + prompt assembly + model invocation behind one call.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn query(&self, question: &str) -> Result<QueryResponse>;
}

pub struct RetrievalQueryEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn ChatModel>,
    similarity_top_k: usize,
}

impl RetrievalQueryEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn ChatModel>,
        similarity_top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            similarity_top_k,
        }
    }
}

#[async_trait]
impl QueryEngine for RetrievalQueryEngine {
    async fn query(&self, question: &str) -> Result<QueryResponse> {
        let query_vec = self
            .embedder
            .embed_query(question)
            .await
            .context("Failed to embed question")?;

        let sources = self
            .store
            .vector_search(&query_vec, self.similarity_top_k)
            .await?;
        tracing::debug!(passages = sources.len(), "retrieved context");

        let prompt = qa_prompt(&sources, question);
        let response = self.llm.complete(&prompt).await?;

        Ok(QueryResponse { response, sources })
    }
}
