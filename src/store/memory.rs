//! In-memory [`VectorStore`] for tests and offline runs.
//!
//! Passages live in a `Vec` behind `std::sync::RwLock`. Search is brute-force
//! cosine similarity over every stored vector.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::Passage;

use super::VectorStore;

struct StoredPassage {
    passage: Passage,
    vector: Vec<f32>,
}

pub struct InMemoryStore {
    passages: RwLock<Vec<StoredPassage>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            passages: RwLock::new(Vec::new()),
        }
    }

    /// Add a passage with its embedding. The stored score is ignored;
    /// search results carry the computed similarity.
    pub fn insert(&self, passage: Passage, vector: Vec<f32>) {
        let mut passages = self.passages.write().unwrap_or_else(|e| e.into_inner());
        passages.push(StoredPassage { passage, vector });
    }

    pub fn len(&self) -> usize {
        self.passages.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<Passage>> {
        let passages = self.passages.read().unwrap_or_else(|e| e.into_inner());
        let mut results: Vec<Passage> = passages
            .iter()
            .map(|sp| {
                let mut p = sp.passage.clone();
                p.score = cosine_similarity(query_vec, &sp.vector) as f64;
                p
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(id: &str) -> Passage {
        Passage {
            id: id.to_string(),
            text: format!("text of {}", id),
            score: 0.0,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_returns_closest_first() {
        let store = InMemoryStore::new();
        store.insert(passage("x"), vec![1.0, 0.0]);
        store.insert(passage("y"), vec![0.0, 1.0]);
        store.insert(passage("xy"), vec![0.7, 0.7]);

        let results = store.vector_search(&[0.0, 1.0], 2).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["y", "xy"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        let results = store.vector_search(&[1.0], 5).await.unwrap();
        assert!(results.is_empty());
    }
}
