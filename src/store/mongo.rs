//! MongoDB Atlas Vector Search backend.
//!
//! Runs a `$vectorSearch` aggregation against the configured collection and
//! projects each hit down to its text, metadata, and similarity score. The
//! collection layout is the one written by the (external) ingestion job:
//!
//! ```text
//! { "_id": ..., "id": "<node id>", "text": "...", "metadata": {...}, "embedding": [f32; N] }
//! ```
//!
//! Field names come from `[store]` in the config.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Client, Collection};

use crate::config::StoreConfig;
use crate::models::Passage;

use super::VectorStore;

/// Candidates examined per requested result.
const OVERSAMPLING_FACTOR: usize = 10;

/// Atlas rejects `$vectorSearch` stages asking for more candidates than this.
const MAX_NUM_CANDIDATES: usize = 10_000;

pub struct MongoVectorStore {
    collection: Collection<Document>,
    config: StoreConfig,
}

impl MongoVectorStore {
    /// Open the client once; it is reused for the lifetime of the process.
    pub async fn connect(uri: &str, config: &StoreConfig) -> Result<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .context("Failed to create MongoDB client")?;
        let collection = client
            .database(&config.database)
            .collection::<Document>(&config.collection);

        tracing::info!(
            database = %config.database,
            collection = %config.collection,
            index = %config.index_name,
            "vector store ready"
        );

        Ok(Self {
            collection,
            config: config.clone(),
        })
    }
}

/// Build the `$vectorSearch` + `$project` pipeline.
pub fn search_pipeline(config: &StoreConfig, query_vec: &[f32], limit: usize) -> Vec<Document> {
    let query_vector: Vec<f64> = query_vec.iter().map(|v| *v as f64).collect();
    let num_candidates = limit
        .saturating_mul(OVERSAMPLING_FACTOR)
        .min(MAX_NUM_CANDIDATES)
        .max(limit) as i64;

    let mut project = doc! {
        "_id": 1,
        "id": 1,
        "score": { "$meta": "vectorSearchScore" },
    };
    project.insert(config.text_field.clone(), 1);
    project.insert(config.metadata_field.clone(), 1);

    vec![
        doc! {
            "$vectorSearch": {
                "index": config.index_name.as_str(),
                "path": config.embedding_field.as_str(),
                "queryVector": query_vector,
                "numCandidates": num_candidates,
                "limit": limit as i64,
            }
        },
        doc! { "$project": project },
    ]
}

/// Convert one projected hit into a [`Passage`].
pub fn passage_from_document(config: &StoreConfig, d: &Document) -> Passage {
    let id = match d.get("id").or_else(|| d.get("_id")) {
        Some(Bson::String(s)) => s.clone(),
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    let text = d.get_str(&config.text_field).unwrap_or_default().to_string();

    let score = match d.get("score") {
        Some(Bson::Double(v)) => *v,
        Some(Bson::Int32(v)) => *v as f64,
        Some(Bson::Int64(v)) => *v as f64,
        _ => 0.0,
    };

    let metadata = d
        .get(&config.metadata_field)
        .cloned()
        .map(Bson::into_relaxed_extjson)
        .unwrap_or(serde_json::Value::Null);

    Passage {
        id,
        text,
        score,
        metadata,
    }
}

#[async_trait]
impl VectorStore for MongoVectorStore {
    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<Passage>> {
        let pipeline = search_pipeline(&self.config, query_vec, limit);

        let mut cursor = self
            .collection
            .aggregate(pipeline)
            .await
            .context("Vector search aggregation failed")?;

        let mut passages = Vec::with_capacity(limit);
        while let Some(d) = cursor
            .try_next()
            .await
            .context("Failed to read vector search results")?
        {
            passages.push(passage_from_document(&self.config, &d));
        }

        tracing::debug!(hits = passages.len(), "vector search complete");
        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    #[test]
    fn test_pipeline_uses_configured_names() {
        let config = StoreConfig::default();
        let pipeline = search_pipeline(&config, &[0.5, -0.5], 2);
        assert_eq!(pipeline.len(), 2);

        let stage = pipeline[0].get_document("$vectorSearch").unwrap();
        assert_eq!(stage.get_str("index").unwrap(), "idx_embedding");
        assert_eq!(stage.get_str("path").unwrap(), "embedding");
        assert_eq!(stage.get_i64("limit").unwrap(), 2);
        assert_eq!(stage.get_i64("numCandidates").unwrap(), 20);
        assert_eq!(stage.get_array("queryVector").unwrap().len(), 2);

        let project = pipeline[1].get_document("$project").unwrap();
        assert!(project.contains_key("text"));
        assert!(project.contains_key("metadata"));
        assert!(project.contains_key("score"));
    }

    #[test]
    fn test_num_candidates_capped() {
        let config = StoreConfig::default();

        let pipeline = search_pipeline(&config, &[1.0], 1000);
        let stage = pipeline[0].get_document("$vectorSearch").unwrap();
        assert_eq!(stage.get_i64("numCandidates").unwrap(), 10_000);

        let pipeline = search_pipeline(&config, &[1.0], usize::MAX / 2);
        let stage = pipeline[0].get_document("$vectorSearch").unwrap();
        assert!(stage.get_i64("numCandidates").unwrap() > 0);
    }

    #[test]
    fn test_passage_from_document() {
        let config = StoreConfig::default();
        let d = doc! {
            "id": "node-1",
            "text": "ArbOS is the layer 2 operating system.",
            "metadata": { "file_name": "arbos.md" },
            "score": 0.91,
        };
        let p = passage_from_document(&config, &d);
        assert_eq!(p.id, "node-1");
        assert_eq!(p.text, "ArbOS is the layer 2 operating system.");
        assert!((p.score - 0.91).abs() < 1e-9);
        assert_eq!(p.metadata["file_name"], "arbos.md");
    }

    #[test]
    fn test_passage_falls_back_to_object_id() {
        let config = StoreConfig::default();
        let oid = ObjectId::new();
        let d = doc! { "_id": oid, "text": "x" };
        let p = passage_from_document(&config, &d);
        assert_eq!(p.id, oid.to_hex());
        assert_eq!(p.score, 0.0);
        assert!(p.metadata.is_null());
    }
}
