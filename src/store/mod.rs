//! Vector store abstraction.
//!
//! The knowledge base is owned by an external document store and is treated
//! as a read-only retrieval oracle: the only operation this crate needs is a
//! nearest-neighbour search over a named embedding field.
//!
//! | Backend | Purpose |
//! |---------|---------|
//! | [`mongo::MongoVectorStore`] | MongoDB Atlas `$vectorSearch` aggregation |
//! | [`memory::InMemoryStore`] | Brute-force cosine search for tests and offline runs |

pub mod memory;
pub mod mongo;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Passage;

/// Read-only similarity search over stored passages.
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// session for the lifetime of the process.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return up to `limit` passages closest to `query_vec`, best first.
    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<Passage>>;
}
