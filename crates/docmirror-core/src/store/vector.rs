//! Vector similarity store for chunk embeddings.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;

/// One stored chunk embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub project_id: String,
    pub model: String,
    /// Hash of the chunk text the vector was computed from.
    pub content_hash: String,
    pub vector: Vec<f32>,
}

/// Nearest-neighbor hit. `distance` is a cosine distance in `[0, 2]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: String,
    pub distance: f64,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the vector for `entry.chunk_id`.
    async fn upsert(&self, entry: &VectorEntry) -> Result<()>;

    /// Remove every vector belonging to a document.
    async fn remove_document(&self, document_id: &str) -> Result<()>;

    /// Content hash of the stored vector for a chunk, if any.
    async fn stored_hash(&self, chunk_id: &str) -> Result<Option<String>>;

    /// The `limit` nearest vectors within a project, closest first.
    async fn nearest(
        &self,
        project_id: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>>;
}

/// Brute-force in-memory vector store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<HashMap<String, VectorEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("vector store lock poisoned")
}

/// Rank entries by cosine distance, ties broken by chunk id.
pub fn rank_by_distance<'a, I>(query: &[f32], entries: I, limit: usize) -> Vec<VectorHit>
where
    I: IntoIterator<Item = (&'a str, &'a [f32])>,
{
    let mut hits: Vec<VectorHit> = entries
        .into_iter()
        .map(|(chunk_id, vector)| VectorHit {
            chunk_id: chunk_id.to_string(),
            distance: cosine_distance(query, vector),
        })
        .collect();
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits.truncate(limit);
    hits
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, entry: &VectorEntry) -> Result<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(entry.chunk_id.clone(), entry.clone());
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .retain(|_, e| e.document_id != document_id);
        Ok(())
    }

    async fn stored_hash(&self, chunk_id: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .map_err(poisoned)?
            .get(chunk_id)
            .map(|e| e.content_hash.clone()))
    }

    async fn nearest(
        &self,
        project_id: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(rank_by_distance(
            query,
            entries
                .values()
                .filter(|e| e.project_id == project_id)
                .map(|e| (e.chunk_id.as_str(), e.vector.as_slice())),
            limit,
        ))
    }
}
