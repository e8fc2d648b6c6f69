//! Graph store contract for Graph RAG.
//!
//! The graph holds document and chunk nodes, entity nodes merged by name
//! per project, chunk→entity membership edges, and typed entity→entity
//! relation edges. All nodes are namespaced by project id.
//!
//! Structured queries against the graph are read-only: a single `SELECT`
//! or `WITH` statement. [`check_read_only`] enforces that before anything
//! reaches the backend.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::extraction::{Entity, Relation};

/// Chunk node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkNode {
    pub project_id: String,
    pub chunk_id: String,
    pub document_id: String,
    pub heading_path: Option<String>,
    pub content: String,
}

/// Full-text hit over chunk nodes. Higher score is better.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphChunkHit {
    pub chunk_id: String,
    pub score: f64,
}

/// A query result row: column name → JSON value, in column order.
pub type GraphRow = Vec<(String, serde_json::Value)>;

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_document_node(
        &self,
        project_id: &str,
        document_id: &str,
        path: &str,
        title: &str,
    ) -> Result<()>;

    /// Drop every chunk node (and its membership edges) of a document.
    async fn remove_document_chunks(&self, project_id: &str, document_id: &str) -> Result<()>;

    async fn upsert_chunk_node(&self, node: &ChunkNode) -> Result<()>;

    /// Merge an entity by `(project_id, name)`. An existing entity keeps its
    /// type; a non-empty description replaces an empty one.
    async fn merge_entity(&self, project_id: &str, entity: &Entity) -> Result<()>;

    async fn link_chunk_entity(
        &self,
        project_id: &str,
        chunk_id: &str,
        entity_name: &str,
    ) -> Result<()>;

    async fn merge_relation(&self, project_id: &str, relation: &Relation) -> Result<()>;

    /// Full-text search over chunk nodes in one project, best first.
    async fn search_chunks(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<GraphChunkHit>>;

    /// Execute a read-only structured query, returning at most `limit` rows.
    async fn execute_query(&self, query: &str, limit: usize) -> Result<Vec<GraphRow>>;

    /// Human-readable schema handed to the query synthesizer.
    fn schema_description(&self) -> &str;
}

/// Reject anything but a single `SELECT`/`WITH` statement.
///
/// Returns the statement with any trailing semicolon removed.
pub fn check_read_only(query: &str) -> Result<&str> {
    let trimmed = query.trim();
    let statement = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    if statement.is_empty() {
        bail!("query is empty");
    }
    if statement.contains(';') {
        bail!("query must be a single statement");
    }
    let first = statement
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    if first != "SELECT" && first != "WITH" {
        bail!("query must start with SELECT or WITH, found '{}'", first);
    }
    Ok(statement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_select_and_with() {
        assert_eq!(
            check_read_only("SELECT name FROM graph_entities;").unwrap(),
            "SELECT name FROM graph_entities"
        );
        assert!(check_read_only("  with t as (select 1) select * from t").is_ok());
    }

    #[test]
    fn rejects_writes_and_multiple_statements() {
        assert!(check_read_only("DELETE FROM graph_entities").is_err());
        assert!(check_read_only("SELECT 1; DROP TABLE graph_entities").is_err());
        assert!(check_read_only("   ").is_err());
    }
}
