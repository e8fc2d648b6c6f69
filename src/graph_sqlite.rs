//! SQLite realization of the [`GraphStore`].
//!
//! Nodes and edges are plain tables namespaced by `project_id`; chunk text
//! is mirrored into the `graph_chunks_fts` FTS5 table for retrieval. The
//! structured query language is read-only SQL over those tables.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};

use docmirror_core::extraction::{Entity, Relation};
use docmirror_core::graph::{check_read_only, ChunkNode, GraphChunkHit, GraphRow, GraphStore};

/// Schema handed to the query synthesizer.
pub const GRAPH_SCHEMA: &str = r#"SQLite tables (read-only; answer with one SELECT or WITH statement):

graph_documents(project_id TEXT, document_id TEXT, path TEXT, title TEXT)
  -- one row per document node
graph_chunks(project_id TEXT, chunk_id TEXT, document_id TEXT, heading_path TEXT, content TEXT)
  -- chunk nodes; graph_chunks.document_id references graph_documents.document_id
graph_entities(project_id TEXT, name TEXT, entity_type TEXT, description TEXT)
  -- entity_type is one of 'Concept', 'API', 'Component', 'Technology'
  -- entities are unique per (project_id, name)
graph_mentions(project_id TEXT, chunk_id TEXT, entity_name TEXT)
  -- membership edge: chunk mentions entity (entity_name references graph_entities.name)
graph_relations(project_id TEXT, source TEXT, target TEXT, relation_type TEXT)
  -- typed edge between entity names; relation_type is one of
  -- 'RELATED_TO', 'DEPENDS_ON', 'USES', 'PART_OF'

Always join on project_id as well as the key columns."#;

#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Turn free text into an FTS5 expression: every word quoted, OR-joined.
fn fts_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}

fn value_to_json(row: &sqlx::sqlite::SqliteRow, index: usize) -> Result<serde_json::Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(serde_json::Value::Null);
    }
    let type_name = raw.type_info().name().to_string();
    Ok(match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => serde_json::json!(row.try_get::<i64, _>(index)?),
        "REAL" => serde_json::json!(row.try_get::<f64, _>(index)?),
        "BLOB" => serde_json::json!(format!(
            "<{} bytes>",
            row.try_get::<Vec<u8>, _>(index)?.len()
        )),
        _ => serde_json::json!(row.try_get::<String, _>(index)?),
    })
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn upsert_document_node(
        &self,
        project_id: &str,
        document_id: &str,
        path: &str,
        title: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO graph_documents (project_id, document_id, path, title)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(project_id, document_id) DO UPDATE SET
                path = excluded.path,
                title = excluded.title
            "#,
        )
        .bind(project_id)
        .bind(document_id)
        .bind(path)
        .bind(title)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_document_chunks(&self, project_id: &str, document_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM graph_mentions WHERE project_id = ? AND chunk_id IN \
             (SELECT chunk_id FROM graph_chunks WHERE project_id = ? AND document_id = ?)",
        )
        .bind(project_id)
        .bind(project_id)
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM graph_chunks_fts WHERE project_id = ? AND chunk_id IN \
             (SELECT chunk_id FROM graph_chunks WHERE project_id = ? AND document_id = ?)",
        )
        .bind(project_id)
        .bind(project_id)
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM graph_chunks WHERE project_id = ? AND document_id = ?")
            .bind(project_id)
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_chunk_node(&self, node: &ChunkNode) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO graph_chunks (project_id, chunk_id, document_id, heading_path, content)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(project_id, chunk_id) DO UPDATE SET
                document_id = excluded.document_id,
                heading_path = excluded.heading_path,
                content = excluded.content
            "#,
        )
        .bind(&node.project_id)
        .bind(&node.chunk_id)
        .bind(&node.document_id)
        .bind(&node.heading_path)
        .bind(&node.content)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM graph_chunks_fts WHERE project_id = ? AND chunk_id = ?")
            .bind(&node.project_id)
            .bind(&node.chunk_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO graph_chunks_fts (chunk_id, project_id, content) VALUES (?, ?, ?)")
            .bind(&node.chunk_id)
            .bind(&node.project_id)
            .bind(&node.content)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn merge_entity(&self, project_id: &str, entity: &Entity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO graph_entities (project_id, name, entity_type, description)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(project_id, name) DO UPDATE SET
                description = CASE
                    WHEN graph_entities.description = '' THEN excluded.description
                    ELSE graph_entities.description
                END
            "#,
        )
        .bind(project_id)
        .bind(&entity.name)
        .bind(entity.entity_type.as_str())
        .bind(&entity.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn link_chunk_entity(
        &self,
        project_id: &str,
        chunk_id: &str,
        entity_name: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO graph_mentions (project_id, chunk_id, entity_name) VALUES (?, ?, ?)",
        )
        .bind(project_id)
        .bind(chunk_id)
        .bind(entity_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn merge_relation(&self, project_id: &str, relation: &Relation) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO graph_relations (project_id, source, target, relation_type) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(&relation.source)
        .bind(&relation.target)
        .bind(relation.relation_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn search_chunks(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<GraphChunkHit>> {
        let Some(expression) = fts_expression(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT chunk_id, rank
            FROM graph_chunks_fts
            WHERE graph_chunks_fts MATCH ? AND project_id = ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(expression)
        .bind(project_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                GraphChunkHit {
                    chunk_id: row.get("chunk_id"),
                    score: -rank, // negate so higher = better
                }
            })
            .collect())
    }

    async fn execute_query(&self, query: &str, limit: usize) -> Result<Vec<GraphRow>> {
        let statement = check_read_only(query)?;
        let wrapped = format!("SELECT * FROM ({}) LIMIT ?", statement);

        let rows = sqlx::query(&wrapped)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| Ok((col.name().to_string(), value_to_json(row, col.ordinal())?)))
                    .collect()
            })
            .collect()
    }

    fn schema_description(&self) -> &str {
        GRAPH_SCHEMA
    }
}
