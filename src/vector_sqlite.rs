//! SQLite-backed [`VectorStore`]: embeddings as little-endian `f32` BLOBs
//! with brute-force cosine ranking per project.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use docmirror_core::embedding::{blob_to_vec, vec_to_blob};
use docmirror_core::store::vector::{rank_by_distance, VectorEntry, VectorHit, VectorStore};

#[derive(Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, entry: &VectorEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, document_id, project_id, model, dims, content_hash, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                document_id = excluded.document_id,
                project_id = excluded.project_id,
                model = excluded.model,
                dims = excluded.dims,
                content_hash = excluded.content_hash,
                embedding = excluded.embedding
            "#,
        )
        .bind(&entry.chunk_id)
        .bind(&entry.document_id)
        .bind(&entry.project_id)
        .bind(&entry.model)
        .bind(entry.vector.len() as i64)
        .bind(&entry.content_hash)
        .bind(vec_to_blob(&entry.vector))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stored_hash(&self, chunk_id: &str) -> Result<Option<String>> {
        let hash: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM chunk_vectors WHERE chunk_id = ?")
                .bind(chunk_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash)
    }

    async fn nearest(
        &self,
        project_id: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        let rows = sqlx::query("SELECT chunk_id, embedding FROM chunk_vectors WHERE project_id = ?")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;

        let decoded: Vec<(String, Vec<f32>)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                (row.get("chunk_id"), blob_to_vec(&blob))
            })
            .collect();

        Ok(rank_by_distance(
            query,
            decoded.iter().map(|(id, v)| (id.as_str(), v.as_slice())),
            limit,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, SqliteVectorStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("v.sqlite"))
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        (tmp, SqliteVectorStore::new(pool))
    }

    fn entry(chunk: &str, doc: &str, project: &str, v: Vec<f32>) -> VectorEntry {
        VectorEntry {
            chunk_id: chunk.to_string(),
            document_id: doc.to_string(),
            project_id: project.to_string(),
            model: "test".to_string(),
            content_hash: format!("h-{chunk}"),
            vector: v,
        }
    }

    #[tokio::test]
    async fn nearest_ranks_within_project() {
        let (_tmp, store) = store().await;
        store.upsert(&entry("c1", "d1", "p1", vec![0.0, 1.0])).await.unwrap();
        store.upsert(&entry("c2", "d1", "p1", vec![1.0, 0.0])).await.unwrap();
        store.upsert(&entry("c3", "d9", "p2", vec![1.0, 0.0])).await.unwrap();

        let hits = store.nearest("p1", &[1.0, 0.0], 5).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
        assert!(hits[0].distance.abs() < 1e-6);
        assert!((hits[1].distance - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_overwrites_and_remove_clears() {
        let (_tmp, store) = store().await;
        store.upsert(&entry("c1", "d1", "p1", vec![1.0])).await.unwrap();
        let mut again = entry("c1", "d1", "p1", vec![0.5]);
        again.content_hash = "h2".to_string();
        store.upsert(&again).await.unwrap();
        assert_eq!(store.stored_hash("c1").await.unwrap().as_deref(), Some("h2"));

        store.remove_document("d1").await.unwrap();
        assert!(store.nearest("p1", &[1.0], 5).await.unwrap().is_empty());
    }
}
