//! SQLite-backed [`DocStore`] implementation.
//!
//! Every multi-row write (a new version with its chunk set, or a link
//! replacement) runs inside one transaction, so readers on other
//! connections see either the old rows or the complete new set.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use docmirror_core::models::{
    ChunkContext, DocChunk, Document, DocumentLink, DocumentVersion, Repository, SearchResult,
    SyncJob,
};
use docmirror_core::search::{keyword_snippet, KEYWORD_PLACEHOLDER_SCORE};
use docmirror_core::store::DocStore;

/// SQLite implementation of the [`DocStore`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const DOCUMENT_COLUMNS: &str = "id, repository_id, path, doc_type, title, latest_commit, \
     latest_version_id, deleted, created_at, updated_at";

const VERSION_COLUMNS: &str = "id, document_id, commit_sha, content, content_hash, \
     author_name, author_email, committed_at, message, created_at";

const JOB_COLUMNS: &str = "id, repository_id, mode, status, started_at, finished_at, message, \
     documents_processed, documents_failed, last_commit";

const CONTEXT_SELECT: &str = r#"
    SELECT c.id, c.version_id, c.chunk_index, c.heading_path, c.content, c.token_count,
           d.id AS document_id, d.path, d.title, r.project_id, v.commit_sha
    FROM doc_chunks c
    JOIN document_versions v ON v.id = c.version_id
    JOIN documents d ON d.id = v.document_id AND d.latest_version_id = v.id
    JOIN repositories r ON r.id = d.repository_id
"#;

fn row_to_repository(row: &SqliteRow) -> Repository {
    Repository {
        id: row.get("id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        url: row.get("url"),
        default_branch: row.get("default_branch"),
        last_synced_commit: row.get("last_synced_commit"),
        last_synced_at: row.get("last_synced_at"),
    }
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    Ok(Document {
        id: row.get("id"),
        repository_id: row.get("repository_id"),
        path: row.get("path"),
        doc_type: row.get::<String, _>("doc_type").parse()?,
        title: row.get("title"),
        latest_commit: row.get("latest_commit"),
        latest_version_id: row.get("latest_version_id"),
        deleted: row.get("deleted"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_version(row: &SqliteRow) -> DocumentVersion {
    DocumentVersion {
        id: row.get("id"),
        document_id: row.get("document_id"),
        commit_sha: row.get("commit_sha"),
        content: row.get("content"),
        content_hash: row.get("content_hash"),
        author_name: row.get("author_name"),
        author_email: row.get("author_email"),
        committed_at: row.get("committed_at"),
        message: row.get("message"),
        created_at: row.get("created_at"),
    }
}

fn row_to_chunk(row: &SqliteRow) -> DocChunk {
    DocChunk {
        id: row.get("id"),
        version_id: row.get("version_id"),
        chunk_index: row.get("chunk_index"),
        heading_path: row.get("heading_path"),
        content: row.get("content"),
        token_count: row.get("token_count"),
    }
}

fn row_to_context(row: &SqliteRow) -> ChunkContext {
    ChunkContext {
        chunk: row_to_chunk(row),
        document_id: row.get("document_id"),
        project_id: row.get("project_id"),
        path: row.get("path"),
        title: row.get("title"),
        commit_sha: row.get("commit_sha"),
    }
}

fn row_to_link(row: &SqliteRow) -> Result<DocumentLink> {
    Ok(DocumentLink {
        id: row.get("id"),
        source_document_id: row.get("source_document_id"),
        target_document_id: row.get("target_document_id"),
        target: row.get("target"),
        link_type: row.get::<String, _>("link_type").parse()?,
        broken: row.get("broken"),
    })
}

fn row_to_job(row: &SqliteRow) -> Result<SyncJob> {
    Ok(SyncJob {
        id: row.get("id"),
        repository_id: row.get("repository_id"),
        mode: row.get::<String, _>("mode").parse()?,
        status: row.get::<String, _>("status").parse()?,
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        message: row.get("message"),
        documents_processed: row.get("documents_processed"),
        documents_failed: row.get("documents_failed"),
        last_commit: row.get("last_commit"),
    })
}

async fn insert_chunks(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    version_id: &str,
    chunks: &[DocChunk],
) -> Result<()> {
    sqlx::query("DELETE FROM doc_chunks WHERE version_id = ?")
        .bind(version_id)
        .execute(&mut **tx)
        .await?;

    for chunk in chunks {
        sqlx::query(
            "INSERT INTO doc_chunks (id, version_id, chunk_index, heading_path, content, token_count) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(version_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.heading_path)
        .bind(&chunk.content)
        .bind(chunk.token_count)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl DocStore for SqliteStore {
    async fn insert_repository(&self, repo: &Repository) -> Result<()> {
        sqlx::query(
            "INSERT INTO repositories (id, project_id, name, url, default_branch, \
             last_synced_commit, last_synced_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&repo.id)
        .bind(&repo.project_id)
        .bind(&repo.name)
        .bind(&repo.url)
        .bind(&repo.default_branch)
        .bind(&repo.last_synced_commit)
        .bind(repo.last_synced_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_repository(&self, id: &str) -> Result<Option<Repository>> {
        let row = sqlx::query("SELECT * FROM repositories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_repository))
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        let rows = sqlx::query("SELECT * FROM repositories ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_repository).collect())
    }

    async fn record_sync(&self, repository_id: &str, commit: &str, at: i64) -> Result<()> {
        sqlx::query(
            "UPDATE repositories SET last_synced_commit = ?, last_synced_at = ? WHERE id = ?",
        )
        .bind(commit)
        .bind(at)
        .bind(repository_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn get_document_by_path(
        &self,
        repository_id: &str,
        path: &str,
    ) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE repository_id = ? AND path = ?"
        ))
        .bind(repository_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents(
        &self,
        repository_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE repository_id = ? AND (? OR deleted = 0) ORDER BY path"
        ))
        .bind(repository_id)
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        upsert_document_with(&self.pool, doc).await
    }

    async fn get_version(&self, id: &str) -> Result<Option<DocumentVersion>> {
        let row = sqlx::query(&format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_version))
    }

    async fn find_version_by_hash(
        &self,
        document_id: &str,
        content_hash: &str,
    ) -> Result<Option<DocumentVersion>> {
        let row = sqlx::query(&format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions \
             WHERE document_id = ? AND content_hash = ? ORDER BY created_at ASC, rowid ASC LIMIT 1"
        ))
        .bind(document_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_version))
    }

    async fn count_versions(&self, document_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_versions WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn commit_version(
        &self,
        doc: &Document,
        version: &DocumentVersion,
        chunks: &[DocChunk],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        upsert_document_with(&mut *tx, doc).await?;

        sqlx::query(&format!(
            "INSERT INTO document_versions ({VERSION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&version.id)
        .bind(&version.document_id)
        .bind(&version.commit_sha)
        .bind(&version.content)
        .bind(&version.content_hash)
        .bind(&version.author_name)
        .bind(&version.author_email)
        .bind(version.committed_at)
        .bind(&version.message)
        .bind(version.created_at)
        .execute(&mut *tx)
        .await?;

        insert_chunks(&mut tx, &version.id, chunks).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn chunks_for_version(&self, version_id: &str) -> Result<Vec<DocChunk>> {
        let rows = sqlx::query(
            "SELECT id, version_id, chunk_index, heading_path, content, token_count \
             FROM doc_chunks WHERE version_id = ? ORDER BY chunk_index ASC",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn chunk_context(&self, chunk_id: &str) -> Result<Option<ChunkContext>> {
        let row = sqlx::query(&format!(
            "{CONTEXT_SELECT} WHERE c.id = ? AND d.deleted = 0"
        ))
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_context))
    }

    async fn current_chunks(&self, project_id: &str) -> Result<Vec<ChunkContext>> {
        let rows = sqlx::query(&format!(
            "{CONTEXT_SELECT} WHERE r.project_id = ? AND d.deleted = 0 \
             ORDER BY d.path, c.chunk_index"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_context).collect())
    }

    async fn replace_links(
        &self,
        source_document_id: &str,
        links: &[DocumentLink],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM document_links WHERE source_document_id = ?")
            .bind(source_document_id)
            .execute(&mut *tx)
            .await?;

        for link in links {
            sqlx::query(
                "INSERT INTO document_links (id, source_document_id, target_document_id, target, \
                 link_type, broken) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&link.id)
            .bind(&link.source_document_id)
            .bind(&link.target_document_id)
            .bind(&link.target)
            .bind(link.link_type.as_str())
            .bind(link.broken)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn links_for_repository(&self, repository_id: &str) -> Result<Vec<DocumentLink>> {
        let rows = sqlx::query(
            "SELECT l.id, l.source_document_id, l.target_document_id, l.target, l.link_type, l.broken \
             FROM document_links l JOIN documents d ON d.id = l.source_document_id \
             WHERE d.repository_id = ? ORDER BY l.rowid",
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_link).collect()
    }

    async fn update_link_target(
        &self,
        link_id: &str,
        target_document_id: Option<&str>,
        broken: bool,
    ) -> Result<()> {
        sqlx::query("UPDATE document_links SET target_document_id = ?, broken = ? WHERE id = ?")
            .bind(target_document_id)
            .bind(broken)
            .bind(link_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn keyword_search(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // SQLite's lower() only folds ASCII, so the SQL filter is a prefilter
        // for ASCII queries; the snippet builder makes the final decision.
        let ascii = query.is_ascii();
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.path, d.title, v.commit_sha, v.content
            FROM documents d
            JOIN repositories r ON r.id = d.repository_id
            JOIN document_versions v ON v.id = d.latest_version_id
            WHERE r.project_id = ? AND d.deleted = 0
              AND (? = 0 OR instr(lower(v.content), lower(?)) > 0)
            ORDER BY d.path, d.id
            "#,
        )
        .bind(project_id)
        .bind(ascii)
        .bind(query.trim())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let content: String = row.get("content");
                let snippet = keyword_snippet(&content, query)?;
                Some(SearchResult {
                    document_id: row.get("id"),
                    path: row.get("path"),
                    title: row.get("title"),
                    commit_sha: row.get("commit_sha"),
                    chunk_id: None,
                    heading_path: None,
                    score: KEYWORD_PLACEHOLDER_SCORE,
                    snippet,
                })
            })
            .take(limit)
            .collect())
    }

    async fn insert_job(&self, job: &SyncJob) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO sync_jobs ({JOB_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&job.id)
        .bind(&job.repository_id)
        .bind(job.mode.as_str())
        .bind(job.status.as_str())
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(&job.message)
        .bind(job.documents_processed)
        .bind(job.documents_failed)
        .bind(&job.last_commit)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_job(&self, job: &SyncJob) -> Result<()> {
        sqlx::query(
            "UPDATE sync_jobs SET status = ?, finished_at = ?, message = ?, \
             documents_processed = ?, documents_failed = ?, last_commit = ? WHERE id = ?",
        )
        .bind(job.status.as_str())
        .bind(job.finished_at)
        .bind(&job.message)
        .bind(job.documents_processed)
        .bind(job.documents_failed)
        .bind(&job.last_commit)
        .bind(&job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<SyncJob>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn list_jobs(&self, repository_id: &str) -> Result<Vec<SyncJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs WHERE repository_id = ? \
             ORDER BY started_at DESC, rowid DESC"
        ))
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }
}

async fn upsert_document_with<'e, E>(executor: E, doc: &Document) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(&format!(
        r#"
        INSERT INTO documents ({DOCUMENT_COLUMNS})
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            doc_type = excluded.doc_type,
            title = excluded.title,
            latest_commit = excluded.latest_commit,
            latest_version_id = excluded.latest_version_id,
            deleted = excluded.deleted,
            updated_at = excluded.updated_at
        "#
    ))
    .bind(&doc.id)
    .bind(&doc.repository_id)
    .bind(&doc.path)
    .bind(doc.doc_type.as_str())
    .bind(&doc.title)
    .bind(&doc.latest_commit)
    .bind(&doc.latest_version_id)
    .bind(doc.deleted)
    .bind(doc.created_at)
    .bind(doc.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmirror_core::models::DocType;

    async fn store() -> (tempfile::TempDir, SqliteStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("s.sqlite"))
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        let store = SqliteStore::new(pool);
        store
            .insert_repository(&Repository {
                id: "r1".into(),
                project_id: "p1".into(),
                name: "demo".into(),
                url: "/tmp/demo".into(),
                default_branch: "main".into(),
                last_synced_commit: None,
                last_synced_at: None,
            })
            .await
            .unwrap();
        (tmp, store)
    }

    fn version(doc: &str, id: &str, commit: &str) -> DocumentVersion {
        DocumentVersion {
            id: id.into(),
            document_id: doc.into(),
            commit_sha: commit.into(),
            content: "# A\nbody".into(),
            content_hash: format!("hash-{id}"),
            author_name: "dev".into(),
            author_email: "dev@example.com".into(),
            committed_at: 0,
            message: "docs".into(),
            created_at: 0,
        }
    }

    fn document(id: &str, latest_version: &str) -> Document {
        Document {
            id: id.into(),
            repository_id: "r1".into(),
            path: "docs/a.md".into(),
            doc_type: DocType::Documentation,
            title: "A".into(),
            latest_commit: "c1".into(),
            latest_version_id: Some(latest_version.into()),
            deleted: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn chunk(id: &str, version_id: &str, index: i64) -> DocChunk {
        DocChunk {
            id: id.into(),
            version_id: version_id.into(),
            chunk_index: index,
            heading_path: Some("A".into()),
            content: "body".into(),
            token_count: 1,
        }
    }

    #[tokio::test]
    async fn commit_version_writes_document_version_and_chunks() {
        let (_tmp, store) = store().await;
        store
            .commit_version(
                &document("d1", "v1"),
                &version("d1", "v1", "c1"),
                &[chunk("k1", "v1", 0), chunk("k2", "v1", 1)],
            )
            .await
            .unwrap();

        assert!(store.get_document("d1").await.unwrap().is_some());
        assert_eq!(store.count_versions("d1").await.unwrap(), 1);
        let ids: Vec<String> = store
            .chunks_for_version("v1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["k1", "k2"]);
    }

    #[tokio::test]
    async fn failed_chunk_write_leaves_no_partial_version() {
        let (_tmp, store) = store().await;
        // Second chunk reuses the first chunk's id and violates the key.
        let err = store
            .commit_version(
                &document("d1", "v1"),
                &version("d1", "v1", "c1"),
                &[chunk("k1", "v1", 0), chunk("k1", "v1", 1)],
            )
            .await;
        assert!(err.is_err());

        assert!(store.get_document("d1").await.unwrap().is_none());
        assert!(store.get_version("v1").await.unwrap().is_none());
        assert!(store.chunks_for_version("v1").await.unwrap().is_empty());
    }
}
