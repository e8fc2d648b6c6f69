use anyhow::Result;
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS repositories (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        name TEXT NOT NULL,
        url TEXT NOT NULL,
        default_branch TEXT NOT NULL,
        last_synced_commit TEXT,
        last_synced_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        repository_id TEXT NOT NULL,
        path TEXT NOT NULL,
        doc_type TEXT NOT NULL,
        title TEXT NOT NULL,
        latest_commit TEXT NOT NULL,
        latest_version_id TEXT,
        deleted INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE(repository_id, path),
        FOREIGN KEY (repository_id) REFERENCES repositories(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS document_versions (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        commit_sha TEXT NOT NULL,
        content TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        author_name TEXT NOT NULL,
        author_email TEXT NOT NULL,
        committed_at INTEGER NOT NULL,
        message TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE(document_id, commit_sha),
        FOREIGN KEY (document_id) REFERENCES documents(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS doc_chunks (
        id TEXT PRIMARY KEY,
        version_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        heading_path TEXT,
        content TEXT NOT NULL,
        token_count INTEGER NOT NULL,
        UNIQUE(version_id, chunk_index),
        FOREIGN KEY (version_id) REFERENCES document_versions(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS document_links (
        id TEXT PRIMARY KEY,
        source_document_id TEXT NOT NULL,
        target_document_id TEXT,
        target TEXT NOT NULL,
        link_type TEXT NOT NULL,
        broken INTEGER NOT NULL,
        FOREIGN KEY (source_document_id) REFERENCES documents(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sync_jobs (
        id TEXT PRIMARY KEY,
        repository_id TEXT NOT NULL,
        mode TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        finished_at INTEGER,
        message TEXT,
        documents_processed INTEGER NOT NULL DEFAULT 0,
        documents_failed INTEGER NOT NULL DEFAULT 0,
        last_commit TEXT,
        FOREIGN KEY (repository_id) REFERENCES repositories(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chunk_vectors (
        chunk_id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        model TEXT NOT NULL,
        dims INTEGER NOT NULL,
        content_hash TEXT NOT NULL,
        embedding BLOB NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS graph_documents (
        project_id TEXT NOT NULL,
        document_id TEXT NOT NULL,
        path TEXT NOT NULL,
        title TEXT NOT NULL,
        PRIMARY KEY (project_id, document_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS graph_chunks (
        project_id TEXT NOT NULL,
        chunk_id TEXT NOT NULL,
        document_id TEXT NOT NULL,
        heading_path TEXT,
        content TEXT NOT NULL,
        PRIMARY KEY (project_id, chunk_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS graph_entities (
        project_id TEXT NOT NULL,
        name TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (project_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS graph_mentions (
        project_id TEXT NOT NULL,
        chunk_id TEXT NOT NULL,
        entity_name TEXT NOT NULL,
        PRIMARY KEY (project_id, chunk_id, entity_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS graph_relations (
        project_id TEXT NOT NULL,
        source TEXT NOT NULL,
        target TEXT NOT NULL,
        relation_type TEXT NOT NULL,
        PRIMARY KEY (project_id, source, target, relation_type)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_documents_repository ON documents(repository_id)",
    "CREATE INDEX IF NOT EXISTS idx_versions_document_hash ON document_versions(document_id, content_hash)",
    "CREATE INDEX IF NOT EXISTS idx_chunks_version ON doc_chunks(version_id)",
    "CREATE INDEX IF NOT EXISTS idx_links_source ON document_links(source_document_id)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_repository ON sync_jobs(repository_id, started_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_vectors_project ON chunk_vectors(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_vectors_document ON chunk_vectors(document_id)",
    "CREATE INDEX IF NOT EXISTS idx_graph_chunks_document ON graph_chunks(project_id, document_id)",
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='graph_chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE graph_chunks_fts USING fts5(
                chunk_id UNINDEXED,
                project_id UNINDEXED,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("m.sqlite"))
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN \
             ('documents', 'document_versions', 'doc_chunks', 'graph_chunks_fts')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 4);
    }
}
