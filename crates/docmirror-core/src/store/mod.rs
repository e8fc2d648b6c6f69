//! Storage abstraction for docmirror.
//!
//! The [`DocStore`] trait covers every persisted entity the ingestion
//! pipeline owns (repositories, documents, versions, chunks, links, sync
//! jobs) plus keyword search over the latest version of each document.
//! [`vector::VectorStore`] holds chunk embeddings.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod vector;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    ChunkContext, DocChunk, Document, DocumentLink, DocumentVersion, Repository, SearchResult,
    SyncJob,
};

/// Abstract persistence backend for the document mirror.
///
/// # Atomicity
///
/// [`commit_version`](DocStore::commit_version) must be atomic: a reader
/// sees either no trace of the new version or the version together with
/// its complete chunk set, never a partial write.
#[async_trait]
pub trait DocStore: Send + Sync {
    // Repositories

    async fn insert_repository(&self, repo: &Repository) -> Result<()>;
    async fn get_repository(&self, id: &str) -> Result<Option<Repository>>;
    async fn list_repositories(&self) -> Result<Vec<Repository>>;
    /// Record the last successfully synced commit.
    async fn record_sync(&self, repository_id: &str, commit: &str, at: i64) -> Result<()>;

    // Documents

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;
    async fn get_document_by_path(
        &self,
        repository_id: &str,
        path: &str,
    ) -> Result<Option<Document>>;
    async fn list_documents(
        &self,
        repository_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Document>>;
    /// Insert or update a document row by id.
    async fn upsert_document(&self, doc: &Document) -> Result<()>;

    // Versions

    async fn get_version(&self, id: &str) -> Result<Option<DocumentVersion>>;
    async fn find_version_by_hash(
        &self,
        document_id: &str,
        content_hash: &str,
    ) -> Result<Option<DocumentVersion>>;
    async fn count_versions(&self, document_id: &str) -> Result<i64>;
    /// Atomically upsert `doc`, insert `version`, and write its chunk set.
    async fn commit_version(
        &self,
        doc: &Document,
        version: &DocumentVersion,
        chunks: &[DocChunk],
    ) -> Result<()>;

    // Chunks

    async fn chunks_for_version(&self, version_id: &str) -> Result<Vec<DocChunk>>;
    /// Re-hydrate a chunk with its document, repository, and version data.
    ///
    /// Returns `None` when the chunk is unknown, belongs to a version that
    /// is no longer its document's latest, or its document is deleted.
    async fn chunk_context(&self, chunk_id: &str) -> Result<Option<ChunkContext>>;
    /// Chunks of the latest version of every live document in a project.
    async fn current_chunks(&self, project_id: &str) -> Result<Vec<ChunkContext>>;

    // Links

    /// Replace all outgoing links of a document.
    async fn replace_links(&self, source_document_id: &str, links: &[DocumentLink])
        -> Result<()>;
    async fn links_for_repository(&self, repository_id: &str) -> Result<Vec<DocumentLink>>;
    async fn update_link_target(
        &self,
        link_id: &str,
        target_document_id: Option<&str>,
        broken: bool,
    ) -> Result<()>;

    // Keyword search

    /// Case-insensitive substring match over the latest version of every
    /// live document in a project. Results carry a snippet around the first
    /// match and a placeholder score.
    async fn keyword_search(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>>;

    // Sync jobs

    async fn insert_job(&self, job: &SyncJob) -> Result<()>;
    async fn update_job(&self, job: &SyncJob) -> Result<()>;
    async fn get_job(&self, id: &str) -> Result<Option<SyncJob>>;
    async fn list_jobs(&self, repository_id: &str) -> Result<Vec<SyncJob>>;
}
