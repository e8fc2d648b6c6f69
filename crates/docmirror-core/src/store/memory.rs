//! In-memory [`DocStore`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Chunk replacement
//! swaps a version's whole chunk vector under one write lock, so readers
//! never see a partial set.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{
    ChunkContext, DocChunk, Document, DocumentLink, DocumentVersion, Repository, SearchResult,
    SyncJob,
};
use crate::search::{keyword_snippet, KEYWORD_PLACEHOLDER_SCORE};

use super::DocStore;

#[derive(Default)]
struct State {
    repositories: Vec<Repository>,
    documents: HashMap<String, Document>,
    versions: HashMap<String, DocumentVersion>,
    chunks: HashMap<String, Vec<DocChunk>>,
    links: Vec<DocumentLink>,
    jobs: Vec<SyncJob>,
}

impl State {
    fn project_of(&self, repository_id: &str) -> Option<&str> {
        self.repositories
            .iter()
            .find(|r| r.id == repository_id)
            .map(|r| r.project_id.as_str())
    }

    fn context_for(&self, chunk: &DocChunk) -> Option<ChunkContext> {
        let version = self.versions.get(&chunk.version_id)?;
        let doc = self.documents.get(&version.document_id)?;
        if doc.deleted || doc.latest_version_id.as_deref() != Some(version.id.as_str()) {
            return None;
        }
        Some(ChunkContext {
            chunk: chunk.clone(),
            document_id: doc.id.clone(),
            project_id: self.project_of(&doc.repository_id)?.to_string(),
            path: doc.path.clone(),
            title: doc.title.clone(),
            commit_sha: version.commit_sha.clone(),
        })
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| anyhow!("store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| anyhow!("store lock poisoned"))
    }
}

#[async_trait]
impl DocStore for InMemoryStore {
    async fn insert_repository(&self, repo: &Repository) -> Result<()> {
        let mut state = self.write()?;
        if state.repositories.iter().any(|r| r.id == repo.id) {
            return Err(anyhow!("repository {} already exists", repo.id));
        }
        state.repositories.push(repo.clone());
        Ok(())
    }

    async fn get_repository(&self, id: &str) -> Result<Option<Repository>> {
        Ok(self.read()?.repositories.iter().find(|r| r.id == id).cloned())
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        let mut repos = self.read()?.repositories.clone();
        repos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(repos)
    }

    async fn record_sync(&self, repository_id: &str, commit: &str, at: i64) -> Result<()> {
        let mut state = self.write()?;
        let repo = state
            .repositories
            .iter_mut()
            .find(|r| r.id == repository_id)
            .ok_or_else(|| anyhow!("unknown repository {}", repository_id))?;
        repo.last_synced_commit = Some(commit.to_string());
        repo.last_synced_at = Some(at);
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.get(id).cloned())
    }

    async fn get_document_by_path(
        &self,
        repository_id: &str,
        path: &str,
    ) -> Result<Option<Document>> {
        Ok(self
            .read()?
            .documents
            .values()
            .find(|d| d.repository_id == repository_id && d.path == path)
            .cloned())
    }

    async fn list_documents(
        &self,
        repository_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .read()?
            .documents
            .values()
            .filter(|d| d.repository_id == repository_id && (include_deleted || !d.deleted))
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(docs)
    }

    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        self.write()?.documents.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_version(&self, id: &str) -> Result<Option<DocumentVersion>> {
        Ok(self.read()?.versions.get(id).cloned())
    }

    async fn find_version_by_hash(
        &self,
        document_id: &str,
        content_hash: &str,
    ) -> Result<Option<DocumentVersion>> {
        Ok(self
            .read()?
            .versions
            .values()
            .filter(|v| v.document_id == document_id && v.content_hash == content_hash)
            .min_by_key(|v| v.created_at)
            .cloned())
    }

    async fn count_versions(&self, document_id: &str) -> Result<i64> {
        Ok(self
            .read()?
            .versions
            .values()
            .filter(|v| v.document_id == document_id)
            .count() as i64)
    }

    async fn commit_version(
        &self,
        doc: &Document,
        version: &DocumentVersion,
        chunks: &[DocChunk],
    ) -> Result<()> {
        let mut state = self.write()?;
        let clash = state
            .versions
            .values()
            .any(|v| v.document_id == version.document_id && v.commit_sha == version.commit_sha);
        if clash {
            return Err(anyhow!(
                "version for document {} at commit {} already exists",
                version.document_id,
                version.commit_sha
            ));
        }
        state.documents.insert(doc.id.clone(), doc.clone());
        state.versions.insert(version.id.clone(), version.clone());
        state.chunks.insert(version.id.clone(), chunks.to_vec());
        Ok(())
    }

    async fn chunks_for_version(&self, version_id: &str) -> Result<Vec<DocChunk>> {
        let mut chunks = self
            .read()?
            .chunks
            .get(version_id)
            .cloned()
            .unwrap_or_default();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn chunk_context(&self, chunk_id: &str) -> Result<Option<ChunkContext>> {
        let state = self.read()?;
        Ok(state
            .chunks
            .values()
            .flatten()
            .find(|c| c.id == chunk_id)
            .and_then(|c| state.context_for(c)))
    }

    async fn current_chunks(&self, project_id: &str) -> Result<Vec<ChunkContext>> {
        let state = self.read()?;
        let mut out: Vec<ChunkContext> = state
            .chunks
            .values()
            .flatten()
            .filter_map(|c| state.context_for(c))
            .filter(|ctx| ctx.project_id == project_id)
            .collect();
        out.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        Ok(out)
    }

    async fn replace_links(
        &self,
        source_document_id: &str,
        links: &[DocumentLink],
    ) -> Result<()> {
        let mut state = self.write()?;
        state
            .links
            .retain(|l| l.source_document_id != source_document_id);
        state.links.extend_from_slice(links);
        Ok(())
    }

    async fn links_for_repository(&self, repository_id: &str) -> Result<Vec<DocumentLink>> {
        let state = self.read()?;
        Ok(state
            .links
            .iter()
            .filter(|l| {
                state
                    .documents
                    .get(&l.source_document_id)
                    .is_some_and(|d| d.repository_id == repository_id)
            })
            .cloned()
            .collect())
    }

    async fn update_link_target(
        &self,
        link_id: &str,
        target_document_id: Option<&str>,
        broken: bool,
    ) -> Result<()> {
        let mut state = self.write()?;
        if let Some(link) = state.links.iter_mut().find(|l| l.id == link_id) {
            link.target_document_id = target_document_id.map(str::to_string);
            link.broken = broken;
        }
        Ok(())
    }

    async fn keyword_search(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let state = self.read()?;
        let mut docs: Vec<&Document> = state
            .documents
            .values()
            .filter(|d| !d.deleted && state.project_of(&d.repository_id) == Some(project_id))
            .collect();
        docs.sort_by(|a, b| a.path.cmp(&b.path));

        let mut results = Vec::new();
        for doc in docs {
            let Some(version) = doc
                .latest_version_id
                .as_ref()
                .and_then(|id| state.versions.get(id))
            else {
                continue;
            };
            if let Some(snippet) = keyword_snippet(&version.content, query) {
                results.push(SearchResult {
                    document_id: doc.id.clone(),
                    path: doc.path.clone(),
                    title: Some(doc.title.clone()),
                    commit_sha: version.commit_sha.clone(),
                    chunk_id: None,
                    heading_path: None,
                    score: KEYWORD_PLACEHOLDER_SCORE,
                    snippet,
                });
                if results.len() >= limit {
                    break;
                }
            }
        }
        Ok(results)
    }

    async fn insert_job(&self, job: &SyncJob) -> Result<()> {
        self.write()?.jobs.push(job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &SyncJob) -> Result<()> {
        let mut state = self.write()?;
        let slot = state
            .jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| anyhow!("unknown sync job {}", job.id))?;
        *slot = job.clone();
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<SyncJob>> {
        Ok(self.read()?.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list_jobs(&self, repository_id: &str) -> Result<Vec<SyncJob>> {
        let mut jobs: Vec<SyncJob> = self
            .read()?
            .jobs
            .iter()
            .filter(|j| j.repository_id == repository_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(jobs)
    }
}
