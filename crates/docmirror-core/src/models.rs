//! Core data models for the document mirror.
//!
//! These types describe the persisted knowledge base (repositories,
//! documents, versions, chunks, links, sync jobs) and the transient
//! values exchanged between the git layer, the ingestion pipeline, and
//! the search engine.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Classification of a documentation file, decided by the first matching
/// scanner pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocType {
    Readme,
    Adr,
    Architecture,
    ApiSpec,
    Changelog,
    Contributing,
    Documentation,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Readme => "README",
            DocType::Adr => "ADR",
            DocType::Architecture => "ARCHITECTURE",
            DocType::ApiSpec => "API_SPEC",
            DocType::Changelog => "CHANGELOG",
            DocType::Contributing => "CONTRIBUTING",
            DocType::Documentation => "DOCUMENTATION",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "README" => DocType::Readme,
            "ADR" => DocType::Adr,
            "ARCHITECTURE" => DocType::Architecture,
            "API_SPEC" => DocType::ApiSpec,
            "CHANGELOG" => DocType::Changelog,
            "CONTRIBUTING" => DocType::Contributing,
            "DOCUMENTATION" => DocType::Documentation,
            other => bail!("unknown document type: {}", other),
        })
    }
}

/// Kind of change reported by a tree diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "ADDED",
            ChangeKind::Modified => "MODIFIED",
            ChangeKind::Deleted => "DELETED",
            ChangeKind::Renamed => "RENAMED",
        }
    }
}

/// One entry of a tree diff between two commits.
///
/// For [`ChangeKind::Deleted`], `path` is the pre-image path. For
/// [`ChangeKind::Renamed`], `old_path` carries the pre-image path and
/// `path` the post-image path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub path: String,
    pub old_path: Option<String>,
}

/// Commit summary produced by the commit walker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub sha: String,
    pub author_name: String,
    pub author_email: String,
    pub committed_at: DateTime<Utc>,
    /// Commit subject line.
    pub message: String,
    pub parents: Vec<String>,
}

/// How a sync enumerates candidate paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMode {
    /// Rescan every documentation file at the target commit.
    Full,
    /// Diff from the last synced commit to the target.
    Incremental,
    /// Apply only the changes introduced by one commit.
    SpecificCommit,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "FULL",
            SyncMode::Incremental => "INCREMENTAL",
            SyncMode::SpecificCommit => "SPECIFIC_COMMIT",
        }
    }
}

impl FromStr for SyncMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "full" => SyncMode::Full,
            "incremental" => SyncMode::Incremental,
            "specific_commit" | "commit" => SyncMode::SpecificCommit,
            other => bail!(
                "unknown sync mode: '{}'. Use full, incremental, or commit.",
                other
            ),
        })
    }
}

/// Lifecycle state of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "RUNNING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            other => bail!("unknown job status: {}", other),
        })
    }
}

/// A registered Git repository, scoped to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub id: String,
    pub project_id: String,
    pub name: String,
    /// Clone URL or local path.
    pub url: String,
    pub default_branch: String,
    pub last_synced_commit: Option<String>,
    pub last_synced_at: Option<i64>,
}

/// A documentation file tracked across commits, unique per (repository, path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub id: String,
    pub repository_id: String,
    pub path: String,
    pub doc_type: DocType,
    pub title: String,
    pub latest_commit: String,
    pub latest_version_id: Option<String>,
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Immutable snapshot of a document's content at a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentVersion {
    pub id: String,
    pub document_id: String,
    pub commit_sha: String,
    pub content: String,
    pub content_hash: String,
    pub author_name: String,
    pub author_email: String,
    pub committed_at: i64,
    pub message: String,
    pub created_at: i64,
}

/// A heading-scoped slice of a version, as produced by the chunker.
///
/// Drafts carry no identity; the store assigns ids when the chunk set
/// is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub chunk_index: i64,
    /// Breadcrumb such as `"Guide > Install > Linux"`; `None` for content
    /// preceding the first heading.
    pub heading_path: Option<String>,
    pub content: String,
    pub token_count: i64,
}

/// A persisted chunk, unique per (version, chunk index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocChunk {
    pub id: String,
    pub version_id: String,
    pub chunk_index: i64,
    pub heading_path: Option<String>,
    pub content: String,
    pub token_count: i64,
}

impl DocChunk {
    pub fn from_draft(version_id: &str, draft: ChunkDraft) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            version_id: version_id.to_string(),
            chunk_index: draft.chunk_index,
            heading_path: draft.heading_path,
            content: draft.content,
            token_count: draft.token_count,
        }
    }
}

/// Kind of a link found in document content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkType {
    Internal,
    Wiki,
    External,
    Anchor,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Internal => "INTERNAL",
            LinkType::Wiki => "WIKI",
            LinkType::External => "EXTERNAL",
            LinkType::Anchor => "ANCHOR",
        }
    }
}

impl FromStr for LinkType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "INTERNAL" => LinkType::Internal,
            "WIKI" => LinkType::Wiki,
            "EXTERNAL" => LinkType::External,
            "ANCHOR" => LinkType::Anchor,
            other => bail!("unknown link type: {}", other),
        })
    }
}

/// Directed edge between two documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentLink {
    pub id: String,
    pub source_document_id: String,
    pub target_document_id: Option<String>,
    /// Link target exactly as written in the source.
    pub target: String,
    pub link_type: LinkType,
    pub broken: bool,
}

/// Persisted record of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncJob {
    pub id: String,
    pub repository_id: String,
    pub mode: SyncMode,
    pub status: JobStatus,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub message: Option<String>,
    pub documents_processed: i64,
    pub documents_failed: i64,
    pub last_commit: Option<String>,
}

/// A ranked hit returned by any retrieval strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub document_id: String,
    pub path: String,
    pub title: Option<String>,
    /// Commit of the version the hit was found in.
    pub commit_sha: String,
    pub chunk_id: Option<String>,
    pub heading_path: Option<String>,
    pub score: f64,
    pub snippet: String,
}

impl SearchResult {
    /// Identity used for fusion: the chunk id when present, else the document id.
    pub fn identity(&self) -> &str {
        self.chunk_id.as_deref().unwrap_or(&self.document_id)
    }
}

/// A chunk joined with its version, document, and repository, used to
/// re-hydrate hits coming from the vector and graph stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkContext {
    pub chunk: DocChunk,
    pub document_id: String,
    pub project_id: String,
    pub path: String,
    pub title: String,
    pub commit_sha: String,
}

/// Deterministic SHA-256 digest of a version's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_hex() {
        let a = content_hash("# A\ncontent");
        let b = content_hash("# A\ncontent");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("# A\ncontent!"));
    }

    #[test]
    fn sync_mode_parses_cli_aliases() {
        assert_eq!("full".parse::<SyncMode>().unwrap(), SyncMode::Full);
        assert_eq!(
            "INCREMENTAL".parse::<SyncMode>().unwrap(),
            SyncMode::Incremental
        );
        assert_eq!(
            "commit".parse::<SyncMode>().unwrap(),
            SyncMode::SpecificCommit
        );
        assert!("nope".parse::<SyncMode>().is_err());
    }

    #[test]
    fn identity_prefers_chunk_id() {
        let mut r = SearchResult {
            document_id: "d1".into(),
            path: "docs/a.md".into(),
            title: None,
            commit_sha: "c1".into(),
            chunk_id: None,
            heading_path: None,
            score: 1.0,
            snippet: String::new(),
        };
        assert_eq!(r.identity(), "d1");
        r.chunk_id = Some("k1".into());
        assert_eq!(r.identity(), "k1");
    }

    #[test]
    fn doc_type_round_trips_through_str() {
        for t in [
            DocType::Readme,
            DocType::Adr,
            DocType::Architecture,
            DocType::ApiSpec,
            DocType::Changelog,
            DocType::Contributing,
            DocType::Documentation,
        ] {
            assert_eq!(t.as_str().parse::<DocType>().unwrap(), t);
        }
    }
}
