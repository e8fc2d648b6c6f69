//! Content-hash deduplicated document ingestion.
//!
//! [`ingest_document`] applies one file's content at a commit to the store:
//!
//! - unknown path: create the document, its first version, and chunks;
//! - content hash not seen before for this document: create a new version
//!   and its chunk set in one atomic [`DocStore::commit_version`];
//! - content hash matches an earlier version: move the document's pointers
//!   to that version and commit, writing no version or chunk rows;
//! - pointers already current: write nothing.
//!
//! Per-commit provenance for unchanged content is therefore not recorded;
//! only the commit pointer advances.

use anyhow::Result;

use crate::chunk::chunk_document;
use crate::links::extract_document_links;
use crate::models::{content_hash, CommitInfo, DocChunk, DocType, Document, DocumentVersion};
use crate::parser;
use crate::store::DocStore;

/// One file's content at a target commit.
#[derive(Debug, Clone)]
pub struct DocumentInput<'a> {
    pub repository_id: &'a str,
    pub path: &'a str,
    pub doc_type: DocType,
    pub content: &'a str,
    /// Commit the sync is applying.
    pub commit_sha: &'a str,
    /// Last commit touching the path at or before `commit_sha`.
    pub provenance: Option<&'a CommitInfo>,
    pub max_tokens: usize,
    pub now: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// A new version and chunk set were written.
    NewVersion {
        document: Document,
        version_id: String,
    },
    /// Content matched an existing version; only document pointers moved.
    PointerAdvanced {
        document: Document,
        /// True when the current version changed (a revert to older content
        /// or a restored document).
        version_changed: bool,
    },
    /// Nothing was written.
    Unchanged,
}

/// Apply one document's content to the store.
pub async fn ingest_document(
    store: &dyn DocStore,
    input: &DocumentInput<'_>,
) -> Result<IngestOutcome> {
    let hash = content_hash(input.content);
    let parsed = parser::parse(input.content);

    let existing = store
        .get_document_by_path(input.repository_id, input.path)
        .await?;

    let mut document = match existing {
        Some(doc) => doc,
        None => Document {
            id: uuid::Uuid::new_v4().to_string(),
            repository_id: input.repository_id.to_string(),
            path: input.path.to_string(),
            doc_type: input.doc_type,
            title: parsed.title.clone(),
            latest_commit: input.commit_sha.to_string(),
            latest_version_id: None,
            deleted: false,
            created_at: input.now,
            updated_at: input.now,
        },
    };

    if let Some(version) = store.find_version_by_hash(&document.id, &hash).await? {
        let is_current = document.latest_version_id.as_deref() == Some(version.id.as_str());
        if is_current && !document.deleted && document.latest_commit == input.commit_sha {
            return Ok(IngestOutcome::Unchanged);
        }
        let version_changed = !is_current || document.deleted;

        document.latest_commit = input.commit_sha.to_string();
        document.latest_version_id = Some(version.id.clone());
        document.deleted = false;
        document.title = parsed.title;
        document.doc_type = input.doc_type;
        document.updated_at = input.now;
        store.upsert_document(&document).await?;

        if version_changed {
            let links = extract_document_links(&document, input.content);
            store.replace_links(&document.id, &links).await?;
        }
        return Ok(IngestOutcome::PointerAdvanced {
            document,
            version_changed,
        });
    }

    let version = DocumentVersion {
        id: uuid::Uuid::new_v4().to_string(),
        document_id: document.id.clone(),
        commit_sha: input.commit_sha.to_string(),
        content: input.content.to_string(),
        content_hash: hash,
        author_name: input
            .provenance
            .map(|c| c.author_name.clone())
            .unwrap_or_default(),
        author_email: input
            .provenance
            .map(|c| c.author_email.clone())
            .unwrap_or_default(),
        committed_at: input
            .provenance
            .map(|c| c.committed_at.timestamp())
            .unwrap_or(input.now),
        message: input
            .provenance
            .map(|c| c.message.clone())
            .unwrap_or_default(),
        created_at: input.now,
    };

    let chunks: Vec<DocChunk> = chunk_document(input.content, input.max_tokens)
        .into_iter()
        .map(|draft| DocChunk::from_draft(&version.id, draft))
        .collect();

    document.latest_commit = input.commit_sha.to_string();
    document.latest_version_id = Some(version.id.clone());
    document.deleted = false;
    document.title = parsed.title;
    document.doc_type = input.doc_type;
    document.updated_at = input.now;

    store.commit_version(&document, &version, &chunks).await?;

    let links = extract_document_links(&document, input.content);
    store.replace_links(&document.id, &links).await?;

    Ok(IngestOutcome::NewVersion {
        document,
        version_id: version.id,
    })
}

/// Soft-delete the document at `path`, if it exists and is live.
///
/// Returns the retired document when a row was written.
pub async fn soft_delete(
    store: &dyn DocStore,
    repository_id: &str,
    path: &str,
    commit_sha: &str,
    now: i64,
) -> Result<Option<Document>> {
    let Some(mut doc) = store.get_document_by_path(repository_id, path).await? else {
        return Ok(None);
    };
    if doc.deleted {
        return Ok(None);
    }
    doc.deleted = true;
    doc.latest_commit = commit_sha.to_string();
    doc.updated_at = now;
    store.upsert_document(&doc).await?;
    Ok(Some(doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn input<'a>(content: &'a str, commit: &'a str) -> DocumentInput<'a> {
        DocumentInput {
            repository_id: "r1",
            path: "docs/a.md",
            doc_type: DocType::Documentation,
            content,
            commit_sha: commit,
            provenance: None,
            max_tokens: 512,
            now: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn first_ingest_creates_document_version_and_chunks() {
        let store = InMemoryStore::new();
        let outcome = ingest_document(&store, &input("# A\ncontent", "c1"))
            .await
            .unwrap();
        let IngestOutcome::NewVersion {
            document,
            version_id,
        } = outcome
        else {
            panic!("expected a new version");
        };
        assert_eq!(document.title, "A");
        assert_eq!(document.latest_commit, "c1");

        let version = store.get_version(&version_id).await.unwrap().unwrap();
        assert_eq!(version.commit_sha, "c1");
        let chunks = store.chunks_for_version(&version_id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading_path.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn same_content_same_commit_is_unchanged() {
        let store = InMemoryStore::new();
        ingest_document(&store, &input("# A\ncontent", "c1"))
            .await
            .unwrap();
        let again = ingest_document(&store, &input("# A\ncontent", "c1"))
            .await
            .unwrap();
        assert_eq!(again, IngestOutcome::Unchanged);
    }

    #[tokio::test]
    async fn identical_content_at_new_commit_only_advances_pointer() {
        let store = InMemoryStore::new();
        ingest_document(&store, &input("# A\ncontent", "c1"))
            .await
            .unwrap();
        let outcome = ingest_document(&store, &input("# A\ncontent", "c2"))
            .await
            .unwrap();
        let IngestOutcome::PointerAdvanced {
            document,
            version_changed,
        } = outcome
        else {
            panic!("expected pointer advance");
        };
        assert!(!version_changed);
        assert_eq!(document.latest_commit, "c2");
        assert_eq!(store.count_versions(&document.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn revert_reuses_earlier_version() {
        let store = InMemoryStore::new();
        let IngestOutcome::NewVersion { version_id: v1, .. } =
            ingest_document(&store, &input("# A\none", "c1")).await.unwrap()
        else {
            panic!("expected a new version");
        };
        ingest_document(&store, &input("# A\ntwo", "c2"))
            .await
            .unwrap();
        let outcome = ingest_document(&store, &input("# A\none", "c3"))
            .await
            .unwrap();
        let IngestOutcome::PointerAdvanced {
            document,
            version_changed,
        } = outcome
        else {
            panic!("expected pointer advance");
        };
        assert!(version_changed);
        assert_eq!(document.latest_version_id.as_deref(), Some(v1.as_str()));
        assert_eq!(store.count_versions(&document.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn soft_delete_then_reappear_restores() {
        let store = InMemoryStore::new();
        ingest_document(&store, &input("# A\ncontent", "c1"))
            .await
            .unwrap();
        let retired = soft_delete(&store, "r1", "docs/a.md", "c2", 1).await.unwrap();
        assert!(retired.is_some_and(|d| d.deleted && d.latest_commit == "c2"));
        assert!(soft_delete(&store, "r1", "docs/a.md", "c2", 1).await.unwrap().is_none());
        assert!(soft_delete(&store, "r1", "docs/none.md", "c2", 1).await.unwrap().is_none());

        let outcome = ingest_document(&store, &input("# A\ncontent", "c3"))
            .await
            .unwrap();
        let IngestOutcome::PointerAdvanced { document, .. } = outcome else {
            panic!("expected restore");
        };
        assert!(!document.deleted);
    }

    #[tokio::test]
    async fn provenance_is_recorded_on_new_versions() {
        let store = InMemoryStore::new();
        let commit = CommitInfo {
            sha: "c0".to_string(),
            author_name: "Dana".to_string(),
            author_email: "dana@example.com".to_string(),
            committed_at: chrono::DateTime::from_timestamp(1_600_000_000, 0).unwrap(),
            message: "add docs".to_string(),
            parents: vec![],
        };
        let mut inp = input("# A\ncontent", "c1");
        inp.provenance = Some(&commit);
        let IngestOutcome::NewVersion { version_id, .. } =
            ingest_document(&store, &inp).await.unwrap()
        else {
            panic!("expected a new version");
        };
        let v = store.get_version(&version_id).await.unwrap().unwrap();
        assert_eq!(v.author_name, "Dana");
        assert_eq!(v.committed_at, 1_600_000_000);
        assert_eq!(v.message, "add docs");
    }
}
