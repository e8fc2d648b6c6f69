//! Document link extraction and resolution.
//!
//! Links are extracted when a document's current version changes and
//! resolved against the live documents of the repository afterwards:
//!
//! | Type | Target |
//! |------|--------|
//! | `EXTERNAL` | none, never broken |
//! | `ANCHOR` | the source document itself |
//! | `INTERNAL` | path resolved relative to the source document |
//! | `WIKI` | document title, then file stem (case-insensitive) |
//!
//! An `INTERNAL` or `WIKI` link is broken iff it does not resolve.

use std::collections::HashMap;

use anyhow::Result;

use crate::models::{Document, DocumentLink, LinkType};
use crate::parser::{extract_links, resolve_relative};
use crate::store::DocStore;

/// Build unresolved link rows for a document's content.
pub fn extract_document_links(source: &Document, content: &str) -> Vec<DocumentLink> {
    extract_links(content)
        .into_iter()
        .map(|raw| {
            let (target_document_id, broken) = match raw.link_type {
                LinkType::External => (None, false),
                LinkType::Anchor => (Some(source.id.clone()), false),
                LinkType::Internal | LinkType::Wiki => (None, true),
            };
            DocumentLink {
                id: uuid::Uuid::new_v4().to_string(),
                source_document_id: source.id.clone(),
                target_document_id,
                target: raw.target,
                link_type: raw.link_type,
                broken,
            }
        })
        .collect()
}

/// Counts from one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub resolved: usize,
    pub broken: usize,
}

struct LinkIndex<'a> {
    paths: HashMap<&'a str, &'a Document>,
    titles: HashMap<String, &'a str>,
    stems: HashMap<String, &'a str>,
}

impl<'a> LinkIndex<'a> {
    fn new(docs: &'a [Document]) -> Self {
        let mut index = LinkIndex {
            paths: HashMap::new(),
            titles: HashMap::new(),
            stems: HashMap::new(),
        };
        for doc in docs {
            index.paths.insert(doc.path.as_str(), doc);
            index
                .titles
                .entry(doc.title.to_lowercase())
                .or_insert(doc.id.as_str());
            index
                .stems
                .entry(file_stem(&doc.path).to_lowercase())
                .or_insert(doc.id.as_str());
        }
        index
    }

    fn internal(&self, source_path: &str, target: &str) -> Option<&'a str> {
        let resolved = resolve_relative(source_path, target)?;
        if let Some(doc) = self.paths.get(resolved.as_str()) {
            return Some(doc.id.as_str());
        }
        if !file_name(&resolved).contains('.') {
            let with_ext = format!("{resolved}.md");
            return self.paths.get(with_ext.as_str()).map(|d| d.id.as_str());
        }
        None
    }

    fn wiki(&self, target: &str) -> Option<&'a str> {
        let key = target.split('#').next().unwrap_or(target).trim().to_lowercase();
        self.titles
            .get(&key)
            .or_else(|| self.stems.get(&key))
            .copied()
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(pos) => &name[..pos],
    }
}

/// Re-resolve every link in a repository against its live documents.
///
/// Only links whose target or broken flag changed are written back.
pub async fn resolve_links(store: &dyn DocStore, repository_id: &str) -> Result<LinkReport> {
    let docs = store.list_documents(repository_id, false).await?;
    let index = LinkIndex::new(&docs);
    let by_id: HashMap<&str, &Document> = docs.iter().map(|d| (d.id.as_str(), d)).collect();

    let mut report = LinkReport::default();
    for link in store.links_for_repository(repository_id).await? {
        let target = match link.link_type {
            LinkType::External => continue,
            LinkType::Anchor => Some(link.source_document_id.as_str()),
            LinkType::Internal => by_id
                .get(link.source_document_id.as_str())
                .and_then(|src| index.internal(&src.path, &link.target)),
            LinkType::Wiki => index.wiki(&link.target),
        };
        let broken = target.is_none();
        if broken {
            report.broken += 1;
        } else {
            report.resolved += 1;
        }
        if link.target_document_id.as_deref() != target || link.broken != broken {
            store.update_link_target(&link.id, target, broken).await?;
        }
    }

    tracing::debug!(
        repository = %repository_id,
        resolved = report.resolved,
        broken = report.broken,
        "links resolved"
    );
    Ok(report)
}
