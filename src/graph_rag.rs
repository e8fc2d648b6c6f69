//! Graph RAG indexing and retrieval.
//!
//! Indexing a version writes one chunk node per chunk (linked to its
//! document node), asks the LLM for entities and relations in each chunk,
//! and merges them into the project's graph. Extraction is best-effort: a
//! failed completion or unparseable reply leaves the chunk node without
//! entities.
//!
//! Retrieval runs full-text search over chunk nodes and re-hydrates each
//! hit from the primary store.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use docmirror_core::extraction::{extraction_prompt, parse_extraction, Extraction};
use docmirror_core::graph::{ChunkNode, GraphStore};
use docmirror_core::llm::CompletionProvider;
use docmirror_core::models::SearchResult;
use docmirror_core::store::DocStore;

use crate::search::{hit_from_context, IndexReport, RetrievalStrategy};

pub struct GraphRetriever {
    store: Arc<dyn DocStore>,
    graph: Arc<dyn GraphStore>,
    llm: Arc<dyn CompletionProvider>,
}

impl GraphRetriever {
    pub fn new(
        store: Arc<dyn DocStore>,
        graph: Arc<dyn GraphStore>,
        llm: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self { store, graph, llm }
    }

    pub fn graph_store(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    async fn extract(&self, chunk_id: &str, content: &str) -> Extraction {
        match self.llm.complete(&extraction_prompt(content)).await {
            Ok(reply) => parse_extraction(&reply),
            Err(e) => {
                tracing::warn!(chunk = chunk_id, error = %e, "entity extraction call failed");
                Extraction::default()
            }
        }
    }

    async fn merge_extraction(
        &self,
        project_id: &str,
        chunk_id: &str,
        extraction: &Extraction,
    ) -> Result<()> {
        for entity in &extraction.entities {
            self.graph.merge_entity(project_id, entity).await?;
            self.graph
                .link_chunk_entity(project_id, chunk_id, &entity.name)
                .await?;
        }
        for relation in &extraction.relations {
            self.graph.merge_relation(project_id, relation).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RetrievalStrategy for GraphRetriever {
    fn name(&self) -> &'static str {
        "graph"
    }

    async fn search(
        &self,
        project_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let mut limit = top_k;
        loop {
            let hits = self.graph.search_chunks(project_id, query, limit).await?;
            let exhausted = hits.len() < limit;

            let mut results = Vec::new();
            for hit in hits {
                match self.store.chunk_context(&hit.chunk_id).await? {
                    Some(ctx) if ctx.project_id == project_id => {
                        results.push(hit_from_context(ctx, hit.score));
                        if results.len() == top_k {
                            break;
                        }
                    }
                    _ => {
                        tracing::warn!(
                            chunk = %hit.chunk_id,
                            project = project_id,
                            "graph chunk missing from primary store, skipping"
                        );
                    }
                }
            }
            if results.len() == top_k || exhausted {
                return Ok(results);
            }
            limit = limit.saturating_mul(2);
        }
    }

    async fn index(&self, project_id: &str, version_id: &str) -> Result<IndexReport> {
        let Some(version) = self.store.get_version(version_id).await? else {
            anyhow::bail!("version not found: {}", version_id);
        };
        let Some(document) = self.store.get_document(&version.document_id).await? else {
            anyhow::bail!("document not found: {}", version.document_id);
        };
        if document.deleted || document.latest_version_id.as_deref() != Some(version_id) {
            tracing::debug!(
                document = %document.path,
                version = version_id,
                "version no longer current, skipping graph index"
            );
            return Ok(IndexReport::default());
        }

        self.graph
            .upsert_document_node(project_id, &document.id, &document.path, &document.title)
            .await?;
        self.graph
            .remove_document_chunks(project_id, &document.id)
            .await?;

        let mut report = IndexReport::default();
        for chunk in self.store.chunks_for_version(version_id).await? {
            self.graph
                .upsert_chunk_node(&ChunkNode {
                    project_id: project_id.to_string(),
                    chunk_id: chunk.id.clone(),
                    document_id: document.id.clone(),
                    heading_path: chunk.heading_path.clone(),
                    content: chunk.content.clone(),
                })
                .await?;

            let extraction = self.extract(&chunk.id, &chunk.content).await;
            match self
                .merge_extraction(project_id, &chunk.id, &extraction)
                .await
            {
                Ok(()) => report.indexed += 1,
                Err(e) => {
                    tracing::warn!(chunk = %chunk.id, error = %e, "failed to merge extraction");
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            document = %document.path,
            chunks = report.indexed,
            "graph indexed"
        );
        Ok(report)
    }

    async fn forget(&self, project_id: &str, document_id: &str) -> Result<()> {
        self.graph.remove_document_chunks(project_id, document_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmirror_core::ingest::{ingest_document, DocumentInput, IngestOutcome};
    use docmirror_core::models::{DocType, Repository};
    use docmirror_core::store::memory::InMemoryStore;

    use crate::graph_sqlite::SqliteGraphStore;

    struct CannedLlm(&'static str);

    #[async_trait]
    impl CompletionProvider for CannedLlm {
        fn model_name(&self) -> &str {
            "canned"
        }
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    async fn setup(
        reply: &'static str,
    ) -> (tempfile::TempDir, Arc<InMemoryStore>, GraphRetriever, String) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("g.sqlite"))
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();

        let store = Arc::new(InMemoryStore::new());
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
        let outcome = ingest_document(
            store.as_ref(),
            &DocumentInput {
                repository_id: "r1",
                path: "docs/sync.md",
                doc_type: DocType::Documentation,
                content: "# Sync\nThe orchestrator uses tokio for background work.",
                commit_sha: "c1",
                provenance: None,
                max_tokens: 512,
                now: 0,
            },
        )
        .await
        .unwrap();
        let IngestOutcome::NewVersion { version_id, .. } = outcome else {
            panic!("expected a new version");
        };

        let retriever = GraphRetriever::new(
            store.clone(),
            Arc::new(SqliteGraphStore::new(pool)),
            Arc::new(CannedLlm(reply)),
        );
        (tmp, store, retriever, version_id)
    }

    #[tokio::test]
    async fn index_merges_entities_and_search_rehydrates() {
        let reply = r#"```json
{"entities": [
  {"name": "Orchestrator", "type": "Component", "description": "runs syncs"},
  {"name": "Tokio", "type": "Technology", "description": "async runtime"}
 ],
 "relations": [{"source": "Orchestrator", "target": "Tokio", "type": "USES"}]}
```"#;
        let (_tmp, _store, retriever, version_id) = setup(reply).await;

        let report = retriever.index("p1", &version_id).await.unwrap();
        assert_eq!(report.indexed, 1);

        let rows = retriever
            .graph_store()
            .execute_query(
                "SELECT e.name FROM graph_mentions m JOIN graph_entities e \
                 ON e.project_id = m.project_id AND e.name = m.entity_name ORDER BY e.name",
                10,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let results = retriever.search("p1", "tokio", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "docs/sync.md");
        assert_eq!(results[0].heading_path.as_deref(), Some("Sync"));
    }

    #[tokio::test]
    async fn unparseable_extraction_still_indexes_chunk() {
        let (_tmp, _store, retriever, version_id) = setup("I could not find any entities.").await;
        let report = retriever.index("p1", &version_id).await.unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(retriever.search("p1", "orchestrator", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hits_missing_from_primary_store_are_skipped() {
        let (_tmp, _store, retriever, _version_id) = setup("{}").await;
        retriever
            .graph_store()
            .upsert_chunk_node(&ChunkNode {
                project_id: "p1".into(),
                chunk_id: "ghost".into(),
                document_id: "gone".into(),
                heading_path: None,
                content: "tokio ghost chunk".into(),
            })
            .await
            .unwrap();
        assert!(retriever.search("p1", "ghost", 5).await.unwrap().is_empty());
    }

    async fn ingest_v2(store: &InMemoryStore) -> String {
        let outcome = ingest_document(
            store,
            &DocumentInput {
                repository_id: "r1",
                path: "docs/sync.md",
                doc_type: DocType::Documentation,
                content: "# Sync\nThe orchestrator now schedules tokio tasks per repository.",
                commit_sha: "c2",
                provenance: None,
                max_tokens: 512,
                now: 1,
            },
        )
        .await
        .unwrap();
        let IngestOutcome::NewVersion { version_id, .. } = outcome else {
            panic!("expected a new version");
        };
        version_id
    }

    #[tokio::test]
    async fn late_index_of_superseded_version_is_skipped() {
        let (_tmp, store, retriever, v1) = setup("{}").await;
        let v2 = ingest_v2(&store).await;

        assert_eq!(retriever.index("p1", &v2).await.unwrap().indexed, 1);
        assert_eq!(retriever.index("p1", &v1).await.unwrap(), IndexReport::default());

        let results = retriever.search("p1", "tokio", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].commit_sha, "c2");
    }

    #[tokio::test]
    async fn stale_chunks_do_not_crowd_out_live_hits() {
        let (_tmp, _store, retriever, version_id) = setup("{}").await;
        retriever.index("p1", &version_id).await.unwrap();
        for i in 0..4 {
            retriever
                .graph_store()
                .upsert_chunk_node(&ChunkNode {
                    project_id: "p1".into(),
                    chunk_id: format!("stale-{i}"),
                    document_id: "retired".into(),
                    heading_path: None,
                    content: "tokio tokio tokio".into(),
                })
                .await
                .unwrap();
        }

        let results = retriever.search("p1", "tokio", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "docs/sync.md");
    }

    #[tokio::test]
    async fn forget_drops_document_chunks() {
        let (_tmp, store, retriever, version_id) = setup("{}").await;
        retriever.index("p1", &version_id).await.unwrap();
        let doc = store
            .get_document_by_path("r1", "docs/sync.md")
            .await
            .unwrap()
            .unwrap();

        retriever.forget("p1", &doc.id).await.unwrap();
        assert!(retriever.search("p1", "tokio", 5).await.unwrap().is_empty());
    }
}
