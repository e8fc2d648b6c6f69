//! Retrieval strategies and the search service.
//!
//! Every modality implements [`RetrievalStrategy`] (`search` + `index`);
//! [`SearchService`] picks one by [`SearchMode`]. Hybrid mode runs keyword
//! and semantic side by side, each under its own timeout, and fuses them
//! with reciprocal rank fusion. A source that fails or times out degrades
//! to an empty list; only when both fail is the search unavailable.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use docmirror_core::embedding::{embed_query, EmbeddingProvider};
use docmirror_core::models::{content_hash, ChunkContext, SearchResult};
use docmirror_core::search::{content_snippet, reciprocal_rank_fusion, similarity_from_distance};
use docmirror_core::store::vector::{VectorEntry, VectorStore};
use docmirror_core::store::DocStore;

use crate::config::RetrievalConfig;
use crate::error::{MirrorError, Result as MirrorResult};
use crate::graph_rag::GraphRetriever;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Keyword,
    Semantic,
    Hybrid,
    Graph,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
            SearchMode::Graph => "graph",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = MirrorError;

    fn from_str(s: &str) -> MirrorResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "keyword" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            "graph" => Ok(SearchMode::Graph),
            other => Err(MirrorError::InvalidRequest(format!(
                "Unknown search mode: {}. Use keyword, semantic, hybrid, or graph.",
                other
            ))),
        }
    }
}

/// Chunks written or skipped by one `index` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub failed: usize,
}

impl IndexReport {
    pub fn merge(&mut self, other: IndexReport) {
        self.indexed += other.indexed;
        self.failed += other.failed;
    }
}

/// A retrieval modality.
#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, project_id: &str, query: &str, top_k: usize)
        -> Result<Vec<SearchResult>>;

    /// Bring the strategy's index up to date with one document version.
    async fn index(&self, project_id: &str, version_id: &str) -> Result<IndexReport>;

    /// Drop everything indexed for a document that is no longer live.
    async fn forget(&self, _project_id: &str, _document_id: &str) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn hit_from_context(ctx: ChunkContext, score: f64) -> SearchResult {
    SearchResult {
        snippet: content_snippet(&ctx.chunk.content),
        document_id: ctx.document_id,
        path: ctx.path,
        title: Some(ctx.title),
        commit_sha: ctx.commit_sha,
        chunk_id: Some(ctx.chunk.id),
        heading_path: ctx.chunk.heading_path,
        score,
    }
}

// ============ Keyword ============

/// Substring search over the primary store. Reads the store directly, so
/// there is nothing to index.
pub struct KeywordSearch {
    store: Arc<dyn DocStore>,
}

impl KeywordSearch {
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RetrievalStrategy for KeywordSearch {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn search(
        &self,
        project_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.store.keyword_search(project_id, query, top_k).await
    }

    async fn index(&self, _project_id: &str, _version_id: &str) -> Result<IndexReport> {
        Ok(IndexReport::default())
    }
}

// ============ Semantic ============

pub struct SemanticSearch {
    store: Arc<dyn DocStore>,
    vectors: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    similarity_threshold: f64,
    batch_size: usize,
}

impl SemanticSearch {
    pub fn new(
        store: Arc<dyn DocStore>,
        vectors: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        similarity_threshold: f64,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            vectors,
            provider,
            similarity_threshold,
            batch_size: batch_size.max(1),
        }
    }

    async fn embed_and_store(&self, project_id: &str, chunks: &[ChunkContext]) -> IndexReport {
        let mut report = IndexReport::default();
        let model = self.provider.model_name().to_string();

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.chunk.content.clone()).collect();
            let vectors = match self.provider.embed(&texts).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, chunks = batch.len(), "embedding batch failed");
                    report.failed += batch.len();
                    continue;
                }
            };

            for (ctx, vector) in batch.iter().zip(vectors) {
                let entry = VectorEntry {
                    chunk_id: ctx.chunk.id.clone(),
                    document_id: ctx.document_id.clone(),
                    project_id: project_id.to_string(),
                    model: model.clone(),
                    content_hash: content_hash(&ctx.chunk.content),
                    vector,
                };
                match self.vectors.upsert(&entry).await {
                    Ok(()) => report.indexed += 1,
                    Err(e) => {
                        tracing::warn!(chunk = %ctx.chunk.id, error = %e, "failed to store embedding");
                        report.failed += 1;
                    }
                }
            }
        }
        report
    }

    /// Embed current chunks of a project whose vector is missing or stale.
    pub async fn index_pending(&self, project_id: &str) -> Result<IndexReport> {
        let mut pending = Vec::new();
        for ctx in self.store.current_chunks(project_id).await? {
            let stored = self.vectors.stored_hash(&ctx.chunk.id).await?;
            if stored.as_deref() != Some(content_hash(&ctx.chunk.content).as_str()) {
                pending.push(ctx);
            }
        }
        tracing::info!(project = project_id, pending = pending.len(), "embedding pending chunks");
        Ok(self.embed_and_store(project_id, &pending).await)
    }
}

#[async_trait]
impl RetrievalStrategy for SemanticSearch {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn search(
        &self,
        project_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let query_vec = embed_query(self.provider.as_ref(), query).await?;

        // Vectors of superseded chunks are skipped, so widen the scan until
        // top_k live hits are found or the project runs out of vectors.
        let mut limit = top_k;
        loop {
            let hits = self.vectors.nearest(project_id, &query_vec, limit).await?;
            let mut exhausted = hits.len() < limit;

            let mut results = Vec::new();
            for hit in hits {
                let score = similarity_from_distance(hit.distance);
                if score < self.similarity_threshold {
                    exhausted = true;
                    break;
                }
                match self.store.chunk_context(&hit.chunk_id).await? {
                    Some(ctx) if ctx.project_id == project_id => {
                        results.push(hit_from_context(ctx, score));
                        if results.len() == top_k {
                            break;
                        }
                    }
                    _ => tracing::debug!(chunk = %hit.chunk_id, "skipping vector hit without current chunk"),
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
        self.vectors.remove_document(&version.document_id).await?;

        let mut contexts = Vec::new();
        for chunk in self.store.chunks_for_version(version_id).await? {
            if let Some(ctx) = self.store.chunk_context(&chunk.id).await? {
                contexts.push(ctx);
            }
        }
        Ok(self.embed_and_store(project_id, &contexts).await)
    }

    async fn forget(&self, _project_id: &str, document_id: &str) -> Result<()> {
        self.vectors.remove_document(document_id).await
    }
}

// ============ Service ============

/// Entry point for every search mode.
pub struct SearchService {
    keyword: Arc<KeywordSearch>,
    semantic: Option<Arc<SemanticSearch>>,
    graph: Option<Arc<GraphRetriever>>,
    config: RetrievalConfig,
}

impl SearchService {
    pub fn new(
        keyword: Arc<KeywordSearch>,
        semantic: Option<Arc<SemanticSearch>>,
        graph: Option<Arc<GraphRetriever>>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            keyword,
            semantic,
            graph,
            config,
        }
    }

    pub fn semantic(&self) -> Option<&Arc<SemanticSearch>> {
        self.semantic.as_ref()
    }

    pub fn graph(&self) -> Option<&Arc<GraphRetriever>> {
        self.graph.as_ref()
    }

    /// Strategies that keep an index alongside the primary store.
    pub fn indexers(&self, include_embedding: bool) -> Vec<Arc<dyn RetrievalStrategy>> {
        let mut out: Vec<Arc<dyn RetrievalStrategy>> = Vec::new();
        if include_embedding {
            if let Some(s) = &self.semantic {
                out.push(s.clone());
            }
        }
        if let Some(g) = &self.graph {
            out.push(g.clone());
        }
        out
    }

    /// The single strategy behind a non-hybrid mode.
    pub fn strategy(&self, mode: SearchMode) -> MirrorResult<&dyn RetrievalStrategy> {
        match mode {
            SearchMode::Keyword => Ok(self.keyword.as_ref()),
            SearchMode::Semantic => self
                .semantic
                .as_deref()
                .map(|s| s as &dyn RetrievalStrategy)
                .ok_or_else(|| {
                    MirrorError::InvalidRequest(
                        "Mode 'semantic' requires embeddings. Set [embedding] provider in config."
                            .to_string(),
                    )
                }),
            SearchMode::Graph => self
                .graph
                .as_deref()
                .map(|g| g as &dyn RetrievalStrategy)
                .ok_or_else(|| {
                    MirrorError::InvalidRequest(
                        "Mode 'graph' requires [graph] enabled and an [llm] provider.".to_string(),
                    )
                }),
            SearchMode::Hybrid => Err(MirrorError::InvalidRequest(
                "hybrid mode fuses several strategies".to_string(),
            )),
        }
    }

    pub async fn search(
        &self,
        project_id: &str,
        query: &str,
        mode: SearchMode,
        top_k: usize,
    ) -> MirrorResult<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(MirrorError::InvalidRequest("top_k must be >= 1".to_string()));
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(project = project_id, mode = %mode, top_k, "search");
        match mode {
            SearchMode::Hybrid => self.hybrid_search(project_id, query, top_k).await,
            other => Ok(self
                .strategy(other)?
                .search(project_id, query, top_k)
                .await?),
        }
    }

    /// Keyword and semantic candidates fused by RRF.
    pub async fn hybrid_search(
        &self,
        project_id: &str,
        query: &str,
        top_k: usize,
    ) -> MirrorResult<Vec<SearchResult>> {
        let candidates = top_k.saturating_mul(self.config.candidate_multiplier);
        let budget = Duration::from_millis(self.config.source_timeout_ms);

        let keyword = timed(
            budget,
            self.keyword.search(project_id, query, candidates),
        );
        let semantic = async {
            match &self.semantic {
                Some(s) => timed(budget, s.search(project_id, query, candidates)).await,
                None => Err("embeddings not configured".to_string()),
            }
        };
        let (keyword, semantic) = tokio::join!(keyword, semantic);

        let (keyword, semantic) = match (keyword, semantic) {
            (Err(k), Err(s)) => {
                return Err(MirrorError::SearchUnavailable(format!(
                    "keyword: {}; semantic: {}",
                    k, s
                )))
            }
            (k, s) => (
                degrade("keyword", project_id, k),
                degrade("semantic", project_id, s),
            ),
        };

        Ok(reciprocal_rank_fusion(
            &[keyword, semantic],
            self.config.rrf_k,
            top_k,
        ))
    }
}

async fn timed<F>(budget: Duration, fut: F) -> std::result::Result<Vec<SearchResult>, String>
where
    F: std::future::Future<Output = Result<Vec<SearchResult>>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(Ok(results)) => Ok(results),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}ms", budget.as_millis())),
    }
}

fn degrade(
    source: &str,
    project_id: &str,
    outcome: std::result::Result<Vec<SearchResult>, String>,
) -> Vec<SearchResult> {
    outcome.unwrap_or_else(|reason| {
        tracing::warn!(source, project = project_id, %reason, "search source degraded");
        Vec::new()
    })
}
