//! Explicit wiring of stores, providers, and services.
//!
//! A [`Mirror`] is built once per process (or per test) and passed to
//! whoever needs it; nothing is held in globals or thread-locals.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::SqlitePool;

use docmirror_core::embedding::EmbeddingProvider;
use docmirror_core::graph::GraphStore;
use docmirror_core::llm::CompletionProvider;
use docmirror_core::store::DocStore;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::error::{MirrorError, Result as MirrorResult};
use crate::graph_rag::GraphRetriever;
use crate::graph_sqlite::SqliteGraphStore;
use crate::llm;
use crate::migrate;
use crate::query_synth::QuerySynthesizer;
use crate::search::{KeywordSearch, SemanticSearch, SearchService};
use crate::sqlite_store::SqliteStore;
use crate::sync::SyncService;
use crate::vector_sqlite::SqliteVectorStore;

/// Optional model providers; `None` disables the features that need them.
#[derive(Clone, Default)]
pub struct Providers {
    pub embedding: Option<Arc<dyn EmbeddingProvider>>,
    pub llm: Option<Arc<dyn CompletionProvider>>,
}

impl Providers {
    /// Providers named in the config.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            embedding: if config.embedding.is_enabled() {
                Some(embedding::create_provider(&config.embedding)?)
            } else {
                None
            },
            llm: if config.llm.is_enabled() {
                Some(llm::create_provider(&config.llm)?)
            } else {
                None
            },
        })
    }
}

pub struct Mirror {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub store: Arc<dyn DocStore>,
    pub graph: Arc<dyn GraphStore>,
    pub search: Arc<SearchService>,
    pub sync: SyncService,
    synthesizer: Option<QuerySynthesizer>,
}

impl Mirror {
    /// Connect to the configured database, migrate it, and build providers
    /// from the config.
    pub async fn open(config: Config) -> Result<Self> {
        let providers = Providers::from_config(&config)?;
        let pool = db::connect(&config).await?;
        Self::with_providers(config, pool, providers).await
    }

    pub async fn with_providers(
        config: Config,
        pool: SqlitePool,
        providers: Providers,
    ) -> Result<Self> {
        migrate::run_migrations(&pool).await?;

        let store: Arc<dyn DocStore> = Arc::new(SqliteStore::new(pool.clone()));
        let graph: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::new(pool.clone()));

        let semantic = providers.embedding.clone().map(|provider| {
            Arc::new(SemanticSearch::new(
                store.clone(),
                Arc::new(SqliteVectorStore::new(pool.clone())),
                provider,
                config.retrieval.similarity_threshold,
                config.embedding.batch_size,
            ))
        });

        let graph_llm = providers.llm.clone().filter(|_| config.graph.enabled);
        let retriever = graph_llm
            .clone()
            .map(|llm| Arc::new(GraphRetriever::new(store.clone(), graph.clone(), llm)));
        let synthesizer = graph_llm.map(|llm| {
            QuerySynthesizer::new(
                llm,
                graph.clone(),
                config.graph.synth_max_retries,
                Duration::from_secs(config.graph.synth_timeout_secs),
            )
        });

        let search = Arc::new(SearchService::new(
            Arc::new(KeywordSearch::new(store.clone())),
            semantic,
            retriever,
            config.retrieval.clone(),
        ));
        let sync = SyncService::new(
            store.clone(),
            search.clone(),
            &config.workspace.dir,
            config.chunking.max_tokens,
        )?;

        Ok(Self {
            config: Arc::new(config),
            pool,
            store,
            graph,
            search,
            sync,
            synthesizer,
        })
    }

    /// Natural-language question → validated graph query.
    pub async fn generate_graph_query(&self, question: &str) -> MirrorResult<String> {
        match &self.synthesizer {
            Some(s) => s.generate_query(question).await,
            None => Err(MirrorError::InvalidRequest(
                "graph query synthesis requires [graph] enabled and an [llm] provider".to_string(),
            )),
        }
    }
}
