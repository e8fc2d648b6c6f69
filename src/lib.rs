//! # docmirror
//!
//! Mirrors Git repositories into a versioned documentation knowledge base
//! and answers questions over it with keyword, semantic, and graph
//! retrieval.
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌─────────────────────┐
//! │ git walker │──▶│ sync (parse, │──▶│ SQLite: documents,  │
//! │ + scanner  │   │ dedup, chunk)│   │ versions, chunks    │
//! └────────────┘   └──────┬───────┘   └─────────┬───────────┘
//!                         │ best-effort         │
//!                         ▼                     ▼
//!                ┌─────────────────┐    ┌──────────────────┐
//!                │ vectors + graph │───▶│ search: keyword, │
//!                │ (LLM entities)  │    │ semantic, hybrid │
//!                └─────────────────┘    │ (RRF), graph     │
//!                                       └──────────────────┘
//! ```
//!
//! Pure logic (parsing, chunking, fusion, store traits) lives in the
//! `docmirror-core` crate; this crate adds persistence, git, model
//! providers, and the CLI.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`context`] | Wiring of stores, providers, and services |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | Documents, versions, chunks, links, jobs |
//! | [`vector_sqlite`] | Chunk embeddings |
//! | [`graph_sqlite`] | Entity graph tables and chunk full-text index |
//! | [`git`] | Commit walker over a working copy |
//! | [`sync`] | Sync orchestrator |
//! | [`search`] | Retrieval strategies and hybrid fusion |
//! | [`graph_rag`] | Graph indexing and retrieval |
//! | [`query_synth`] | Self-correcting graph query synthesis |
//! | [`embedding`] / [`llm`] | HTTP model providers |

pub mod commands;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod git;
pub mod graph_rag;
pub mod graph_sqlite;
mod http;
pub mod llm;
pub mod migrate;
pub mod query_synth;
pub mod search;
pub mod sqlite_store;
pub mod sync;
pub mod vector_sqlite;

pub use docmirror_core::models;
