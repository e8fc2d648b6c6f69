//! # docmirror Core
//!
//! Shared, I/O-free logic for docmirror: the document data model, the
//! documentation file scanner, the Markdown parser and heading-aware
//! chunker, content-hash deduplicated ingestion, link resolution, search
//! primitives (snippets and reciprocal rank fusion), the entity-extraction
//! contract, and the storage/provider traits that the application crate
//! implements.
//!
//! This crate contains no tokio, sqlx, subprocess, or network code.
//! The in-memory store implementations make every algorithm here testable
//! without a database.

pub mod chunk;
pub mod embedding;
pub mod extraction;
pub mod graph;
pub mod ingest;
pub mod links;
pub mod llm;
pub mod models;
pub mod parser;
pub mod scanner;
pub mod search;
pub mod store;
