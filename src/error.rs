//! Caller-facing error type for docmirror operations.
//!
//! Plumbing (config, migrations, store methods) uses `anyhow`. The public
//! operations (sync, search, query synthesis, commit walking) map their
//! failures onto [`MirrorError`] so callers can tell a missing repository
//! from a busy one or an exhausted synthesis budget.

/// Errors surfaced by docmirror operations.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// A repository, commit, document, or version does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Clone, fetch, checkout, or another git invocation failed.
    #[error("git error: {0}")]
    Git(String),

    /// A sync is already running for this repository.
    #[error("sync already in progress for repository {0}")]
    SyncInProgress(String),

    /// Every synthesis attempt produced a query that failed validation.
    #[error("query synthesis failed after {attempts} attempts: {last_error}")]
    QuerySynthesis { attempts: u32, last_error: String },

    /// The synthesis loop exceeded its overall time budget.
    #[error("query synthesis timed out after {0}s")]
    SynthesisTimeout(u64),

    /// No retrieval source could answer.
    #[error("search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Store, IO, and provider failures, with their context chain.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MirrorError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        MirrorError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Result type alias using `MirrorError`.
pub type Result<T> = std::result::Result<T, MirrorError>;
