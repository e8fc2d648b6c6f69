//! Sync orchestrator: mirrors one branch of a repository into the store.
//!
//! A sync runs in two phases. The git phase (blocking, on the blocking
//! pool) opens or clones the working copy, fetches, checks out the branch,
//! resolves the target commit, and reads every candidate file into memory.
//! The apply phase writes documents through the dedup-aware ingest path,
//! soft-deletes vanished paths, re-resolves links, and records the synced
//! commit. Embedding and graph indexing of new versions run afterwards in a
//! detached task and never fail the sync.
//!
//! At most one sync runs per repository; a second request is rejected with
//! [`MirrorError::SyncInProgress`] instead of queueing.

use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use docmirror_core::ingest::{ingest_document, soft_delete, DocumentInput, IngestOutcome};
use docmirror_core::links::resolve_links;
use docmirror_core::models::{
    ChangeKind, CommitInfo, DocType, FileChange, JobStatus, Repository, SyncJob, SyncMode,
};
use docmirror_core::scanner::DocumentScanner;
use docmirror_core::store::DocStore;

use crate::error::{MirrorError, Result};
use crate::git::{blob_text, GitRepo};
use crate::search::{IndexReport, SearchService};

/// Parameters of one sync run.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub repository_id: String,
    /// Defaults to the repository's default branch.
    pub branch: Option<String>,
    pub mode: SyncMode,
    /// Defaults to the branch tip.
    pub target_commit: Option<String>,
    /// Defaults to the repository's recorded last synced commit.
    pub last_synced_commit: Option<String>,
    pub enable_embedding: bool,
}

impl SyncRequest {
    pub fn new(repository_id: impl Into<String>, mode: SyncMode) -> Self {
        Self {
            repository_id: repository_id.into(),
            branch: None,
            mode,
            target_commit: None,
            last_synced_commit: None,
            enable_embedding: true,
        }
    }
}

#[derive(Debug)]
pub struct SyncOutcome {
    pub job_id: String,
    pub last_commit: String,
    /// Documents ingested or soft-deleted without error.
    pub processed: usize,
    /// Documents whose content or pointers changed.
    pub written: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Background embedding and graph indexing of the new versions.
    pub indexing: Option<JoinHandle<IndexReport>>,
}

/// A documentation file read at the target commit.
#[derive(Debug)]
struct FileSnapshot {
    path: String,
    doc_type: DocType,
    content: String,
    provenance: Option<CommitInfo>,
}

#[derive(Debug, Default)]
struct SyncPlan {
    target: String,
    writes: Vec<FileSnapshot>,
    deletes: Vec<String>,
    /// Paths that could not be read, with the reason.
    failures: Vec<(String, String)>,
}

struct PlanInput {
    dir: PathBuf,
    url: String,
    branch: String,
    mode: SyncMode,
    target_commit: Option<String>,
    last_synced_commit: Option<String>,
    live_paths: Vec<String>,
    scanner: Arc<DocumentScanner>,
}

/// Releases the repository's sync slot on drop.
struct SyncGuard {
    active: Arc<Mutex<HashSet<String>>>,
    repository_id: String,
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.repository_id);
    }
}

fn git_err(e: anyhow::Error) -> MirrorError {
    MirrorError::Git(format!("{:#}", e))
}

fn now() -> i64 {
    Utc::now().timestamp()
}

#[derive(Clone)]
pub struct SyncService {
    store: Arc<dyn DocStore>,
    search: Arc<SearchService>,
    scanner: Arc<DocumentScanner>,
    workspace: PathBuf,
    max_tokens: usize,
    active: Arc<Mutex<HashSet<String>>>,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn DocStore>,
        search: Arc<SearchService>,
        workspace: &Path,
        max_tokens: usize,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            search,
            scanner: Arc::new(DocumentScanner::new()?),
            workspace: workspace.to_path_buf(),
            max_tokens,
            active: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    fn working_dir(&self, repository_id: &str) -> PathBuf {
        self.workspace.join(repository_id)
    }

    fn acquire(&self, repository_id: &str) -> Result<SyncGuard> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(repository_id.to_string()) {
            return Err(MirrorError::SyncInProgress(repository_id.to_string()));
        }
        Ok(SyncGuard {
            active: self.active.clone(),
            repository_id: repository_id.to_string(),
        })
    }

    async fn repository(&self, repository_id: &str) -> Result<Repository> {
        self.store
            .get_repository(repository_id)
            .await?
            .ok_or_else(|| MirrorError::not_found("repository", repository_id))
    }

    pub async fn register_repository(
        &self,
        project_id: &str,
        name: &str,
        url: &str,
        default_branch: &str,
    ) -> Result<Repository> {
        if project_id.trim().is_empty() || url.trim().is_empty() {
            return Err(MirrorError::InvalidRequest(
                "project id and url are required".to_string(),
            ));
        }
        let repo = Repository {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            default_branch: default_branch.to_string(),
            last_synced_commit: None,
            last_synced_at: None,
        };
        self.store.insert_repository(&repo).await?;
        tracing::info!(repository = %repo.id, project = %repo.project_id, url = %repo.url, "registered repository");
        Ok(repo)
    }

    pub async fn list_repositories(&self) -> Result<Vec<Repository>> {
        Ok(self.store.list_repositories().await?)
    }

    pub async fn list_jobs(&self, repository_id: &str) -> Result<Vec<SyncJob>> {
        self.repository(repository_id).await?;
        Ok(self.store.list_jobs(repository_id).await?)
    }

    async fn working_copy(&self, repo: &Repository) -> Result<GitRepo> {
        let url = repo.url.clone();
        let dir = self.working_dir(&repo.id);
        tokio::task::spawn_blocking(move || GitRepo::clone_or_open(&url, &dir))
            .await
            .map_err(|e| MirrorError::Other(e.into()))?
            .map_err(git_err)
    }

    /// Commit summaries on `branch` (default branch when `None`).
    pub async fn list_commits(
        &self,
        repository_id: &str,
        branch: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<CommitInfo>> {
        let repo = self.repository(repository_id).await?;
        let git = self.working_copy(&repo).await?;
        let branch = branch.unwrap_or(&repo.default_branch).to_string();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = git.fetch() {
                tracing::warn!(error = %format!("{e:#}"), "fetch failed; listing local refs");
            }
            git.list_commits(&branch, skip, limit)
        })
        .await
        .map_err(|e| MirrorError::Other(e.into()))
    }

    pub async fn diff(
        &self,
        repository_id: &str,
        old_commit: Option<&str>,
        new_commit: &str,
    ) -> Result<Vec<FileChange>> {
        let repo = self.repository(repository_id).await?;
        let git = self.working_copy(&repo).await?;
        let old = old_commit.map(str::to_string);
        let new = new_commit.to_string();
        tokio::task::spawn_blocking(move || git.diff(old.as_deref(), &new))
            .await
            .map_err(|e| MirrorError::Other(e.into()))
    }

    async fn begin(&self, request: &SyncRequest) -> Result<(Repository, SyncGuard, SyncJob)> {
        let repo = self.repository(&request.repository_id).await?;
        let guard = self.acquire(&repo.id)?;
        let job = SyncJob {
            id: uuid::Uuid::new_v4().to_string(),
            repository_id: repo.id.clone(),
            mode: request.mode,
            status: JobStatus::Running,
            started_at: now(),
            finished_at: None,
            message: None,
            documents_processed: 0,
            documents_failed: 0,
            last_commit: None,
        };
        self.store.insert_job(&job).await?;
        Ok((repo, guard, job))
    }

    /// Run a sync to completion and return the synced commit.
    pub async fn sync_repository(&self, request: SyncRequest) -> Result<SyncOutcome> {
        let (repo, guard, job) = self.begin(&request).await?;
        self.execute(repo, request, job, guard).await
    }

    /// Start a sync in the background and return its job id.
    ///
    /// The repository slot is taken before returning, so a concurrent
    /// request is rejected immediately.
    pub async fn start_sync(&self, request: SyncRequest) -> Result<String> {
        let (repo, guard, job) = self.begin(&request).await?;
        let job_id = job.id.clone();
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.execute(repo, request, job, guard).await {
                tracing::warn!(error = %e, "background sync failed");
            }
        });
        Ok(job_id)
    }

    async fn execute(
        &self,
        repo: Repository,
        request: SyncRequest,
        mut job: SyncJob,
        guard: SyncGuard,
    ) -> Result<SyncOutcome> {
        tracing::info!(
            repository = %repo.id,
            mode = request.mode.as_str(),
            job = %job.id,
            "sync started"
        );

        let result = self.run(&repo, &request).await;

        job.finished_at = Some(now());
        match result {
            Ok((mut outcome, versions)) => {
                job.status = JobStatus::Completed;
                job.documents_processed = outcome.processed as i64;
                job.documents_failed = outcome.failed as i64;
                job.last_commit = Some(outcome.last_commit.clone());
                let recorded = self.store.update_job(&job).await;
                drop(guard);
                recorded?;

                outcome.job_id = job.id.clone();
                outcome.indexing = self.spawn_indexing(&repo.project_id, versions, &request);
                tracing::info!(
                    repository = %repo.id,
                    commit = %outcome.last_commit,
                    processed = outcome.processed,
                    failed = outcome.failed,
                    "sync completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                job.message = Some(e.to_string());
                if let Err(update) = self.store.update_job(&job).await {
                    tracing::warn!(job = %job.id, error = %update, "failed to record job failure");
                }
                drop(guard);
                tracing::warn!(repository = %repo.id, error = %e, "sync failed");
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        repo: &Repository,
        request: &SyncRequest,
    ) -> Result<(SyncOutcome, Vec<String>)> {
        let live_paths = self
            .store
            .list_documents(&repo.id, false)
            .await?
            .into_iter()
            .map(|d| d.path)
            .collect();

        let input = PlanInput {
            dir: self.working_dir(&repo.id),
            url: repo.url.clone(),
            branch: request
                .branch
                .clone()
                .unwrap_or_else(|| repo.default_branch.clone()),
            mode: request.mode,
            target_commit: request.target_commit.clone(),
            last_synced_commit: request
                .last_synced_commit
                .clone()
                .or_else(|| repo.last_synced_commit.clone()),
            live_paths,
            scanner: self.scanner.clone(),
        };
        let plan = tokio::task::spawn_blocking(move || plan_sync(input))
            .await
            .map_err(|e| MirrorError::Other(e.into()))??;

        let mut outcome = SyncOutcome {
            job_id: String::new(),
            last_commit: plan.target.clone(),
            processed: 0,
            written: 0,
            deleted: 0,
            failed: plan.failures.len(),
            indexing: None,
        };
        for (path, reason) in &plan.failures {
            tracing::warn!(path = %path, %reason, "document failed");
        }

        let mut versions = Vec::new();
        // Documents whose indexed chunks no longer match the live version.
        let mut replaced = Vec::new();
        let mut retired = Vec::new();
        for file in &plan.writes {
            let input = DocumentInput {
                repository_id: &repo.id,
                path: &file.path,
                doc_type: file.doc_type,
                content: &file.content,
                commit_sha: &plan.target,
                provenance: file.provenance.as_ref(),
                max_tokens: self.max_tokens,
                now: now(),
            };
            match ingest_document(self.store.as_ref(), &input).await {
                Ok(result) => {
                    outcome.processed += 1;
                    match result {
                        IngestOutcome::NewVersion {
                            document,
                            version_id,
                        } => {
                            outcome.written += 1;
                            versions.push(version_id);
                            replaced.push(document.id);
                        }
                        IngestOutcome::PointerAdvanced {
                            document,
                            version_changed,
                        } => {
                            outcome.written += 1;
                            if version_changed {
                                replaced.push(document.id.clone());
                                versions.extend(document.latest_version_id);
                            }
                        }
                        IngestOutcome::Unchanged => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %file.path, error = %format!("{e:#}"), "document failed");
                    outcome.failed += 1;
                }
            }
        }

        for path in &plan.deletes {
            match soft_delete(self.store.as_ref(), &repo.id, path, &plan.target, now()).await {
                Ok(deleted) => {
                    outcome.processed += 1;
                    if let Some(document) = deleted {
                        outcome.deleted += 1;
                        retired.push(document.id);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %format!("{e:#}"), "soft delete failed");
                    outcome.failed += 1;
                }
            }
        }

        if outcome.written > 0 || outcome.deleted > 0 {
            let report = resolve_links(self.store.as_ref(), &repo.id).await?;
            tracing::debug!(resolved = report.resolved, broken = report.broken, "links resolved");
        }

        // Deleted documents leave every index; replaced ones only leave the
        // indexes that will not be rebuilt for their new version.
        let kept = self.search.indexers(request.enable_embedding);
        for strategy in self.search.indexers(true) {
            let rebuilt = kept.iter().any(|k| k.name() == strategy.name());
            let stale = retired
                .iter()
                .chain(replaced.iter().filter(|_| !rebuilt));
            for document_id in stale {
                if let Err(e) = strategy.forget(&repo.project_id, document_id).await {
                    tracing::warn!(
                        strategy = strategy.name(),
                        document = %document_id,
                        error = %format!("{e:#}"),
                        "failed to drop stale index entries"
                    );
                }
            }
        }

        self.store.record_sync(&repo.id, &plan.target, now()).await?;
        Ok((outcome, versions))
    }

    fn spawn_indexing(
        &self,
        project_id: &str,
        versions: Vec<String>,
        request: &SyncRequest,
    ) -> Option<JoinHandle<IndexReport>> {
        let indexers = self.search.indexers(request.enable_embedding);
        if versions.is_empty() || indexers.is_empty() {
            return None;
        }
        let project_id = project_id.to_string();
        Some(tokio::spawn(async move {
            let mut total = IndexReport::default();
            for version_id in &versions {
                for indexer in &indexers {
                    match indexer.index(&project_id, version_id).await {
                        Ok(report) => total.merge(report),
                        Err(e) => tracing::warn!(
                            strategy = indexer.name(),
                            version = %version_id,
                            error = %format!("{e:#}"),
                            "indexing failed"
                        ),
                    }
                }
            }
            tracing::info!(
                project = %project_id,
                indexed = total.indexed,
                failed = total.failed,
                "indexing finished"
            );
            total
        }))
    }
}

/// Git phase: decide what to write and delete, and read the files.
fn plan_sync(input: PlanInput) -> Result<SyncPlan> {
    let git = GitRepo::clone_or_open(&input.url, &input.dir).map_err(git_err)?;
    git.fetch().map_err(git_err)?;
    git.checkout(&input.branch).map_err(git_err)?;

    let target = match &input.target_commit {
        Some(rev) => git
            .resolve(rev)
            .ok_or_else(|| MirrorError::not_found("commit", rev.as_str()))?,
        None => git
            .resolve_branch(&input.branch)
            .ok_or_else(|| MirrorError::not_found("branch", input.branch.as_str()))?,
    };

    let mut mode = input.mode;
    if mode == SyncMode::Incremental {
        match input.last_synced_commit.as_deref().map(|c| (c, git.resolve(c))) {
            None => {
                tracing::info!("no previous sync; running full sync");
                mode = SyncMode::Full;
            }
            Some((last, None)) => {
                tracing::warn!(commit = %last, "last synced commit not found; running full sync");
                mode = SyncMode::Full;
            }
            Some((_, Some(last))) if last == target => {
                tracing::info!(commit = %target, "already at target commit");
                return Ok(SyncPlan {
                    target,
                    ..SyncPlan::default()
                });
            }
            Some(_) => {}
        }
    }

    let scanner = input.scanner.as_ref();
    let mut write_paths = Vec::new();
    let mut deletes = Vec::new();

    match mode {
        SyncMode::Full => {
            write_paths = git
                .scan_document_files(scanner, &target)
                .map_err(git_err)?;
            let present: HashSet<&str> = write_paths.iter().map(String::as_str).collect();
            deletes = input
                .live_paths
                .iter()
                .filter(|p| !present.contains(p.as_str()))
                .cloned()
                .collect();
        }
        SyncMode::Incremental | SyncMode::SpecificCommit => {
            let changes = if mode == SyncMode::Incremental {
                git.diff(input.last_synced_commit.as_deref(), &target)
            } else {
                git.commit_changes(&target)
            };
            for change in changes {
                match change.kind {
                    ChangeKind::Added | ChangeKind::Modified => {
                        if scanner.is_document_file(&change.path) {
                            write_paths.push(change.path);
                        }
                    }
                    ChangeKind::Deleted => {
                        if scanner.is_document_file(&change.path) {
                            deletes.push(change.path);
                        }
                    }
                    ChangeKind::Renamed => {
                        if let Some(old) = change.old_path {
                            if scanner.is_document_file(&old) {
                                deletes.push(old);
                            }
                        }
                        if scanner.is_document_file(&change.path) {
                            write_paths.push(change.path);
                        }
                    }
                }
            }
        }
    }

    let mut plan = SyncPlan {
        target,
        deletes,
        ..SyncPlan::default()
    };

    for path in write_paths {
        let Some(doc_type) = scanner.classify(&path) else {
            continue;
        };
        match git.read_blob(&plan.target, &path) {
            Ok(Some(bytes)) => match blob_text(bytes) {
                Some(content) => plan.writes.push(FileSnapshot {
                    provenance: git.last_commit_for_path(&plan.target, &path),
                    path,
                    doc_type,
                    content,
                }),
                None => tracing::warn!(path = %path, "skipping binary or non-UTF-8 file"),
            },
            Ok(None) => tracing::warn!(path = %path, commit = %plan.target, "path missing at target commit"),
            Err(e) => plan.failures.push((path, format!("{e:#}"))),
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::KeywordSearch;
    use crate::config::RetrievalConfig;
    use docmirror_core::store::memory::InMemoryStore;

    fn service(workspace: &Path) -> (Arc<InMemoryStore>, SyncService) {
        let store = Arc::new(InMemoryStore::new());
        let search = Arc::new(SearchService::new(
            Arc::new(KeywordSearch::new(store.clone())),
            None,
            None,
            RetrievalConfig::default(),
        ));
        let svc = SyncService::new(store.clone(), search, workspace, 512).unwrap();
        (store, svc)
    }

    #[tokio::test]
    async fn second_sync_on_same_repository_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (_store, svc) = service(tmp.path());
        let repo = svc
            .register_repository("p1", "demo", "/nonexistent", "main")
            .await
            .unwrap();

        let _held = svc.acquire(&repo.id).unwrap();
        let err = svc
            .sync_repository(SyncRequest::new(&repo.id, SyncMode::Full))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::SyncInProgress(ref id) if id == &repo.id));
    }

    #[tokio::test]
    async fn slot_is_released_after_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (store, svc) = service(tmp.path());
        let repo = svc
            .register_repository("p1", "demo", "/nonexistent/repo", "main")
            .await
            .unwrap();

        let err = svc
            .sync_repository(SyncRequest::new(&repo.id, SyncMode::Full))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Git(_)));

        let jobs = store.list_jobs(&repo.id).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert!(jobs[0].message.as_deref().unwrap_or("").contains("git"));

        assert!(svc.acquire(&repo.id).is_ok());
    }

    #[tokio::test]
    async fn job_is_final_once_the_slot_frees() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (store, svc) = service(tmp.path());
        let repo = svc
            .register_repository("p1", "demo", "/nonexistent/repo", "main")
            .await
            .unwrap();

        let job_id = svc
            .start_sync(SyncRequest::new(&repo.id, SyncMode::Full))
            .await
            .unwrap();

        let mut freed = None;
        for _ in 0..500 {
            if let Ok(guard) = svc.acquire(&repo.id) {
                freed = Some(guard);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(freed.is_some(), "background sync never released its slot");

        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn unknown_repository_is_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (_store, svc) = service(tmp.path());
        let err = svc
            .sync_repository(SyncRequest::new("missing", SyncMode::Full))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::NotFound { kind: "repository", .. }));
    }
}
