//! CLI command handlers. Each prints human-readable output to stdout.

use anyhow::{bail, Result};

use docmirror_core::models::SyncMode;
use docmirror_core::search::format_ts_iso;

use crate::config::Config;
use crate::context::Mirror;
use crate::search::SearchMode;
use crate::sync::SyncRequest;

pub async fn run_init(config: Config) -> Result<()> {
    let mirror = Mirror::open(config).await?;
    mirror.pool.close().await;
    println!("Database initialized successfully.");
    Ok(())
}

pub async fn run_repo_add(
    config: Config,
    project: &str,
    name: &str,
    url: &str,
    branch: Option<String>,
) -> Result<()> {
    let branch = branch.unwrap_or_else(|| config.sync.default_branch.clone());
    let mirror = Mirror::open(config).await?;
    let repo = mirror
        .sync
        .register_repository(project, name, url, &branch)
        .await?;
    println!("{}", repo.id);
    Ok(())
}

pub async fn run_repo_list(config: Config) -> Result<()> {
    let mirror = Mirror::open(config).await?;
    let repos = mirror.sync.list_repositories().await?;
    if repos.is_empty() {
        println!("No repositories registered.");
        return Ok(());
    }
    for repo in repos {
        println!(
            "{}  project={}  name={}  branch={}  last_commit={}",
            repo.id,
            repo.project_id,
            repo.name,
            repo.default_branch,
            repo.last_synced_commit.as_deref().unwrap_or("-")
        );
        println!("    url: {}", repo.url);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn run_sync(
    config: Config,
    repository_id: &str,
    mode: &str,
    branch: Option<String>,
    commit: Option<String>,
    since_commit: Option<String>,
    no_embed: bool,
) -> Result<()> {
    let mode: SyncMode = mode.parse()?;
    let mirror = Mirror::open(config).await?;

    let request = SyncRequest {
        repository_id: repository_id.to_string(),
        branch,
        mode,
        target_commit: commit,
        last_synced_commit: since_commit,
        enable_embedding: !no_embed,
    };
    let outcome = mirror.sync.sync_repository(request).await?;

    println!("sync {}", repository_id);
    println!("  job: {}", outcome.job_id);
    println!("  commit: {}", outcome.last_commit);
    println!("  documents processed: {}", outcome.processed);
    println!("  documents written: {}", outcome.written);
    println!("  documents deleted: {}", outcome.deleted);
    println!("  documents failed: {}", outcome.failed);

    if let Some(handle) = outcome.indexing {
        match handle.await {
            Ok(report) => {
                println!("  chunks indexed: {}", report.indexed);
                println!("  chunks failed to index: {}", report.failed);
            }
            Err(e) => eprintln!("Warning: indexing task failed: {}", e),
        }
    }
    Ok(())
}

pub async fn run_jobs(config: Config, repository_id: &str) -> Result<()> {
    let mirror = Mirror::open(config).await?;
    let jobs = mirror.sync.list_jobs(repository_id).await?;
    if jobs.is_empty() {
        println!("No sync jobs.");
        return Ok(());
    }
    for job in jobs {
        println!(
            "{}  {}  {}  started={}  processed={}  failed={}  commit={}",
            job.id,
            job.mode.as_str(),
            job.status.as_str(),
            format_ts_iso(job.started_at),
            job.documents_processed,
            job.documents_failed,
            job.last_commit.as_deref().unwrap_or("-")
        );
        if let Some(message) = job.message {
            println!("    {}", message);
        }
    }
    Ok(())
}

pub async fn run_commits(
    config: Config,
    repository_id: &str,
    branch: Option<String>,
    skip: usize,
    limit: usize,
) -> Result<()> {
    let mirror = Mirror::open(config).await?;
    let commits = mirror
        .sync
        .list_commits(repository_id, branch.as_deref(), skip, limit)
        .await?;
    if commits.is_empty() {
        println!("No commits.");
        return Ok(());
    }
    for c in commits {
        println!(
            "{}  {}  {} <{}>  {}",
            &c.sha[..c.sha.len().min(12)],
            c.committed_at.format("%Y-%m-%d"),
            c.author_name,
            c.author_email,
            c.message
        );
    }
    Ok(())
}

pub async fn run_diff(
    config: Config,
    repository_id: &str,
    from: Option<String>,
    to: &str,
) -> Result<()> {
    let mirror = Mirror::open(config).await?;
    let changes = mirror
        .sync
        .diff(repository_id, from.as_deref(), to)
        .await?;
    for change in changes {
        match change.old_path {
            Some(old) => println!("{:<9} {} -> {}", change.kind.as_str(), old, change.path),
            None => println!("{:<9} {}", change.kind.as_str(), change.path),
        }
    }
    Ok(())
}

pub async fn run_search(
    config: Config,
    project: &str,
    query: &str,
    mode: &str,
    limit: Option<usize>,
) -> Result<()> {
    let mode: SearchMode = mode.parse()?;
    let top_k = limit.unwrap_or(config.retrieval.default_top_k);
    let mirror = Mirror::open(config).await?;

    let results = mirror.search.search(project, query, mode, top_k).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {}{}",
            i + 1,
            r.score,
            r.path,
            r.heading_path
                .as_deref()
                .map(|h| format!(" ({})", h))
                .unwrap_or_default()
        );
        println!(
            "    commit: {}  document: {}",
            &r.commit_sha[..r.commit_sha.len().min(12)],
            r.document_id
        );
        println!("    {}", r.snippet.replace('\n', " "));
    }
    Ok(())
}

pub async fn run_graph_query(config: Config, question: &str, execute: bool) -> Result<()> {
    let mirror = Mirror::open(config).await?;
    let query = mirror.generate_graph_query(question).await?;
    println!("{}", query);

    if execute {
        let rows = mirror.graph.execute_query(&query, 50).await?;
        for row in rows {
            let cells: Vec<String> = row
                .iter()
                .map(|(column, value)| format!("{}={}", column, value))
                .collect();
            println!("  {}", cells.join("  "));
        }
    }
    Ok(())
}

pub async fn run_embed_pending(config: Config, project: &str) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    let mirror = Mirror::open(config).await?;
    let Some(semantic) = mirror.search.semantic() else {
        bail!("Semantic search is not configured.");
    };

    let report = semantic.index_pending(project).await?;
    println!("embed pending");
    println!("  embedded: {}", report.indexed);
    println!("  failed: {}", report.failed);
    Ok(())
}
