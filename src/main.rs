//! # docmirror CLI
//!
//! Mirrors Git repositories into a searchable documentation knowledge base.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docmirror init` | Create the SQLite database and run schema migrations |
//! | `docmirror repo add` | Register a repository under a project |
//! | `docmirror repo list` | List registered repositories |
//! | `docmirror sync <repo>` | Mirror a branch into the knowledge base |
//! | `docmirror jobs <repo>` | Show sync job history |
//! | `docmirror commits <repo>` | Walk a branch's history |
//! | `docmirror diff <repo> <to>` | Classified tree diff between commits |
//! | `docmirror search "<query>"` | Keyword, semantic, hybrid, or graph search |
//! | `docmirror graph-query "<question>"` | Synthesize a validated graph query |
//! | `docmirror embed pending` | Backfill missing or stale embeddings |
//!
//! Logs go to stderr and honour `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docmirror::commands;
use docmirror::config;

#[derive(Parser)]
#[command(
    name = "docmirror",
    about = "Mirror Git repositories into a searchable documentation knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docmirror.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage registered repositories.
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Mirror one branch of a repository.
    Sync {
        /// Repository id.
        repository: String,

        /// `full`, `incremental`, or `commit`.
        #[arg(long, default_value = "incremental")]
        mode: String,

        /// Branch to sync; defaults to the repository's default branch.
        #[arg(long)]
        branch: Option<String>,

        /// Target commit; defaults to the branch tip.
        #[arg(long)]
        commit: Option<String>,

        /// Diff base for incremental mode; defaults to the last synced commit.
        #[arg(long)]
        since_commit: Option<String>,

        /// Skip embedding of new versions.
        #[arg(long)]
        no_embed: bool,
    },

    /// List sync jobs of a repository, newest first.
    Jobs {
        repository: String,
    },

    /// List commits on a branch.
    Commits {
        repository: String,

        #[arg(long)]
        branch: Option<String>,

        #[arg(long, default_value_t = 0)]
        skip: usize,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show the classified tree diff between two commits.
    Diff {
        repository: String,

        /// New commit.
        to: String,

        /// Old commit; omit to diff against the empty tree.
        #[arg(long)]
        from: Option<String>,
    },

    /// Search a project's documents.
    Search {
        query: String,

        #[arg(long)]
        project: String,

        /// `keyword`, `semantic`, `hybrid`, or `graph`.
        #[arg(long, default_value = "keyword")]
        mode: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Turn a question into a graph query that is known to execute.
    GraphQuery {
        question: String,

        /// Also run the query and print up to 50 rows.
        #[arg(long)]
        execute: bool,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },
}

#[derive(Subcommand)]
enum RepoAction {
    /// Register a repository and print its id.
    Add {
        #[arg(long)]
        project: String,

        #[arg(long)]
        name: String,

        /// Clone URL or local path.
        #[arg(long)]
        url: String,

        /// Default branch; falls back to `[sync] default_branch`.
        #[arg(long)]
        branch: Option<String>,
    },
    List,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed current chunks whose vector is missing or stale.
    Pending {
        #[arg(long)]
        project: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => commands::run_init(cfg).await?,
        Commands::Repo { action } => match action {
            RepoAction::Add {
                project,
                name,
                url,
                branch,
            } => commands::run_repo_add(cfg, &project, &name, &url, branch).await?,
            RepoAction::List => commands::run_repo_list(cfg).await?,
        },
        Commands::Sync {
            repository,
            mode,
            branch,
            commit,
            since_commit,
            no_embed,
        } => {
            commands::run_sync(
                cfg,
                &repository,
                &mode,
                branch,
                commit,
                since_commit,
                no_embed,
            )
            .await?
        }
        Commands::Jobs { repository } => commands::run_jobs(cfg, &repository).await?,
        Commands::Commits {
            repository,
            branch,
            skip,
            limit,
        } => commands::run_commits(cfg, &repository, branch, skip, limit).await?,
        Commands::Diff {
            repository,
            to,
            from,
        } => commands::run_diff(cfg, &repository, from, &to).await?,
        Commands::Search {
            query,
            project,
            mode,
            limit,
        } => commands::run_search(cfg, &project, &query, &mode, limit).await?,
        Commands::GraphQuery { question, execute } => {
            commands::run_graph_query(cfg, &question, execute).await?
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { project } => {
                commands::run_embed_pending(cfg, &project).await?
            }
        },
    }

    Ok(())
}
