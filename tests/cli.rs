mod common;

use std::path::Path;
use std::process::Command;

use common::{TestEnv, TestRepo};

fn run_docmirror(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_docmirror"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docmirror: {}", e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn seeded_repo() -> TestRepo {
    let repo = TestRepo::new();
    repo.write("README.md", "# Demo\nA demo project.\n");
    repo.write(
        "docs/install.md",
        "# Install\n\n## Linux\nRun the installer script.\n",
    );
    repo.write("src/main.rs", "fn main() {}\n");
    repo.commit("initial docs");
    repo
}

fn add_repo(config: &Path, repo: &TestRepo) -> String {
    let (stdout, stderr, ok) = run_docmirror(
        config,
        &[
            "repo", "add", "--project", "proj", "--name", "demo", "--url", &repo.url(),
            "--branch", "main",
        ],
    );
    assert!(ok, "repo add failed: {}", stderr);
    stdout.trim().to_string()
}

#[test]
fn test_init_is_idempotent() {
    let env = TestEnv::new();

    let (stdout, stderr, ok) = run_docmirror(&env.config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));

    let (_, stderr, ok) = run_docmirror(&env.config_path, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_repo_add_and_list() {
    let env = TestEnv::new();
    let repo = seeded_repo();
    run_docmirror(&env.config_path, &["init"]);

    let id = add_repo(&env.config_path, &repo);
    assert!(!id.is_empty());

    let (stdout, _, ok) = run_docmirror(&env.config_path, &["repo", "list"]);
    assert!(ok);
    assert!(stdout.contains(&id));
    assert!(stdout.contains(&repo.url()));
}

#[test]
fn test_sync_then_search_and_jobs() {
    let env = TestEnv::new();
    let repo = seeded_repo();
    run_docmirror(&env.config_path, &["init"]);
    let id = add_repo(&env.config_path, &repo);

    let (stdout, stderr, ok) =
        run_docmirror(&env.config_path, &["sync", &id, "--mode", "full"]);
    assert!(ok, "sync failed: {}", stderr);
    assert!(stdout.contains("documents written: 2"));
    assert!(stdout.contains("documents failed: 0"));

    let (stdout, _, ok) = run_docmirror(
        &env.config_path,
        &["search", "installer", "--project", "proj", "--mode", "keyword"],
    );
    assert!(ok);
    assert!(stdout.contains("docs/install.md"));

    let (stdout, _, ok) = run_docmirror(
        &env.config_path,
        &["search", "nothing-matches-this", "--project", "proj"],
    );
    assert!(ok);
    assert!(stdout.contains("No results."));

    let (stdout, _, ok) = run_docmirror(&env.config_path, &["jobs", &id]);
    assert!(ok);
    assert!(stdout.contains("FULL"));
    assert!(stdout.contains("COMPLETED"));
}

#[test]
fn test_commits_and_diff() {
    let env = TestEnv::new();
    let repo = seeded_repo();
    repo.write("docs/install.md", "# Install\n\nUse the package manager.\n");
    let head = repo.commit("rewrite install");
    run_docmirror(&env.config_path, &["init"]);
    let id = add_repo(&env.config_path, &repo);

    let (stdout, stderr, ok) =
        run_docmirror(&env.config_path, &["commits", &id, "--limit", "1"]);
    assert!(ok, "commits failed: {}", stderr);
    assert!(stdout.contains("rewrite install"));
    assert!(!stdout.contains("initial docs"));

    let (stdout, _, ok) = run_docmirror(
        &env.config_path,
        &["diff", &id, &head, "--from", &format!("{head}~1")],
    );
    assert!(ok);
    assert!(stdout.contains("MODIFIED"));
    assert!(stdout.contains("docs/install.md"));
}

#[test]
fn test_invalid_modes_are_rejected() {
    let env = TestEnv::new();
    let repo = seeded_repo();
    run_docmirror(&env.config_path, &["init"]);
    let id = add_repo(&env.config_path, &repo);

    let (_, stderr, ok) = run_docmirror(&env.config_path, &["sync", &id, "--mode", "sideways"]);
    assert!(!ok);
    assert!(stderr.contains("unknown sync mode"));

    let (_, _, ok) = run_docmirror(
        &env.config_path,
        &["search", "x", "--project", "proj", "--mode", "fuzzy"],
    );
    assert!(!ok);
}

#[test]
fn test_sync_unknown_repository_fails() {
    let env = TestEnv::new();
    run_docmirror(&env.config_path, &["init"]);

    let (_, stderr, ok) = run_docmirror(&env.config_path, &["sync", "no-such-repo"]);
    assert!(!ok);
    assert!(stderr.contains("repository not found"));
}
