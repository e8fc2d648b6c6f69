#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use docmirror::config::{load_config, Config};
use docmirror::context::{Mirror, Providers};
use docmirror_core::embedding::EmbeddingProvider;
use docmirror_core::llm::CompletionProvider;

/// A throwaway git repository on branch `main`.
pub struct TestRepo {
    _tmp: TempDir,
    pub dir: PathBuf,
}

impl TestRepo {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("origin");
        fs::create_dir_all(&dir).unwrap();
        let repo = Self { _tmp: tmp, dir };
        repo.git(&["init", "-q"]);
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        repo
    }

    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args([
                "-c",
                "user.name=Doc Writer",
                "-c",
                "user.email=writer@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(&self.dir)
            .output()
            .expect("git is installed");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn write(&self, path: &str, content: &str) {
        let full = self.dir.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    pub fn write_bytes(&self, path: &str, bytes: &[u8]) {
        let full = self.dir.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, bytes).unwrap();
    }

    pub fn remove(&self, path: &str) {
        self.git(&["rm", "-q", path]);
    }

    pub fn rename(&self, from: &str, to: &str) {
        let target = self.dir.join(to);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        self.git(&["mv", from, to]);
    }

    /// Stage everything and commit; returns the new commit SHA.
    pub fn commit(&self, message: &str) -> String {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "--allow-empty", "-m", message]);
        self.git(&["rev-parse", "HEAD"])
    }

    pub fn url(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Config file plus data directory in a temp dir.
pub struct TestEnv {
    pub tmp: TempDir,
    pub config_path: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_extra("")
    }

    pub fn with_extra(extra: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let config_path = root.join("config").join("docmirror.toml");
        fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        fs::write(
            &config_path,
            format!(
                "[db]\npath = \"{}\"\n\n[workspace]\ndir = \"{}\"\n{}",
                root.join("data").join("docmirror.sqlite").display(),
                root.join("data").join("repos").display(),
                extra
            ),
        )
        .unwrap();
        Self { tmp, config_path }
    }

    pub fn config(&self) -> Config {
        load_config(&self.config_path).unwrap()
    }

    pub async fn mirror(&self, providers: Providers) -> Mirror {
        let config = self.config();
        let pool = docmirror::db::connect(&config).await.unwrap();
        Mirror::with_providers(config, pool, providers).await.unwrap()
    }
}

/// Bag-of-keywords embedding over a fixed vocabulary.
pub struct KeywordEmbedder;

pub const VOCAB: &[&str] = &["install", "deploy", "api", "auth", "sync", "graph"];

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-embedder"
    }
    fn dims(&self) -> usize {
        VOCAB.len()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                VOCAB
                    .iter()
                    .map(|w| lower.matches(w).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// LLM stub: answers extraction prompts with a fixed entity set and
/// synthesis prompts with scripted queries.
pub struct StubLlm {
    pub extraction: String,
    pub queries: std::sync::Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl StubLlm {
    pub fn new(extraction: &str, queries: &[&str]) -> Arc<Self> {
        let mut queries: Vec<String> = queries.iter().map(|q| q.to_string()).collect();
        queries.reverse();
        Arc::new(Self {
            extraction: extraction.to_string(),
            queries: std::sync::Mutex::new(queries),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }
    async fn complete(&self, prompt: &str) -> Result<String> {
        if prompt.starts_with("Extract the key entities") {
            return Ok(self.extraction.clone());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut queries = self.queries.lock().unwrap();
        Ok(queries
            .pop()
            .unwrap_or_else(|| "SELECT bogus FROM graph_entities".to_string()))
    }
}
