//! Commit walker over a local working copy, driven by the `git` CLI.
//!
//! Read operations that take commit identifiers never fail on an
//! unresolvable SHA or branch: they log a warning and return an empty
//! result. Operations that change the working copy (clone, fetch,
//! checkout) return errors, since a sync cannot proceed without them.
//!
//! All functions are blocking; async callers run them on the blocking
//! pool.

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use docmirror_core::models::{ChangeKind, CommitInfo, FileChange};
use docmirror_core::scanner::DocumentScanner;

/// Git's well-known empty tree object.
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';
const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%ae%x1f%ct%x1f%P%x1f%s%x1e";

/// A local git working copy.
#[derive(Debug, Clone)]
pub struct GitRepo {
    dir: PathBuf,
}

impl GitRepo {
    /// Open an existing working copy.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.join(".git").exists() {
            bail!("{} is not a git working copy", dir.display());
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Open `dir` if it already holds a working copy, otherwise clone `url` into it.
    pub fn clone_or_open(url: &str, dir: &Path) -> Result<Self> {
        if dir.join(".git").exists() {
            return Self::open(dir);
        }
        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let output = Command::new("git")
            .arg("clone")
            .arg("--quiet")
            .arg(url)
            .arg(dir)
            .output()
            .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git clone failed: {}", stderr.trim());
        }
        tracing::info!(url = %url, dir = %dir.display(), "cloned repository");
        Self::open(dir)
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()
            .with_context(|| format!("Failed to execute 'git {}'", args.join(" ")))
    }

    fn git_ok(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = self.git(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(output.stdout)
    }

    fn has_origin(&self) -> bool {
        self.git(&["remote", "get-url", "origin"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Fetch all branches from `origin`, if the working copy has one.
    pub fn fetch(&self) -> Result<()> {
        if !self.has_origin() {
            return Ok(());
        }
        self.git_ok(&["fetch", "--quiet", "--prune", "origin"])?;
        Ok(())
    }

    /// Check out `branch`, preferring the remote-tracking ref when present.
    pub fn checkout(&self, branch: &str) -> Result<()> {
        let remote_ref = format!("origin/{}", branch);
        if self.resolve(&remote_ref).is_some() {
            self.git_ok(&["checkout", "--quiet", "-f", "-B", branch, &remote_ref])?;
        } else if self.resolve(branch).is_some() {
            self.git_ok(&["checkout", "--quiet", "-f", branch])?;
        } else {
            bail!("branch '{}' not found", branch);
        }
        Ok(())
    }

    /// Resolve any revision to a full commit SHA.
    pub fn resolve(&self, rev: &str) -> Option<String> {
        let spec = format!("{}^{{commit}}", rev);
        let output = self
            .git(&["rev-parse", "--verify", "--quiet", &spec])
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!sha.is_empty()).then_some(sha)
    }

    /// Resolve a branch tip: local ref first, then the remote-tracking ref.
    pub fn resolve_branch(&self, branch: &str) -> Option<String> {
        self.resolve(&format!("refs/heads/{}", branch))
            .or_else(|| self.resolve(&format!("refs/remotes/origin/{}", branch)))
    }

    /// Ancestry of `branch` from its tip, skipping `skip` and returning at
    /// most `limit` commits. An unknown branch yields an empty list.
    pub fn list_commits(&self, branch: &str, skip: usize, limit: usize) -> Vec<CommitInfo> {
        let Some(tip) = self.resolve_branch(branch) else {
            tracing::warn!(branch = %branch, "branch not found; no commits listed");
            return Vec::new();
        };
        let skip = format!("--skip={}", skip);
        let limit = format!("--max-count={}", limit);
        self.log(&[&skip, &limit, &tip])
    }

    /// Commits reachable from `to_inclusive` but not from `from_exclusive`.
    ///
    /// Order is git's default traversal; callers must not rely on it
    /// beyond reachability.
    pub fn walk_range(&self, from_exclusive: Option<&str>, to_inclusive: &str) -> Vec<CommitInfo> {
        let Some(to) = self.resolve(to_inclusive) else {
            tracing::warn!(commit = %to_inclusive, "unresolved commit; empty range");
            return Vec::new();
        };
        match from_exclusive {
            Some(from) => match self.resolve(from) {
                Some(from) => self.log(&[&format!("{}..{}", from, to)]),
                None => {
                    tracing::warn!(commit = %from, "unresolved commit; empty range");
                    Vec::new()
                }
            },
            None => self.log(&[&to]),
        }
    }

    /// Metadata for one commit.
    pub fn commit_info(&self, rev: &str) -> Option<CommitInfo> {
        let sha = self.resolve(rev)?;
        self.log(&["--max-count=1", &sha]).into_iter().next()
    }

    /// Most recent commit at or before `commit` that touched `path`.
    pub fn last_commit_for_path(&self, commit: &str, path: &str) -> Option<CommitInfo> {
        let output = self
            .git(&["log", "--max-count=1", LOG_FORMAT, commit, "--", path])
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_log(&String::from_utf8_lossy(&output.stdout))
            .into_iter()
            .next()
    }

    fn log(&self, args: &[&str]) -> Vec<CommitInfo> {
        let mut full = vec!["log", LOG_FORMAT];
        full.extend_from_slice(args);
        match self.git_ok(&full) {
            Ok(stdout) => parse_log(&String::from_utf8_lossy(&stdout)),
            Err(e) => {
                tracing::warn!("git log failed: {e:#}");
                Vec::new()
            }
        }
    }

    /// Tree diff between two commits with rename detection.
    ///
    /// `old_commit = None` diffs against the empty tree, so every file at
    /// `new_commit` is reported as added.
    pub fn diff(&self, old_commit: Option<&str>, new_commit: &str) -> Vec<FileChange> {
        let Some(new) = self.resolve(new_commit) else {
            tracing::warn!(commit = %new_commit, "unresolved commit; empty diff");
            return Vec::new();
        };
        let old = match old_commit {
            Some(rev) => match self.resolve(rev) {
                Some(sha) => sha,
                None => {
                    tracing::warn!(commit = %rev, "unresolved commit; empty diff");
                    return Vec::new();
                }
            },
            None => EMPTY_TREE.to_string(),
        };
        match self.git_ok(&["diff-tree", "-r", "-M", "--name-status", "-z", &old, &new]) {
            Ok(stdout) => parse_name_status(&String::from_utf8_lossy(&stdout)),
            Err(e) => {
                tracing::warn!("git diff-tree failed: {e:#}");
                Vec::new()
            }
        }
    }

    /// Changes introduced by a single commit (against its first parent).
    pub fn commit_changes(&self, commit: &str) -> Vec<FileChange> {
        let Some(info) = self.commit_info(commit) else {
            tracing::warn!(commit = %commit, "unresolved commit; no changes");
            return Vec::new();
        };
        self.diff(info.parents.first().map(String::as_str), &info.sha)
    }

    /// Every file path in the tree at `commit`.
    pub fn list_files(&self, commit: &str) -> Result<Vec<String>> {
        let stdout = self.git_ok(&["ls-tree", "-r", "-z", "--name-only", commit])?;
        Ok(String::from_utf8_lossy(&stdout)
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Documentation files in the tree at `commit`.
    pub fn scan_document_files(
        &self,
        scanner: &DocumentScanner,
        commit: &str,
    ) -> Result<Vec<String>> {
        let files = self.list_files(commit)?;
        Ok(scanner.filter(files.iter().map(String::as_str)))
    }

    /// Raw blob bytes of `path` at `commit`, or `None` if the path does not
    /// exist there.
    pub fn read_blob(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let spec = format!("{}:{}", commit, path);
        let output = self.git(&["cat-file", "blob", &spec])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(output.stdout))
    }
}

/// Decode a blob as document text. Binary or non-UTF-8 content yields `None`.
pub fn blob_text(bytes: Vec<u8>) -> Option<String> {
    if bytes.contains(&0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

fn parse_log(stdout: &str) -> Vec<CommitInfo> {
    stdout
        .split(RECORD_SEP)
        .filter_map(|record| {
            let record = record.trim_start_matches('\n');
            if record.trim().is_empty() {
                return None;
            }
            let fields: Vec<&str> = record.splitn(6, FIELD_SEP).collect();
            if fields.len() != 6 {
                return None;
            }
            let ts: i64 = fields[3].trim().parse().ok()?;
            Some(CommitInfo {
                sha: fields[0].to_string(),
                author_name: fields[1].to_string(),
                author_email: fields[2].to_string(),
                committed_at: Utc.timestamp_opt(ts, 0).single()?,
                parents: fields[4].split_whitespace().map(str::to_string).collect(),
                message: fields[5].trim_end().to_string(),
            })
        })
        .collect()
}

/// Parse `git diff-tree --name-status -z` output.
///
/// Copies and type changes are reported as [`ChangeKind::Modified`] on the
/// destination path.
fn parse_name_status(stdout: &str) -> Vec<FileChange> {
    let mut tokens = stdout.split('\0').filter(|t| !t.is_empty());
    let mut changes = Vec::new();

    while let Some(status) = tokens.next() {
        let code = status.chars().next().unwrap_or(' ');
        match code {
            'R' | 'C' => {
                let (Some(old), Some(new)) = (tokens.next(), tokens.next()) else {
                    break;
                };
                changes.push(if code == 'R' {
                    FileChange {
                        kind: ChangeKind::Renamed,
                        path: new.to_string(),
                        old_path: Some(old.to_string()),
                    }
                } else {
                    FileChange {
                        kind: ChangeKind::Modified,
                        path: new.to_string(),
                        old_path: None,
                    }
                });
            }
            _ => {
                let Some(path) = tokens.next() else {
                    break;
                };
                let kind = match code {
                    'A' => ChangeKind::Added,
                    'D' => ChangeKind::Deleted,
                    _ => ChangeKind::Modified,
                };
                changes.push(FileChange {
                    kind,
                    path: path.to_string(),
                    old_path: None,
                });
            }
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_records() {
        let out = "abc\u{1f}Ada\u{1f}ada@example.com\u{1f}1700000000\u{1f}p1 p2\u{1f}Merge docs\u{1e}\n\
                   def\u{1f}Bob\u{1f}bob@example.com\u{1f}1600000000\u{1f}\u{1f}Initial\u{1e}\n";
        let commits = parse_log(out);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].sha, "abc");
        assert_eq!(commits[0].parents, vec!["p1", "p2"]);
        assert_eq!(commits[0].message, "Merge docs");
        assert_eq!(commits[1].committed_at.timestamp(), 1_600_000_000);
        assert!(commits[1].parents.is_empty());
    }

    #[test]
    fn parses_name_status_kinds() {
        let out = "A\0docs/new.md\0M\0README.md\0D\0docs/old.md\0R100\0docs/a.md\0docs/b.md\0C75\0x.md\0y.md\0T\0link.md\0";
        let changes = parse_name_status(out);
        let kinds: Vec<ChangeKind> = changes.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Added,
                ChangeKind::Modified,
                ChangeKind::Deleted,
                ChangeKind::Renamed,
                ChangeKind::Modified,
                ChangeKind::Modified,
            ]
        );
        assert_eq!(changes[2].path, "docs/old.md");
        assert_eq!(changes[3].path, "docs/b.md");
        assert_eq!(changes[3].old_path.as_deref(), Some("docs/a.md"));
        assert_eq!(changes[4].path, "y.md");
    }

    #[test]
    fn blob_text_rejects_binary() {
        assert_eq!(blob_text(b"# Title".to_vec()).as_deref(), Some("# Title"));
        assert_eq!(blob_text(vec![0x89, b'P', b'N', b'G', 0]), None);
        assert_eq!(blob_text(vec![0xff, 0xfe]), None);
    }
}
