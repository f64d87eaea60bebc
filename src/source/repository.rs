// src/source/repository.rs
//
// Repository source: walks the first-parent chain of a branch (or HEAD)
// and emits one CommitPair per adjacent non-merge pair, with diff stats
// and best-effort diff content (spec §4.1).
//
// Shells out to the system `git` binary rather than re-implementing a
// packfile/object-store parser — first-parent log plus --numstat/--patch
// gives everything a CommitPair needs without walking loose/packed
// objects by hand.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use glob::Pattern;
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::data::{CommitPair, RawContent, SourceData};
use crate::error::CadenceError;
use crate::source::{is_cancelled, CancelFlag, Source};

pub struct RepositorySource {
    pub path: PathBuf,
    pub branch: Option<String>,
    pub exclude_patterns: Vec<String>,
    /// Keeps a scratch clone directory alive for exactly as long as this
    /// source is, so a webhook-triggered clone survives the whole analysis
    /// instead of being cleaned up while the streaming runner still reads it.
    #[allow(dead_code)]
    clone_guard: Option<std::sync::Arc<tempfile::TempDir>>,
}

impl RepositorySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            branch: None,
            exclude_patterns: Vec::new(),
            clone_guard: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Ties the given scratch directory's lifetime to this source.
    pub fn with_clone_guard(mut self, guard: std::sync::Arc<tempfile::TempDir>) -> Self {
        self.clone_guard = Some(guard);
        self
    }

    async fn git(&self, args: &[&str]) -> Result<String, CadenceError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .args(args)
            .output()
            .await
            .map_err(|e| CadenceError::io(format!("spawning git failed: {e}")))?;

        if !output.status.success() {
            return Err(CadenceError::io(format!(
                "git {:?} exited with {}: {}",
                args,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Whether a path should be dropped by the exclude-file globs. Matched
    /// against both the base name and the whole path (OR semantics — the
    /// source material showed both variants, spec §9 says apply both).
    fn is_excluded(&self, path: &str) -> bool {
        let base = Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path);
        self.exclude_patterns.iter().any(|pat| {
            Pattern::new(pat)
                .map(|p| p.matches(base) || p.matches(path))
                .unwrap_or(false)
        })
    }

    async fn revision_list(&self) -> Result<Vec<String>, CadenceError> {
        let rev = self.branch.clone().unwrap_or_else(|| "HEAD".to_string());
        let log = self
            .git(&["log", "--first-parent", "--format=%H %P", &rev])
            .await?;
        Ok(log.lines().map(|l| l.to_string()).collect())
    }

    async fn commit_meta(&self, hash: &str) -> Result<(String, i64), CadenceError> {
        let out = self
            .git(&["show", "-s", "--format=%s%x00%ct", hash])
            .await?;
        let mut parts = out.trim_end().splitn(2, '\0');
        let message = parts.next().unwrap_or_default().to_string();
        let ts: i64 = parts.next().unwrap_or("0").trim().parse().unwrap_or(0);
        Ok((message, ts))
    }

    /// Numstat diff between two commits, filtered by exclude globs. Returns
    /// (filtered_add, filtered_del, files, unfiltered_add, unfiltered_del).
    async fn diff_stats(&self, from: &str, to: &str) -> Result<(u64, u64, u64, u64, u64), CadenceError> {
        let out = self.git(&["diff", "--numstat", from, to]).await?;
        let mut add = 0u64;
        let mut del = 0u64;
        let mut files = 0u64;
        let mut uadd = 0u64;
        let mut udel = 0u64;

        for line in out.lines() {
            let mut cols = line.splitn(3, '\t');
            let a = cols.next().unwrap_or("0");
            let d = cols.next().unwrap_or("0");
            let path = cols.next().unwrap_or("");
            let a: u64 = a.parse().unwrap_or(0);
            let d: u64 = d.parse().unwrap_or(0);
            uadd += a;
            udel += d;
            if self.is_excluded(path) {
                continue;
            }
            add += a;
            del += d;
            files += 1;
        }
        Ok((add, del, files, uadd, udel))
    }

    async fn diff_content(&self, from: &str, to: &str) -> String {
        match self.git(&["diff", from, to]).await {
            Ok(content) => content,
            Err(e) => {
                warn!("diff content computation failed for {from}..{to}: {e}");
                String::new()
            }
        }
    }
}

#[async_trait]
impl Source for RepositorySource {
    fn source_type(&self) -> &'static str {
        "git"
    }

    async fn validate(&self, cancel: &CancelFlag) -> Result<(), CadenceError> {
        if is_cancelled(cancel) {
            return Err(CadenceError::Cancelled("validation cancelled".to_string()));
        }
        if !self.path.is_dir() {
            return Err(CadenceError::validation(format!(
                "path does not exist or is not a directory: {}",
                self.path.display()
            )));
        }
        if !self.path.join(".git").exists() {
            return Err(CadenceError::validation(format!(
                "not a git repository: {}",
                self.path.display()
            )));
        }
        Ok(())
    }

    async fn fetch(&self, cancel: &CancelFlag) -> Result<SourceData, CadenceError> {
        if is_cancelled(cancel) {
            return Err(CadenceError::Cancelled("fetch cancelled".to_string()));
        }
        let lines = self.revision_list().await?;

        let mut pairs = Vec::new();
        // `git log --first-parent` lists newest-first; pair each commit with
        // its first parent so `current` is always the later commit.
        for line in &lines {
            if is_cancelled(cancel) {
                return Err(CadenceError::Cancelled("fetch cancelled".to_string()));
            }
            let mut cols = line.split_whitespace();
            let current = match cols.next() {
                Some(h) => h.to_string(),
                None => continue,
            };
            let parents: Vec<&str> = cols.collect();
            let is_merge = parents.len() >= 2;
            let previous = match parents.first() {
                Some(p) => p.to_string(),
                None => continue, // root commit has no previous
            };

            let (message, current_ts) = self.commit_meta(&current).await?;
            let (_, previous_ts) = self.commit_meta(&previous).await?;
            let time_delta_minutes = (current_ts - previous_ts) as f64 / 60.0;

            if is_merge {
                debug!("skipping merge commit {current}");
                continue;
            }
            if time_delta_minutes <= 0.0 {
                continue;
            }

            let (add, del, files, uadd, udel) = self.diff_stats(&previous, &current).await?;
            if add == 0 && del == 0 {
                continue; // empty diffs never run strategies, spec §9
            }
            let diff_content = self.diff_content(&previous, &current).await;

            pairs.push(CommitPair {
                previous,
                current,
                commit_message: message,
                time_delta_minutes,
                additions: add,
                deletions: del,
                files_changed: files,
                unfiltered_additions: uadd,
                unfiltered_deletions: udel,
                diff_content,
                is_merge,
            });
        }

        let commit_count = pairs.len();
        let mut metadata = HashMap::new();
        metadata.insert("commit_count".to_string(), json!(commit_count));

        Ok(SourceData {
            id: self.path.to_string_lossy().into_owned(),
            source_type: self.source_type().to_string(),
            raw_content: RawContent::CommitPairs(pairs),
            metadata,
        })
    }
}

/// Best-effort: the timestamp a pair's commit was authored, used only for
/// logging/diagnostics, not the scoring path.
#[allow(dead_code)]
fn to_datetime(unix_secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(unix_secs, 0).single().unwrap_or_else(Utc::now)
}

/// Clones `url` into a fresh scratch directory and returns a `RepositorySource`
/// over it, the clone guard keeping the directory alive for as long as the
/// source is. Used by both the webhook processor and the streaming runner's
/// clone-then-analyze flow.
pub async fn clone_remote(
    url: &str,
    branch: Option<&str>,
    exclude: Vec<String>,
) -> Result<RepositorySource, CadenceError> {
    let dir = tempfile::tempdir().map_err(|e| CadenceError::io(format!("creating scratch directory failed: {e}")))?;

    let mut args = vec!["clone".to_string(), "--depth".to_string(), "50".to_string()];
    if let Some(b) = branch {
        args.push("--branch".to_string());
        args.push(b.to_string());
    }
    args.push(url.to_string());
    args.push(dir.path().to_string_lossy().into_owned());

    let output = Command::new("git")
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CadenceError::io(format!("spawning git clone failed: {e}")))?;
    if !output.status.success() {
        return Err(CadenceError::io(format!(
            "git clone exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let mut source = RepositorySource::new(dir.path())
        .with_exclude_patterns(exclude)
        .with_clone_guard(std::sync::Arc::new(dir));
    if let Some(b) = branch {
        source = source.with_branch(b.to_string());
    }
    Ok(source)
}
