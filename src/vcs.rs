//! Generic VCS backend (git only).
//!
//! Used for import paths whose discovered repository is not on a static
//! backend. The remote is listed with `git ls-remote` over the allowed
//! schemes, the best ref is shallow-cloned into a local cache, and the
//! direct documentable files of the directory are read from the checkout.
//!
//! | Step | Command |
//! |------|---------|
//! | list | `git ls-remote --heads --tags <scheme>://<repo>.git` |
//! | first checkout | `git clone --depth 1 --branch <ref>` |
//! | later checkouts | `git fetch --depth 1 origin <ref>` |
//! | pin | `git checkout --detach --force <commit>` |
//!
//! Unknown hosts offer no browse URLs, so declarations carry none.

use anyhow::{bail, Context};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, info};

use docwalker_core::models::{PackageRecord, Source};
use docwalker_core::path::{filter_dir_name, is_doc_file};

use crate::config::VcsConfig;
use crate::error::CrawlError;
use crate::fetch::Fetched;
use crate::resolver::VcsMatch;

static LS_REMOTE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([0-9a-f]{40})\s+refs/(?:tags|heads)/(\S+)$").unwrap()
});

/// Preferred refs, best first.
const PREFERRED_REFS: &[&str] = &["go1", "master", "main"];

pub struct GitFetcher {
    cache_dir: PathBuf,
    schemes: Vec<String>,
}

impl GitFetcher {
    pub fn new(cfg: &VcsConfig) -> Self {
        Self {
            cache_dir: cfg.cache_dir.clone(),
            schemes: cfg.schemes.clone(),
        }
    }

    pub async fn fetch(&self, m: &VcsMatch, saved_etag: &str) -> Result<Fetched, CrawlError> {
        if m.vcs != "git" {
            return Err(CrawlError::NotFound(format!("VCS not supported: {}", m.vcs)));
        }

        let (scheme, refs) = self.list_remote(&m.repo, &m.scheme, saved_etag).await?;
        let (tag, commit) = best_ref(&refs)
            .ok_or_else(|| CrawlError::NotFound(format!("no usable branch or tag in {}", m.repo)))?;

        let etag = format!("{}-{}", scheme, commit);
        if etag == saved_etag {
            return Err(CrawlError::NotModified);
        }

        let url = format!("{}://{}.git", scheme, m.repo);
        let dest = self.cache_dir.join(format!("{}.git", m.repo));
        checkout(&url, &tag, &commit, &dest).await?;

        let dir = dest.join(m.dir.trim_start_matches('/'));
        let (sources, subdirs) = read_dir(&dir).await?;
        if sources.is_empty() && subdirs.is_empty() {
            return Err(CrawlError::NoGoFiles);
        }

        let mut record = PackageRecord::new(&m.import_path);
        record.project_path = m.repo.clone();
        record.view_dir_path = format!("{}{}", m.repo, m.dir);
        record.etag = etag;
        record.subdirs = subdirs;

        Ok(Fetched {
            record,
            sources,
            line_fmt: String::new(),
        })
    }

    /// Find the first scheme that answers `ls-remote`.
    async fn list_remote(
        &self,
        repo: &str,
        meta_scheme: &str,
        saved_etag: &str,
    ) -> Result<(String, Vec<(String, String)>), CrawlError> {
        let allowed = |s: &str| !s.is_empty() && self.schemes.iter().any(|a| a == s);
        let etag_scheme = saved_etag.split_once('-').map(|(s, _)| s).unwrap_or_default();
        // A scheme named in the discovered URL is the only one tried; the
        // scheme of the last successful listing goes first.
        let candidates: Vec<&str> = if allowed(meta_scheme) {
            vec![meta_scheme]
        } else {
            let mut all: Vec<&str> = self.schemes.iter().map(String::as_str).collect();
            if allowed(etag_scheme) {
                all.retain(|s| *s != etag_scheme);
                all.insert(0, etag_scheme);
            }
            all
        };

        let mut missing = None;
        let mut last_err = None;
        for scheme in candidates {
            let url = format!("{}://{}.git", scheme, repo);
            match git(&["ls-remote", "--heads", "--tags", url.as_str()], None).await {
                Ok(out) => return Ok((scheme.to_string(), parse_ls_remote(&out))),
                Err(e) => {
                    debug!(url = %url, error = %e, "ls-remote failed");
                    if is_missing_repo(&e.to_string()) {
                        missing = Some(e);
                    } else {
                        last_err = Some(e);
                    }
                }
            }
        }
        // Only a remote reporting a missing repository is gone.
        match (missing, last_err) {
            (Some(e), _) => Err(CrawlError::NotFound(format!("{}: {}", repo, e))),
            (None, Some(e)) => Err(CrawlError::Other(e.context(format!("ls-remote {}", repo)))),
            (None, None) => Err(CrawlError::other(format!("no VCS scheme allowed for {}", repo))),
        }
    }
}

/// Whether git's stderr says the remote repository does not exist.
fn is_missing_repo(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("not found") || lower.contains("does not exist")
}

/// `(ref name, commit)` pairs from `git ls-remote` output.
pub fn parse_ls_remote(out: &str) -> Vec<(String, String)> {
    LS_REMOTE_REF
        .captures_iter(out)
        .map(|c| (c[2].trim_end_matches("^{}").to_string(), c[1].to_string()))
        .collect()
}

/// Pick `go1`, then `master`, then `main`. A peeled annotated tag follows
/// its tag object, so the last match wins.
pub fn best_ref(refs: &[(String, String)]) -> Option<(String, String)> {
    PREFERRED_REFS
        .iter()
        .find_map(|want| refs.iter().rev().find(|(name, _)| name == want).cloned())
}

async fn git(args: &[&str], dir: Option<&Path>) -> anyhow::Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    let output = cmd
        .output()
        .await
        .with_context(|| format!("Failed to execute 'git {}'. Is git installed?", args[0]))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", args[0], stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

async fn checkout(url: &str, tag: &str, commit: &str, dest: &Path) -> anyhow::Result<()> {
    if dest.join(".git").exists() {
        let head = git(&["rev-parse", "HEAD"], Some(dest)).await.unwrap_or_default();
        if head.trim() == commit {
            return Ok(());
        }
        git(&["fetch", "--depth", "1", "origin", tag], Some(dest)).await?;
    } else {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
        }
        let dest_str = dest.to_string_lossy().into_owned();
        git(&["clone", "--depth", "1", "--branch", tag, url, dest_str.as_str()], None).await?;
    }
    git(&["checkout", "--detach", "--force", commit], Some(dest)).await?;
    info!(url, tag, commit, "checked out");
    Ok(())
}

/// Direct documentable files of `dir` (data loaded) and its direct
/// subdirectories that hold documentable files.
async fn read_dir(dir: &Path) -> Result<(Vec<Source>, Vec<String>), CrawlError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CrawlError::NotFound(dir.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let mut sources = Vec::new();
    let mut subdirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let kind = entry.file_type().await?;
        if kind.is_file() && is_doc_file(&name) {
            let mut src = Source::new(name, "", "");
            src.data = tokio::fs::read(entry.path()).await?;
            sources.push(src);
        } else if kind.is_dir() && !name.starts_with('.') && filter_dir_name(&name) && has_doc_file(&entry.path()).await? {
            subdirs.push(name);
        }
    }
    sources.sort_by(|a, b| a.name.cmp(&b.name));
    subdirs.sort();
    Ok((sources, subdirs))
}

async fn has_doc_file(dir: &Path) -> Result<bool, CrawlError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() && is_doc_file(&entry.file_name().to_string_lossy()) {
            return Ok(true);
        }
    }
    Ok(false)
}
