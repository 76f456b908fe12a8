//! GitHub backend.
//!
//! # Protocol
//!
//! 1. Repository info: default branch, fork flag, parent, stars.
//! 2. Forks must carry commits newer than their parent.
//! 3. Revision of the branch or tag. Equal to the saved etag ends the
//!    fetch with [`CrawlError::NotModified`] before the tree is listed.
//! 4. Recursive tree listing at that revision; its self URL must carry the
//!    requested owner/repo spelling exactly.
//! 5. Direct documentable files of the directory are downloaded
//!    concurrently ([`crate::fetch::fetch_files`]).
//!
//! Readmes are rendered to HTML by the same API ([`GitHubClient::render_markdown`]).
//!
//! The standard library uses the same protocol against the `golang/go`
//! mirror; see [`crate::stdlib`].

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{debug, warn};

use docwalker_core::builder::GITHUB_LINE_FMT;
use docwalker_core::models::{PackageRecord, Source};

use crate::config::GithubConfig;
use crate::error::CrawlError;
use crate::fetch::{fetch_files, partition_tree, Fetched};
use crate::http::{get_json, get_text, send, Credentials};
use crate::resolver::GitHubMatch;

static SCRAPED_SHA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"value="([a-z0-9A-Z]+)""#).unwrap());

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    parent: Option<ParentRepo>,
    #[serde(default)]
    stargazers_count: i64,
}

#[derive(Debug, Deserialize)]
struct ParentRepo {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    committer: CommitSignature,
}

#[derive(Debug, Deserialize)]
struct CommitSignature {
    date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Tree {
    url: String,
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// One directory of one repository at one revision.
pub(crate) struct DirListing {
    pub sha: String,
    pub sources: Vec<Source>,
    pub subdirs: Vec<String>,
}

pub struct GitHubClient {
    client: Client,
    api_url: String,
    raw_url: String,
    web_url: String,
    creds: Credentials,
}

impl GitHubClient {
    pub fn new(client: Client, cfg: &GithubConfig) -> Self {
        Self {
            client,
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            raw_url: cfg.raw_url.trim_end_matches('/').to_string(),
            web_url: cfg.web_url.trim_end_matches('/').to_string(),
            creds: Credentials {
                user: cfg.client_id.clone(),
                secret: cfg.client_secret.clone(),
            },
        }
    }

    /// Fetch the package a [`GitHubMatch`] points at.
    pub async fn fetch(&self, m: &GitHubMatch, saved_etag: &str) -> Result<Fetched, CrawlError> {
        let info: RepoInfo = get_json(
            &self.client,
            &format!("{}/repos/{}/{}", self.api_url, m.owner, m.repo),
            &self.creds,
        )
        .await?;

        if info.fork {
            if let Some(parent) = &info.parent {
                self.check_fork(&m.owner, &m.repo, &parent.full_name).await?;
            }
        }

        let tag = m.tag.clone().unwrap_or(info.default_branch);
        let dir = m.dir.trim_start_matches('/');
        let listing = self.list_dir(&m.owner, &m.repo, &tag, dir, saved_etag).await?;

        let mut record = PackageRecord::new(&m.import_path);
        record.project_path = format!("github.com/{}/{}", m.owner, m.repo);
        record.view_dir_path = format!("github.com/{}/{}/tree/{}{}", m.owner, m.repo, tag, m.dir);
        record.etag = listing.sha;
        record.is_subrepo = m.is_subrepo;
        record.stars = info.stargazers_count;
        record.subdirs = listing.subdirs;

        Ok(Fetched {
            record,
            sources: listing.sources,
            line_fmt: GITHUB_LINE_FMT.to_string(),
        })
    }

    async fn check_fork(&self, owner: &str, repo: &str, parent: &str) -> Result<(), CrawlError> {
        let fork_time = self.latest_commit(&format!("{}/{}", owner, repo)).await?;
        let parent_time = self.latest_commit(parent).await?;
        if fork_time <= parent_time {
            return Err(CrawlError::other(format!(
                "{}/{} is a fork with no commits after {}",
                owner, repo, parent
            )));
        }
        Ok(())
    }

    async fn latest_commit(&self, full_name: &str) -> Result<DateTime<Utc>, CrawlError> {
        let url = format!("{}/repos/{}/commits?per_page=1", self.api_url, full_name);
        let commits: Vec<CommitItem> = get_json(&self.client, &url, &self.creds).await?;
        commits
            .into_iter()
            .next()
            .map(|c| c.commit.committer.date)
            .ok_or_else(|| CrawlError::other(format!("no commits in {}", full_name)))
    }

    /// Render markdown to HTML through the `/markdown/raw` endpoint.
    pub async fn render_markdown(&self, text: &str) -> Result<String, CrawlError> {
        let url = format!("{}/markdown/raw", self.api_url);
        let req = self
            .creds
            .apply(self.client.post(&url))
            .header(CONTENT_TYPE, "text/plain")
            .body(text.to_string());
        Ok(send(req, &url).await?.text().await?)
    }

    /// Resolve a branch or tag to a commit SHA.
    ///
    /// The commits API is authoritative; when it fails with anything other
    /// than a 404 the commits page is scraped instead.
    pub async fn revision(&self, owner: &str, repo: &str, tag: &str) -> Result<String, CrawlError> {
        let url = format!("{}/repos/{}/{}/commits/{}", self.api_url, owner, repo, tag);
        match get_text(&self.client, &url, "application/vnd.github.sha", &self.creds).await {
            Ok(sha) => Ok(sha.trim().to_string()),
            Err(e @ CrawlError::NotFound(_)) => Err(e),
            Err(e) => {
                warn!(owner, repo, tag, error = %e, "commits API failed, scraping commits page");
                let page_url = format!("{}/{}/{}/commits/{}", self.web_url, owner, repo, tag);
                let page = get_text(&self.client, &page_url, "text/html", &Credentials::default()).await?;
                scrape_revision(&page)
                    .ok_or_else(|| CrawlError::other(format!("cannot find revision in {}", page_url)))
            }
        }
    }

    /// List `dir` (no leading slash, empty for the root) and download its
    /// documentable files.
    pub(crate) async fn list_dir(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        dir: &str,
        saved_etag: &str,
    ) -> Result<DirListing, CrawlError> {
        let sha = self.revision(owner, repo, tag).await?;
        if !saved_etag.is_empty() && sha == saved_etag {
            debug!(owner, repo, tag, "revision unchanged");
            return Err(CrawlError::NotModified);
        }

        let url = format!("{}/repos/{}/{}/git/trees/{}?recursive=1", self.api_url, owner, repo, sha);
        let tree: Tree = get_json(&self.client, &url, &self.creds).await?;
        let expected = format!("{}/repos/{}/{}/", self.api_url, owner, repo);
        if !tree.url.starts_with(&expected) {
            return Err(CrawlError::other(format!(
                "incorrect case in import path: {}/{}",
                owner, repo
            )));
        }

        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir.trim_end_matches('/'))
        };
        let blobs = tree
            .tree
            .iter()
            .filter(|e| e.kind == "blob")
            .map(|e| e.path.as_str());
        let (files, subdirs) = partition_tree(blobs, &prefix);
        if files.is_empty() && subdirs.is_empty() {
            return Err(CrawlError::NoGoFiles);
        }

        let sources: Vec<Source> = files
            .iter()
            .map(|name| {
                Source::new(
                    name.as_str(),
                    format!("{}/{}/{}/blob/{}/{}{}", self.web_url, owner, repo, tag, prefix, name),
                    format!("{}/{}/{}/{}/{}{}", self.raw_url, owner, repo, tag, prefix, name),
                )
            })
            .collect();
        let sources = fetch_files(&self.client, sources).await?;
        debug!(owner, repo, tag, dir, files = sources.len(), "listed directory");

        Ok(DirListing {
            sha,
            sources,
            subdirs,
        })
    }
}

/// Pull the commit SHA out of a GitHub commits page.
pub fn scrape_revision(page: &str) -> Option<String> {
    let start = page.find("commit-links-group BtnGroup")?;
    SCRAPED_SHA
        .captures(&page[start..])
        .map(|c| c[1].to_string())
}
