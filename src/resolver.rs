//! Backend resolver.
//!
//! Turns an import path into a [`FetchPlan`] without fetching any source.
//!
//! ```text
//! import path
//!   ├─ std root, no dot ─────────────────────────▶ FetchPlan::Std
//!   ├─ fails structural rules ───────────────────▶ InvalidRemotePath
//!   ├─ static backend prefix
//!   │    golang.org/x/  gopkg.in/  github.com/ ──▶ FetchPlan::GitHub
//!   │    (prefix matched, pattern failed) ───────▶ InvalidRemotePath
//!   └─ go-import discovery
//!        ├─ repo on a static backend ────────────▶ FetchPlan::GitHub
//!        └─ otherwise ───────────────────────────▶ FetchPlan::Vcs
//! ```
//!
//! Only discovery touches the network.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::{Captures, Regex};
use reqwest::Client;
use std::sync::LazyLock;
use tracing::{debug, trace};

use docwalker_core::path::{base_name, is_std_path, is_valid_remote_path};

use crate::error::CrawlError;

static GITHUB_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^github\.com/(?P<owner>[a-z0-9A-Z_.\-]+)/(?P<repo>[a-z0-9A-Z_.\-]+)(?P<dir>/[a-z0-9A-Z_.\-/]*)?$")
        .unwrap()
});

static GOLANG_X_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^golang\.org/x/(?P<repo>[a-z0-9A-Z_.\-]+)(?P<dir>/[a-z0-9A-Z_.\-/]*)?$").unwrap()
});

static GOPKG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^gopkg\.in/(?:(?P<owner>[a-zA-Z0-9][-a-zA-Z0-9]+)/)?(?P<repo>[a-zA-Z][-.a-zA-Z0-9]*)\.(?P<tag>(?:v0|v[1-9][0-9]*)(?:\.0|\.[1-9][0-9]*){0,2})(?:\.git)?(?P<dir>(?:/[a-zA-Z0-9][-.a-zA-Z0-9]*)*)$")
        .unwrap()
});

/// Parameters for a GitHub-hosted fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct GitHubMatch {
    /// Import path the documentation is published under.
    pub import_path: String,
    pub owner: String,
    pub repo: String,
    /// Directory inside the repository, `""` or `/a/b`.
    pub dir: String,
    /// Branch or tag; `None` means the repository's default branch.
    pub tag: Option<String>,
    pub is_subrepo: bool,
}

/// Parameters for a generic VCS fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct VcsMatch {
    pub import_path: String,
    /// Repository location without scheme or VCS suffix.
    pub repo: String,
    pub vcs: String,
    pub dir: String,
    /// Scheme announced by discovery, empty when unknown.
    pub scheme: String,
}

/// How to fetch one import path.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchPlan {
    GitHub(GitHubMatch),
    /// Standard library; the path relative to `src/`.
    Std { import_path: String },
    Vcs(VcsMatch),
}

// ============ Static backends ============

/// Statically known backends, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    GolangX,
    GopkgIn,
    GitHub,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::GolangX, Backend::GopkgIn, Backend::GitHub];

    pub fn prefix(self) -> &'static str {
        match self {
            Backend::GolangX => "golang.org/x/",
            Backend::GopkgIn => "gopkg.in/",
            Backend::GitHub => "github.com/",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Backend::GolangX => &GOLANG_X_PATTERN,
            Backend::GopkgIn => &GOPKG_PATTERN,
            Backend::GitHub => &GITHUB_PATTERN,
        }
    }

    /// Match an import path that already carries this backend's prefix.
    pub fn resolve(self, import_path: &str) -> Result<FetchPlan, CrawlError> {
        let Some(caps) = self.pattern().captures(import_path) else {
            trace!(import_path, backend = ?self, "prefix matched but pattern did not");
            return Err(CrawlError::InvalidRemotePath);
        };
        let m = match self {
            Backend::GolangX => GitHubMatch {
                import_path: import_path.to_string(),
                owner: "golang".to_string(),
                repo: group(&caps, "repo"),
                dir: group(&caps, "dir"),
                tag: None,
                is_subrepo: true,
            },
            Backend::GopkgIn => {
                let repo = group(&caps, "repo");
                let owner = match caps.name("owner") {
                    Some(o) => o.as_str().to_string(),
                    None => format!("go-{}", repo),
                };
                GitHubMatch {
                    import_path: import_path.to_string(),
                    owner,
                    repo,
                    dir: group(&caps, "dir"),
                    tag: Some(group(&caps, "tag")),
                    is_subrepo: false,
                }
            }
            Backend::GitHub => GitHubMatch {
                import_path: import_path.to_string(),
                owner: group(&caps, "owner"),
                repo: group(&caps, "repo"),
                dir: group(&caps, "dir").trim_end_matches('/').to_string(),
                tag: None,
                is_subrepo: false,
            },
        };
        Ok(FetchPlan::GitHub(m))
    }
}

fn group(caps: &Captures<'_>, name: &str) -> String {
    caps.name(name).map(|m| m.as_str().to_string()).unwrap_or_default()
}

/// Dispatch over the static backends with prefix early-exit.
pub fn resolve_static(import_path: &str) -> Result<FetchPlan, CrawlError> {
    for backend in Backend::ALL {
        if import_path.starts_with(backend.prefix()) {
            return backend.resolve(import_path);
        }
    }
    Err(CrawlError::NoServiceMatch)
}

// ============ go-import discovery ============

/// One accepted `<meta name="go-import">` tag.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaMatch {
    pub import_path: String,
    pub project_root: String,
    pub vcs: String,
    /// Repository URL without scheme.
    pub repo: String,
    pub scheme: String,
    /// Import path below the project root, `""` or `/a/b`.
    pub dir: String,
}

/// Scan the `<head>` of a discovery page for exactly one matching
/// `go-import` meta tag. Parsing is lenient; malformed markup ends the scan.
pub fn parse_meta(scheme: &str, import_path: &str, body: &str) -> Result<MetaMatch, CrawlError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().check_end_names = false;

    let mut found: Option<MetaMatch> = None;
    loop {
        let tag = match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => e,
            Ok(Event::End(e)) => {
                if e.local_name().as_ref().eq_ignore_ascii_case(b"head") {
                    break;
                }
                continue;
            }
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => continue,
        };
        let name = tag.local_name();
        if name.as_ref().eq_ignore_ascii_case(b"body") {
            break;
        }
        if !name.as_ref().eq_ignore_ascii_case(b"meta") || attr(&tag, "name") != "go-import" {
            continue;
        }
        let content = attr(&tag, "content");
        let fields: Vec<&str> = content.split_whitespace().collect();
        if fields.len() != 3 || !is_path_prefix(fields[0], import_path) {
            continue;
        }
        if found.is_some() {
            return Err(CrawlError::other(format!(
                "More than one <meta> found at {}://{}",
                scheme, import_path
            )));
        }

        let (root, vcs, url) = (fields[0], fields[1], fields[2]);
        let url = url.strip_suffix(&format!(".{}", vcs)).unwrap_or(url);
        let Some((proto, repo)) = url.split_once("://") else {
            return Err(CrawlError::other("Bad repo URL in <meta>"));
        };
        found = Some(MetaMatch {
            import_path: import_path.to_string(),
            project_root: root.to_string(),
            vcs: vcs.to_string(),
            repo: repo.to_string(),
            scheme: proto.to_string(),
            dir: import_path[root.len()..].to_string(),
        });
    }
    found.ok_or(CrawlError::MetaNotFound)
}

fn attr(tag: &BytesStart<'_>, name: &str) -> String {
    tag.html_attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref().eq_ignore_ascii_case(name.as_bytes()))
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
        .unwrap_or_default()
}

fn is_path_prefix(root: &str, import_path: &str) -> bool {
    import_path == root
        || (import_path.starts_with(root) && import_path.as_bytes().get(root.len()) == Some(&b'/'))
}

// ============ Resolver ============

pub struct Resolver {
    client: Client,
}

impl Resolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn resolve(&self, import_path: &str) -> Result<FetchPlan, CrawlError> {
        if is_std_path(import_path) {
            return Ok(FetchPlan::Std {
                import_path: import_path.to_string(),
            });
        }
        if !is_valid_remote_path(import_path) {
            return Err(CrawlError::InvalidRemotePath);
        }
        match resolve_static(import_path) {
            Err(CrawlError::NoServiceMatch) => self.resolve_dynamic(import_path).await,
            other => other,
        }
    }

    async fn resolve_dynamic(&self, import_path: &str) -> Result<FetchPlan, CrawlError> {
        let mut meta = self.fetch_meta(import_path).await?;
        if meta.project_root != import_path {
            let root_meta = self.fetch_meta(&meta.project_root).await?;
            if root_meta.project_root != meta.project_root {
                return Err(CrawlError::other("Project root mismatch"));
            }
        }
        Ok(plan_for_meta(&mut meta))
    }

    async fn fetch_meta(&self, import_path: &str) -> Result<MetaMatch, CrawlError> {
        let mut uri = import_path.to_string();
        if !uri.contains('/') {
            uri.push('/');
        }
        uri.push_str("?go-get=1");

        let https = format!("https://{}", uri);
        debug!(url = %https, "discovering import path");
        let (scheme, body) = match self.client.get(&https).send().await {
            Ok(resp) if resp.status().is_success() => ("https", resp.text().await?),
            _ => {
                let http = format!("http://{}", uri);
                debug!(url = %http, "retrying discovery over http");
                let resp = self.client.get(&http).send().await?;
                ("http", resp.text().await?)
            }
        };
        parse_meta(scheme, import_path, &body)
    }
}

/// Map a discovery result onto a fetch plan. Repos on a static backend
/// are re-dispatched there with the import path preserved.
pub fn plan_for_meta(meta: &mut MetaMatch) -> FetchPlan {
    let mut is_subrepo = false;
    if meta.repo.starts_with("go.googlesource.com") {
        is_subrepo = true;
        meta.dir = format!("/{}{}", base_name(&meta.repo), meta.dir);
        meta.repo = "github.com/golang".to_string();
    }

    match resolve_static(&format!("{}{}", meta.repo, meta.dir)) {
        Ok(FetchPlan::GitHub(mut m)) => {
            m.import_path = meta.import_path.clone();
            m.is_subrepo = m.is_subrepo || is_subrepo;
            FetchPlan::GitHub(m)
        }
        _ => FetchPlan::Vcs(VcsMatch {
            import_path: meta.import_path.clone(),
            repo: meta.repo.clone(),
            vcs: meta.vcs.clone(),
            dir: meta.dir.clone(),
            scheme: meta.scheme.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github(plan: FetchPlan) -> GitHubMatch {
        match plan {
            FetchPlan::GitHub(m) => m,
            other => panic!("expected github plan, got {:?}", other),
        }
    }

    #[test]
    fn test_github_pattern() {
        let m = github(resolve_static("github.com/unknwon/com/sub/pkg").unwrap());
        assert_eq!(m.owner, "unknwon");
        assert_eq!(m.repo, "com");
        assert_eq!(m.dir, "/sub/pkg");
        assert_eq!(m.tag, None);

        let root = github(resolve_static("github.com/unknwon/com").unwrap());
        assert_eq!(root.dir, "");
    }

    #[test]
    fn test_prefix_early_exit() {
        assert!(matches!(
            resolve_static("github.com/onlyowner"),
            Err(CrawlError::InvalidRemotePath)
        ));
        assert!(matches!(
            resolve_static("example.org/a/b"),
            Err(CrawlError::NoServiceMatch)
        ));
    }

    #[test]
    fn test_golang_x_rewrite() {
        let m = github(resolve_static("golang.org/x/net/html").unwrap());
        assert_eq!((m.owner.as_str(), m.repo.as_str(), m.dir.as_str()), ("golang", "net", "/html"));
        assert!(m.is_subrepo);
        assert_eq!(m.import_path, "golang.org/x/net/html");
    }

    #[test]
    fn test_gopkg_rewrite() {
        let m = github(resolve_static("gopkg.in/yaml.v2").unwrap());
        assert_eq!(m.owner, "go-yaml");
        assert_eq!(m.repo, "yaml");
        assert_eq!(m.tag.as_deref(), Some("v2"));

        let m = github(resolve_static("gopkg.in/unknwon/com.v1/sub").unwrap());
        assert_eq!(m.owner, "unknwon");
        assert_eq!(m.dir, "/sub");
    }

    #[tokio::test]
    async fn test_invalid_paths_resolve_without_network() {
        // An unroutable client proves no request is attempted.
        let client = Client::builder()
            .proxy(reqwest::Proxy::all("http://127.0.0.1:9").unwrap())
            .build()
            .unwrap();
        let resolver = Resolver::new(client);
        for path in ["foo", "example.invalidtld/x", "example.com", "github.com/u", "example.com/a/testdata"] {
            assert!(
                matches!(resolver.resolve(path).await, Err(CrawlError::InvalidRemotePath)),
                "{}",
                path
            );
        }
        assert_eq!(
            resolver.resolve("net/http").await.unwrap(),
            FetchPlan::Std {
                import_path: "net/http".to_string()
            }
        );
    }

    const META_PAGE: &str = r#"<!DOCTYPE html>
<html><head>
<meta charset="utf-8">
<meta name="go-import" content="example.org/pkg git https://code.example.org/pkg.git">
<meta name="go-source" content="example.org/pkg _ _ _">
</head><body><meta name="go-import" content="example.org/pkg git https://other/x"></body></html>"#;

    #[test]
    fn test_parse_meta_single() {
        let m = parse_meta("https", "example.org/pkg/sub", META_PAGE).unwrap();
        assert_eq!(m.project_root, "example.org/pkg");
        assert_eq!(m.vcs, "git");
        assert_eq!(m.repo, "code.example.org/pkg");
        assert_eq!(m.scheme, "https");
        assert_eq!(m.dir, "/sub");
    }

    #[test]
    fn test_parse_meta_not_found() {
        let page = "<html><head><title>x</title></head><body></body></html>";
        let err = parse_meta("https", "example.org/pkg", page).unwrap_err();
        assert!(matches!(err, CrawlError::MetaNotFound));
        assert_eq!(err.to_string(), "<meta> not found");
    }

    #[test]
    fn test_parse_meta_prefix_must_be_whole_segment() {
        let page = r#"<head><meta name="go-import" content="example.org/pk git https://x/pk"></head>"#;
        assert!(matches!(
            parse_meta("https", "example.org/pkg", page),
            Err(CrawlError::MetaNotFound)
        ));
    }

    #[test]
    fn test_parse_meta_more_than_one() {
        let page = r#"<head>
<meta name="go-import" content="example.org/pkg git https://a/pkg">
<meta name="go-import" content="example.org/pkg git https://b/pkg">
</head>"#;
        let err = parse_meta("https", "example.org/pkg", page).unwrap_err();
        assert!(err.to_string().starts_with("More than one <meta> found"));
    }

    #[test]
    fn test_parse_meta_bad_repo_url() {
        let page = r#"<head><meta name="go-import" content="example.org/pkg git code.example.org/pkg"></head>"#;
        let err = parse_meta("https", "example.org/pkg", page).unwrap_err();
        assert_eq!(err.to_string(), "Bad repo URL in <meta>");
    }

    #[test]
    fn test_discovered_github_repo_is_redispatched() {
        let page = r#"<head><meta name="go-import" content="rsc.io/quote git https://github.com/rsc/quote"></head>"#;
        let mut meta = parse_meta("https", "rsc.io/quote/v3", page).unwrap();
        let m = github(plan_for_meta(&mut meta));
        assert_eq!(m.import_path, "rsc.io/quote/v3");
        assert_eq!((m.owner.as_str(), m.repo.as_str(), m.dir.as_str()), ("rsc", "quote", "/v3"));
    }

    #[test]
    fn test_googlesource_maps_to_golang_mirror() {
        let page = r#"<head><meta name="go-import" content="golang.org/x/tools git https://go.googlesource.com/tools"></head>"#;
        let mut meta = parse_meta("https", "golang.org/x/tools/cmd", page).unwrap();
        let m = github(plan_for_meta(&mut meta));
        assert_eq!((m.owner.as_str(), m.repo.as_str(), m.dir.as_str()), ("golang", "tools", "/cmd"));
        assert!(m.is_subrepo);
        assert_eq!(m.import_path, "golang.org/x/tools/cmd");
    }

    #[test]
    fn test_unknown_host_becomes_vcs_plan() {
        let page = r#"<head><meta name="go-import" content="example.org/pkg git https://code.example.org/pkg.git"></head>"#;
        let mut meta = parse_meta("https", "example.org/pkg", page).unwrap();
        match plan_for_meta(&mut meta) {
            FetchPlan::Vcs(v) => {
                assert_eq!(v.repo, "code.example.org/pkg");
                assert_eq!(v.scheme, "https");
                assert_eq!(v.dir, "");
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }
}
