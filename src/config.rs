//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/docwalker.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! fetch_timeout_secs = 60
//! refresh_interval_secs = 300
//! # upstream_proxy = "http://proxy.internal:3128"
//!
//! [docs]
//! js_path = "./data/docs"
//!
//! [github]
//! client_id = "..."
//! client_secret = "..."
//!
//! [storage]
//! enabled = true
//! endpoint_url = "https://nyc3.digitaloceanspaces.com"
//! bucket = "docwalker"
//! bucket_url = "https://docwalker.nyc3.cdn.digitaloceanspaces.com/"
//!
//! [maintenance]
//! recycle_after_days = 10
//! ```
//!
//! Every section except `[db]` is optional.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub vcs: VcsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Proxy for every upstream request (discovery, APIs, raw files).
    #[serde(default)]
    pub upstream_proxy: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            upstream_proxy: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}
fn default_fetch_timeout_secs() -> u64 {
    60
}
fn default_refresh_interval_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    /// Directory holding generated documentation chunks.
    #[serde(default = "default_js_path")]
    pub js_path: PathBuf,
    /// Write readme files next to the documentation.
    #[serde(default = "default_true")]
    pub readme: bool,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            js_path: default_js_path(),
            readme: true,
        }
    }
}

fn default_js_path() -> PathBuf {
    PathBuf::from("./data/docs")
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_raw_url")]
    pub raw_url: String,
    #[serde(default = "default_web_url")]
    pub web_url: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_url: default_api_url(),
            raw_url: default_raw_url(),
            web_url: default_web_url(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_raw_url() -> String {
    "https://raw.github.com".to_string()
}
fn default_web_url() -> String {
    "https://github.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct VcsConfig {
    /// Local clones of generic git repositories.
    #[serde(default = "default_vcs_cache_dir")]
    pub cache_dir: PathBuf,
    /// URL schemes tried in order for `git ls-remote`.
    #[serde(default = "default_schemes")]
    pub schemes: Vec<String>,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_vcs_cache_dir(),
            schemes: default_schemes(),
        }
    }
}

fn default_vcs_cache_dir() -> PathBuf {
    PathBuf::from("./data/vcs")
}
fn default_schemes() -> Vec<String> {
    vec!["https".to_string(), "http".to_string(), "git".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Custom S3-compatible endpoint (Spaces, MinIO). Path-style requests
    /// are used when set.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    /// Public URL prefix of the bucket, ending in `/`.
    #[serde(default)]
    pub bucket_url: String,
    /// Falls back to `AWS_ACCESS_KEY_ID`.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Falls back to `AWS_SECRET_ACCESS_KEY`.
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint_url: None,
            region: default_region(),
            bucket: String::new(),
            bucket_url: String::new(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceConfig {
    #[serde(default = "default_recycle_after_days")]
    pub recycle_after_days: u64,
    #[serde(default = "default_distribute_every_secs")]
    pub distribute_every_secs: u64,
    #[serde(default = "default_recycle_every_secs")]
    pub recycle_every_secs: u64,
    #[serde(default = "default_stats_every_secs")]
    pub stats_every_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            recycle_after_days: default_recycle_after_days(),
            distribute_every_secs: default_distribute_every_secs(),
            recycle_every_secs: default_recycle_every_secs(),
            stats_every_secs: default_stats_every_secs(),
        }
    }
}

fn default_recycle_after_days() -> u64 {
    10
}
fn default_distribute_every_secs() -> u64 {
    60
}
fn default_recycle_every_secs() -> u64 {
    300
}
fn default_stats_every_secs() -> u64 {
    60
}

impl Config {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.server.fetch_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.server.refresh_interval_secs)
    }

    pub fn recycle_after(&self) -> Duration {
        Duration::from_secs(self.maintenance.recycle_after_days * 86_400)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.server.fetch_timeout_secs == 0 {
        bail!("server.fetch_timeout_secs must be > 0");
    }
    if config.server.refresh_interval_secs == 0 {
        bail!("server.refresh_interval_secs must be > 0");
    }

    // A recycled artifact forces a rebuild, so the window must outlast refreshes.
    if config.recycle_after() <= config.refresh_interval() {
        bail!(
            "maintenance.recycle_after_days ({} days) must exceed server.refresh_interval_secs ({}s)",
            config.maintenance.recycle_after_days,
            config.server.refresh_interval_secs
        );
    }

    if config.maintenance.distribute_every_secs == 0
        || config.maintenance.recycle_every_secs == 0
        || config.maintenance.stats_every_secs == 0
    {
        bail!("maintenance intervals must be > 0");
    }

    if config.vcs.schemes.is_empty() {
        bail!("vcs.schemes must not be empty");
    }
    for scheme in &config.vcs.schemes {
        match scheme.as_str() {
            "http" | "https" | "git" => {}
            other => bail!("Unknown vcs scheme: '{}'. Must be http, https, or git.", other),
        }
    }

    if config.github.client_id.is_some() != config.github.client_secret.is_some() {
        bail!("github.client_id and github.client_secret must be set together");
    }

    if config.storage.enabled {
        if config.storage.bucket.is_empty() {
            bail!("storage.bucket must be specified when storage is enabled");
        }
        if config.storage.bucket_url.is_empty() {
            bail!("storage.bucket_url must be specified when storage is enabled");
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "[db]\npath = \"/tmp/dw.sqlite\"\n";

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.fetch_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(300));
        assert_eq!(cfg.github.api_url, "https://api.github.com");
        assert_eq!(cfg.vcs.schemes, vec!["https", "http", "git"]);
        assert!(!cfg.storage.enabled);
        assert!(cfg.docs.readme);
    }

    #[test]
    fn test_recycle_window_must_exceed_refresh_interval() {
        let text = format!(
            "{}[server]\nrefresh_interval_secs = 864000\n[maintenance]\nrecycle_after_days = 1\n",
            MINIMAL
        );
        let err = parse_config(&text).unwrap_err();
        assert!(err.to_string().contains("recycle_after_days"));
    }

    #[test]
    fn test_storage_requires_bucket() {
        let text = format!("{}[storage]\nenabled = true\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let text = format!("{}[vcs]\nschemes = [\"ftp\"]\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_github_credentials_pairwise() {
        let text = format!("{}[github]\nclient_id = \"a\"\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }
}
