//! Wiring: builds the shared components from a [`Config`].

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use docwalker_core::extract::DeclExtractor;
use docwalker_core::gosrc::GoSourceExtractor;

use crate::artifacts::ArtifactStore;
use crate::check::Checker;
use crate::config::Config;
use crate::crawl::Crawler;
use crate::github::GitHubClient;
use crate::http::build_client;
use crate::lifecycle::Lifecycle;
use crate::object_store::{ObjectStore, S3ObjectStore};
use crate::render::{Render, TemplateRenderer};
use crate::resolver::Resolver;
use crate::stats::Stats;
use crate::vcs::GitFetcher;
use crate::{db, migrate};

/// Pluggable parts; `None` picks the default implementation.
#[derive(Default)]
pub struct Parts {
    pub extractor: Option<Arc<dyn DeclExtractor>>,
    pub renderer: Option<Arc<dyn Render>>,
    pub objects: Option<Arc<dyn ObjectStore>>,
}

pub struct App {
    pub config: Config,
    pub pool: SqlitePool,
    pub checker: Arc<Checker>,
    pub lifecycle: Arc<Lifecycle>,
    pub stats: Arc<Stats>,
}

impl App {
    pub async fn build(config: &Config) -> Result<Self> {
        Self::with_parts(config, Parts::default()).await
    }

    pub async fn with_parts(config: &Config, parts: Parts) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        // Requests outlive the crawl deadline so an abandoned crawl still
        // ends on its own.
        let client = build_client(
            config.fetch_timeout() * 2,
            config.server.upstream_proxy.as_deref(),
        )?;
        let extractor: Arc<dyn DeclExtractor> = match parts.extractor {
            Some(e) => e,
            None => Arc::new(GoSourceExtractor),
        };
        let renderer: Arc<dyn Render> = match parts.renderer {
            Some(r) => r,
            None => Arc::new(TemplateRenderer::new()?),
        };
        let objects: Option<Arc<dyn ObjectStore>> = match parts.objects {
            Some(o) => Some(o),
            None if config.storage.enabled => {
                Some(Arc::new(S3ObjectStore::from_config(client.clone(), &config.storage)?))
            }
            None => None,
        };

        let crawler = Crawler::new(
            Resolver::new(client.clone()),
            GitHubClient::new(client, &config.github),
            GitFetcher::new(&config.vcs),
            extractor,
        );
        let store = ArtifactStore::new(
            config.docs.js_path.clone(),
            config.storage.bucket_url.clone(),
            config.docs.readme,
        );
        let checker = Checker::new(
            pool.clone(),
            Arc::new(crawler),
            renderer,
            store.clone(),
            config.fetch_timeout(),
            config.refresh_interval(),
        );
        let lifecycle = Lifecycle::new(pool.clone(), store, objects, config.recycle_after());
        let stats = Stats::new(pool.clone());

        Ok(Self {
            config: config.clone(),
            pool,
            checker: Arc::new(checker),
            lifecycle: Arc::new(lifecycle),
            stats: Arc::new(stats),
        })
    }
}
