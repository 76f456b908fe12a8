//! Request check: staleness decision, timed crawl, persistence.
//!
//! This is the only layer that turns crawl outcomes into database and
//! filesystem mutations.
//!
//! | Situation | Decision |
//! |-----------|----------|
//! | no record | fetch with empty etag |
//! | record outdated, artifact missing or recycled | fetch with etag cleared |
//! | ordinary view, servable artifact | serve, count the view |
//! | refresh, interval elapsed | fetch with saved etag |
//! | refresh, interval not elapsed | report remaining wait |
//!
//! | Crawl outcome | Effect |
//! |---------------|--------|
//! | package | render, write chunks, save record and artifact |
//! | not modified | set `created` only |
//! | timeout | `FetchTimeout` for known paths, `NotFound` otherwise |
//! | gone | delete record and local files, then propagate |
//! | anything else | propagate |
//!
//! A crawl runs on its own task raced against the fetch timeout. When the
//! timeout wins the task is left to finish on its own and its result is
//! dropped; nothing it produced is persisted.

use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use docwalker_core::models::{ArtifactRecord, ArtifactStatus, Package, PackageRecord, PACKAGE_VERSION};
use docwalker_core::path::is_vendor_path;

use crate::artifacts::{self, ArtifactStore};
use crate::crawl::Crawler;
use crate::error::CrawlError;
use crate::packages;
use crate::render::{page_data, Render, DOCS_TEMPLATE};
use crate::stdlib::strip_view_prefix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    View,
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Staleness {
    Fresh {
        record: PackageRecord,
        artifact: ArtifactRecord,
    },
    NeedsFetch {
        existing: Option<PackageRecord>,
        etag: String,
    },
    RefreshTooSoon {
        record: PackageRecord,
        remaining: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckOutcome {
    Ready {
        record: PackageRecord,
        artifact: ArtifactRecord,
        /// True when this request rendered a new artifact.
        generated: bool,
    },
    RefreshTooSoon {
        record: PackageRecord,
        remaining_secs: u64,
    },
}

pub struct Checker {
    pool: SqlitePool,
    crawler: Arc<Crawler>,
    renderer: Arc<dyn Render>,
    store: ArtifactStore,
    fetch_timeout: Duration,
    refresh_interval: Duration,
}

impl Checker {
    pub fn new(
        pool: SqlitePool,
        crawler: Arc<Crawler>,
        renderer: Arc<dyn Render>,
        store: ArtifactStore,
        fetch_timeout: Duration,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            pool,
            crawler,
            renderer,
            store,
            fetch_timeout,
            refresh_interval,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Serve, refresh or build the documentation of `import_path`.
    pub async fn check(&self, import_path: &str, kind: RequestKind) -> Result<CheckOutcome, CrawlError> {
        if is_vendor_path(import_path) {
            return Err(CrawlError::Vendor);
        }
        let import_path = strip_view_prefix(import_path.trim_matches('/'));
        let now = chrono::Utc::now().timestamp();

        match self.staleness(import_path, kind, now).await? {
            Staleness::Fresh { mut record, artifact } => {
                packages::touch_view(&self.pool, record.id, now).await?;
                record.views += 1;
                record.last_viewed = now;
                Ok(CheckOutcome::Ready {
                    record,
                    artifact,
                    generated: false,
                })
            }
            Staleness::RefreshTooSoon { record, remaining } => Ok(CheckOutcome::RefreshTooSoon {
                record,
                remaining_secs: remaining.as_secs().max(1),
            }),
            Staleness::NeedsFetch { existing, etag } => self.fetch(import_path, existing, &etag).await,
        }
    }

    pub async fn staleness(&self, import_path: &str, kind: RequestKind, now: i64) -> Result<Staleness, CrawlError> {
        let Some(record) = packages::get_by_path(&self.pool, import_path).await? else {
            return Ok(Staleness::NeedsFetch {
                existing: None,
                etag: String::new(),
            });
        };

        let artifact = artifacts::get(&self.pool, record.id, &record.etag).await?;
        let servable = record.pkg_ver >= PACKAGE_VERSION
            && artifact.as_ref().is_some_and(|a| match a.status {
                ArtifactStatus::Distributed => true,
                ArtifactStatus::Generated => self.store.has_first_chunk(import_path),
                ArtifactStatus::None | ArtifactStatus::Recycled => false,
            });
        let artifact = match artifact {
            Some(a) if servable => a,
            _ => {
                return Ok(Staleness::NeedsFetch {
                    existing: Some(record),
                    etag: String::new(),
                })
            }
        };

        if kind == RequestKind::View {
            return Ok(Staleness::Fresh { record, artifact });
        }

        let elapsed = Duration::from_secs(now.saturating_sub(record.created).max(0) as u64);
        if elapsed >= self.refresh_interval {
            let etag = record.etag.clone();
            Ok(Staleness::NeedsFetch {
                existing: Some(record),
                etag,
            })
        } else {
            Ok(Staleness::RefreshTooSoon {
                record,
                remaining: self.refresh_interval - elapsed,
            })
        }
    }

    async fn fetch(
        &self,
        import_path: &str,
        existing: Option<PackageRecord>,
        etag: &str,
    ) -> Result<CheckOutcome, CrawlError> {
        let crawler = Arc::clone(&self.crawler);
        let path = import_path.to_string();
        let saved = etag.to_string();
        let task = tokio::spawn(async move { crawler.crawl(&path, &saved).await });

        let result = match tokio::time::timeout(self.fetch_timeout, task).await {
            Err(_) => {
                warn!(import_path, timeout = ?self.fetch_timeout, "crawl timed out, abandoning");
                return Err(match existing {
                    Some(_) => CrawlError::FetchTimeout,
                    None => CrawlError::NotFound(import_path.to_string()),
                });
            }
            Ok(Err(join)) => return Err(CrawlError::other(format!("crawl task failed: {}", join))),
            Ok(Ok(result)) => result,
        };

        match result {
            Ok(pkg) => self.persist(pkg, existing).await,
            Err(CrawlError::NotModified) => self.not_modified(existing).await,
            Err(e) if e.is_gone() => {
                info!(import_path, error = %e, "package gone upstream");
                self.forget(import_path).await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn persist(&self, pkg: Package, existing: Option<PackageRecord>) -> Result<CheckOutcome, CrawlError> {
        let now = chrono::Utc::now().timestamp();
        let html = self.renderer.render(DOCS_TEMPLATE, &page_data(&pkg))?;
        let num_extra = self
            .store
            .write_doc(pkg.import_path(), &String::from_utf8_lossy(&html))
            .await?;
        self.store.write_readmes(&pkg).await?;

        let mut record = pkg.record;
        match &existing {
            Some(old) => {
                record.id = old.id;
                record.ref_ids = old.ref_ids.clone();
                record.views = old.views + 1;
            }
            None => record.views = 1,
        }
        record.created = now;
        record.last_viewed = now;

        let mut tx = self.pool.begin().await?;
        packages::save(&mut tx, &mut record, true).await?;
        let artifact = artifacts::save(&mut tx, record.id, &record.etag, num_extra).await?;
        artifacts::supersede(&mut tx, record.id, &record.etag).await?;
        tx.commit().await?;

        info!(import_path = %record.import_path, etag = %record.etag, num_extra, "generated");
        Ok(CheckOutcome::Ready {
            record,
            artifact,
            generated: true,
        })
    }

    async fn not_modified(&self, existing: Option<PackageRecord>) -> Result<CheckOutcome, CrawlError> {
        let Some(mut record) = existing else {
            return Err(CrawlError::NotModified);
        };
        let now = chrono::Utc::now().timestamp();
        packages::touch_created(&self.pool, record.id, now).await?;
        record.created = now;

        let artifact = artifacts::get(&self.pool, record.id, &record.etag)
            .await?
            .ok_or_else(|| CrawlError::other(format!("no artifact for {}", record.import_path)))?;
        Ok(CheckOutcome::Ready {
            record,
            artifact,
            generated: false,
        })
    }

    /// Drop the record of a package that no longer exists upstream.
    async fn forget(&self, import_path: &str) -> Result<(), CrawlError> {
        let Some(record) = packages::get_by_path(&self.pool, import_path).await? else {
            return Ok(());
        };
        let num_extra = artifacts::get(&self.pool, record.id, &record.etag)
            .await?
            .map(|a| a.num_extra_files)
            .unwrap_or(0);
        self.store.remove_local(import_path, num_extra).await?;
        packages::delete_by_path(&self.pool, import_path).await?;
        Ok(())
    }
}
