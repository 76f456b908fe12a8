//! Periodic artifact lifecycle passes.
//!
//! ```text
//!  None ──render──▶ Generated ──distribute──▶ Distributed
//!                      │                          │
//!                      └────────recycle───────────┴──▶ Recycled
//! ```
//!
//! - **distribute** uploads the chunks of every current `Generated`
//!   artifact, marks it `Distributed`, then deletes the local chunks.
//! - **recycle** retires artifacts of packages not viewed within the
//!   recycle window, and artifacts superseded by a newer etag. Local files
//!   or bucket objects are removed according to status.
//!
//! Each pass is single-flight: a pass that starts while the previous one
//! is still running is skipped. Status writes are conditional, so two
//! processes racing on the same rows cannot move a row backward.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use docwalker_core::models::ArtifactStatus;

use crate::artifacts::{self, ArtifactStore};
use crate::object_store::ObjectStore;

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    /// The pass did not run because another one was in flight.
    pub skipped: bool,
    pub processed: usize,
    pub failed: usize,
}

impl PassReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn try_enter(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Candidate {
    id: i64,
    etag: String,
    status: ArtifactStatus,
    num_extra_files: i64,
    import_path: String,
    current_etag: String,
}

pub struct Lifecycle {
    pool: SqlitePool,
    store: ArtifactStore,
    objects: Option<Arc<dyn ObjectStore>>,
    recycle_after: Duration,
    distributing: AtomicBool,
    recycling: AtomicBool,
}

impl Lifecycle {
    pub fn new(
        pool: SqlitePool,
        store: ArtifactStore,
        objects: Option<Arc<dyn ObjectStore>>,
        recycle_after: Duration,
    ) -> Self {
        Self {
            pool,
            store,
            objects,
            recycle_after,
            distributing: AtomicBool::new(false),
            recycling: AtomicBool::new(false),
        }
    }

    /// Upload current local artifacts to object storage.
    pub async fn distribute(&self) -> Result<PassReport> {
        let Some(_guard) = PassGuard::try_enter(&self.distributing) else {
            info!("distribute pass already running, skipping");
            return Ok(PassReport::skipped());
        };
        let Some(objects) = &self.objects else {
            info!("object storage disabled, nothing to distribute");
            return Ok(PassReport::default());
        };

        let rows = sqlx::query(
            r#"
            SELECT a.id, a.etag, a.status, a.num_extra_files, p.import_path, p.etag AS current_etag
            FROM artifacts a JOIN packages p ON p.id = a.pkg_id
            WHERE a.status = ? AND a.etag = p.etag
            ORDER BY a.id
            "#,
        )
        .bind(ArtifactStatus::Generated.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let mut report = PassReport::default();
        for c in rows.iter().map(to_candidate) {
            match self.distribute_one(objects.as_ref(), &c).await {
                Ok(true) => report.processed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(import_path = %c.import_path, error = %e, "distribute failed");
                    report.failed += 1;
                }
            }
        }
        info!(processed = report.processed, failed = report.failed, "distribute pass done");
        Ok(report)
    }

    async fn distribute_one(&self, objects: &dyn ObjectStore, c: &Candidate) -> Result<bool> {
        let locals = self.store.local_paths(&c.import_path, c.num_extra_files);
        let names = ArtifactStore::object_names(&c.import_path, &c.etag, c.num_extra_files);
        for (local, name) in locals.iter().zip(names.iter()) {
            objects.put_object(local, name).await?;
        }
        if !artifacts::set_status(&self.pool, c.id, ArtifactStatus::Distributed).await? {
            return Ok(false);
        }
        self.store.remove_chunks(&c.import_path, c.num_extra_files).await?;
        Ok(true)
    }

    /// Retire unviewed and superseded artifacts.
    pub async fn recycle(&self) -> Result<PassReport> {
        let Some(_guard) = PassGuard::try_enter(&self.recycling) else {
            info!("recycle pass already running, skipping");
            return Ok(PassReport::skipped());
        };

        let cutoff = chrono::Utc::now().timestamp() - self.recycle_after.as_secs() as i64;
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.etag, a.status, a.num_extra_files, p.import_path, p.etag AS current_etag
            FROM artifacts a JOIN packages p ON p.id = a.pkg_id
            WHERE a.status IN (?, ?) AND (p.last_viewed < ? OR a.etag != p.etag)
            ORDER BY a.id
            "#,
        )
        .bind(ArtifactStatus::Generated.as_i64())
        .bind(ArtifactStatus::Distributed.as_i64())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut report = PassReport::default();
        for c in rows.iter().map(to_candidate) {
            match self.recycle_one(&c).await {
                Ok(true) => report.processed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(import_path = %c.import_path, error = %e, "recycle failed");
                    report.failed += 1;
                }
            }
        }
        info!(processed = report.processed, failed = report.failed, "recycle pass done");
        Ok(report)
    }

    async fn recycle_one(&self, c: &Candidate) -> Result<bool> {
        match c.status {
            ArtifactStatus::Generated => {
                // Local files are shared across etags; only the current
                // generation owns them.
                if c.etag == c.current_etag {
                    self.store.remove_local(&c.import_path, c.num_extra_files).await?;
                }
            }
            ArtifactStatus::Distributed => {
                let Some(objects) = &self.objects else {
                    warn!(import_path = %c.import_path, "object storage disabled, leaving distributed artifact");
                    return Ok(false);
                };
                for name in ArtifactStore::object_names(&c.import_path, &c.etag, c.num_extra_files) {
                    objects.remove_object(&name).await?;
                }
            }
            ArtifactStatus::None | ArtifactStatus::Recycled => return Ok(false),
        }
        artifacts::set_status(&self.pool, c.id, ArtifactStatus::Recycled).await
    }

    /// Run both passes on their own intervals until the runtime stops.
    pub fn spawn_periodic(self: Arc<Self>, distribute_every: Duration, recycle_every: Duration) -> Vec<JoinHandle<()>> {
        let distributor = {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(distribute_every);
                loop {
                    tick.tick().await;
                    if let Err(e) = this.distribute().await {
                        warn!(error = %e, "distribute pass failed");
                    }
                }
            })
        };
        let recycler = tokio::spawn(async move {
            let mut tick = tokio::time::interval(recycle_every);
            loop {
                tick.tick().await;
                if let Err(e) = self.recycle().await {
                    warn!(error = %e, "recycle pass failed");
                }
            }
        });
        vec![distributor, recycler]
    }
}

fn to_candidate(row: &sqlx::sqlite::SqliteRow) -> Candidate {
    Candidate {
        id: row.get("id"),
        etag: row.get("etag"),
        status: ArtifactStatus::from_i64(row.get("status")),
        num_extra_files: row.get("num_extra_files"),
        import_path: row.get("import_path"),
        current_etag: row.get("current_etag"),
    }
}
