//! Catalog statistics.
//!
//! [`collect`] queries the database once; [`Stats`] keeps the latest
//! [`StatsSnapshot`] behind an `RwLock<Arc<_>>` so readers clone an `Arc`
//! and never wait on the database. One periodic task refreshes it.
//! `docwalker stats` prints a snapshot in the terminal.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

use docwalker_core::models::ArtifactStatus;

use crate::config::Config;
use crate::db;

/// Number of entries in the popular and recent lists.
const LIST_LEN: i64 = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PackageSummary {
    pub import_path: String,
    pub synopsis: String,
    pub views: i64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub total_packages: i64,
    pub total_artifacts: i64,
    pub generated: i64,
    pub distributed: i64,
    pub recycled: i64,
    pub pending_refs: i64,
    /// Most viewed packages.
    pub popular: Vec<PackageSummary>,
    /// Most recently viewed packages.
    pub recent: Vec<PackageSummary>,
    pub refreshed_at: i64,
}

pub async fn collect(pool: &SqlitePool) -> Result<StatsSnapshot> {
    let total_packages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM packages")
        .fetch_one(pool)
        .await?;
    let pending_refs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_refs")
        .fetch_one(pool)
        .await?;

    let mut snap = StatsSnapshot {
        total_packages,
        pending_refs,
        refreshed_at: chrono::Utc::now().timestamp(),
        ..Default::default()
    };

    let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM artifacts GROUP BY status")
        .fetch_all(pool)
        .await?;
    for row in &rows {
        let n: i64 = row.get("n");
        snap.total_artifacts += n;
        match ArtifactStatus::from_i64(row.get("status")) {
            ArtifactStatus::Generated => snap.generated = n,
            ArtifactStatus::Distributed => snap.distributed = n,
            ArtifactStatus::Recycled => snap.recycled = n,
            ArtifactStatus::None => {}
        }
    }

    snap.popular = summaries(pool, "views DESC, import_path").await?;
    snap.recent = summaries(pool, "last_viewed DESC, import_path").await?;
    Ok(snap)
}

async fn summaries(pool: &SqlitePool, order: &str) -> Result<Vec<PackageSummary>> {
    let rows = sqlx::query(&format!(
        "SELECT import_path, synopsis, views FROM packages ORDER BY {} LIMIT ?",
        order
    ))
    .bind(LIST_LEN)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| PackageSummary {
            import_path: row.get("import_path"),
            synopsis: row.get("synopsis"),
            views: row.get("views"),
        })
        .collect())
}

/// Shared, periodically refreshed snapshot.
pub struct Stats {
    pool: SqlitePool,
    current: RwLock<Arc<StatsSnapshot>>,
}

impl Stats {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            current: RwLock::new(Arc::new(StatsSnapshot::default())),
        }
    }

    pub fn get(&self) -> Arc<StatsSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub async fn refresh(&self) -> Result<Arc<StatsSnapshot>> {
        let snap = Arc::new(collect(&self.pool).await?);
        match self.current.write() {
            Ok(mut guard) => *guard = Arc::clone(&snap),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&snap),
        }
        Ok(snap)
    }

    pub fn spawn_periodic(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!(error = %e, "stats refresh failed");
                }
            }
        })
    }
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let snap = collect(&pool).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path).map(|m| m.len()).unwrap_or(0);

    println!("docwalker — Catalog Stats");
    println!("=========================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Packages:     {}", snap.total_packages);
    println!("  Pending refs: {}", snap.pending_refs);
    println!(
        "  Artifacts:    {} ({} generated, {} distributed, {} recycled)",
        snap.total_artifacts, snap.generated, snap.distributed, snap.recycled
    );

    if !snap.popular.is_empty() {
        println!();
        println!("  Most viewed:");
        println!("  {:<48} {:>8}", "PACKAGE", "VIEWS");
        println!("  {}", "-".repeat(57));
        for p in &snap.popular {
            println!("  {:<48} {:>8}", p.import_path, p.views);
        }
    }
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
