use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // List columns hold JSON arrays; see docwalker_core::legacy.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_path TEXT NOT NULL UNIQUE,
            project_path TEXT NOT NULL DEFAULT '',
            view_dir_path TEXT NOT NULL DEFAULT '',
            synopsis TEXT NOT NULL DEFAULT '',
            etag TEXT NOT NULL DEFAULT '',
            is_cmd INTEGER NOT NULL DEFAULT 0,
            is_std INTEGER NOT NULL DEFAULT 0,
            is_subrepo INTEGER NOT NULL DEFAULT 0,
            is_cgo INTEGER NOT NULL DEFAULT 0,
            pkg_ver INTEGER NOT NULL DEFAULT 0,
            priority INTEGER NOT NULL DEFAULT 0,
            views INTEGER NOT NULL DEFAULT 0,
            stars INTEGER NOT NULL DEFAULT 0,
            created INTEGER NOT NULL DEFAULT 0,
            last_viewed INTEGER NOT NULL DEFAULT 0,
            import_paths TEXT NOT NULL DEFAULT '[]',
            import_ids TEXT NOT NULL DEFAULT '[]',
            ref_ids TEXT NOT NULL DEFAULT '[]',
            subdirs TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pkg_id INTEGER NOT NULL,
            etag TEXT NOT NULL,
            status INTEGER NOT NULL DEFAULT 0,
            num_extra_files INTEGER NOT NULL DEFAULT 0,
            UNIQUE(pkg_id, etag)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pending_refs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_path TEXT NOT NULL UNIQUE,
            ref_ids TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifacts_status ON artifacts(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifacts_pkg_id ON artifacts(pkg_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_packages_last_viewed ON packages(last_viewed)")
        .execute(pool)
        .await?;

    Ok(())
}
