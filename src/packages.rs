//! Package record persistence.
//!
//! Records are keyed by import path. List columns hold JSON arrays and
//! are read through [`docwalker_core::legacy`], which also accepts the
//! older delimited encoding.
//!
//! # Cross-references
//!
//! Saving with `update_refs` links the package to what it imports:
//!
//! - an imported package that already has a record gets our id in its
//!   `ref_ids`, and its id lands in our `import_ids`;
//! - an imported path without a record gets our id parked in
//!   `pending_refs`, merged into the record when it is first saved;
//! - our own `ref_ids` are pruned to referrers that still import us.
//!
//! Standard-library paths, `C` and invalid paths are never linked.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use docwalker_core::comment::truncate_bytes;
use docwalker_core::legacy::{decode_ids, decode_strings, encode_list};
use docwalker_core::models::{PackageRecord, MAX_SYNOPSIS_LEN, PACKAGE_VERSION};
use docwalker_core::path::{is_std_path, is_valid_remote_path};

use crate::artifacts;

const COLUMNS: &str = "id, import_path, project_path, view_dir_path, synopsis, etag, \
    is_cmd, is_std, is_subrepo, is_cgo, pkg_ver, priority, views, stars, created, last_viewed, \
    import_paths, import_ids, ref_ids, subdirs";

fn row_to_record(row: &SqliteRow) -> PackageRecord {
    let import_paths: String = row.get("import_paths");
    let import_ids: String = row.get("import_ids");
    let ref_ids: String = row.get("ref_ids");
    let subdirs: String = row.get("subdirs");
    PackageRecord {
        id: row.get("id"),
        import_path: row.get("import_path"),
        project_path: row.get("project_path"),
        view_dir_path: row.get("view_dir_path"),
        synopsis: row.get("synopsis"),
        etag: row.get("etag"),
        is_cmd: row.get("is_cmd"),
        is_std: row.get("is_std"),
        is_subrepo: row.get("is_subrepo"),
        is_cgo: row.get("is_cgo"),
        pkg_ver: row.get("pkg_ver"),
        priority: row.get("priority"),
        views: row.get("views"),
        stars: row.get("stars"),
        created: row.get("created"),
        last_viewed: row.get("last_viewed"),
        import_paths: decode_strings(&import_paths),
        import_ids: decode_ids(&import_ids),
        ref_ids: decode_ids(&ref_ids),
        subdirs: decode_strings(&subdirs),
    }
}

pub async fn get_by_path(pool: &SqlitePool, import_path: &str) -> Result<Option<PackageRecord>> {
    let mut conn = pool.acquire().await?;
    find_by_path(&mut conn, import_path).await
}

pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<PackageRecord>> {
    let mut conn = pool.acquire().await?;
    find_by_id(&mut conn, id).await
}

async fn find_by_path(conn: &mut SqliteConnection, import_path: &str) -> Result<Option<PackageRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM packages WHERE import_path = ?", COLUMNS))
        .bind(import_path)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(row_to_record))
}

async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<PackageRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM packages WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(row_to_record))
}

/// Count one view.
pub async fn touch_view(pool: &SqlitePool, id: i64, now: i64) -> Result<()> {
    sqlx::query("UPDATE packages SET views = views + 1, last_viewed = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Restart the refresh interval without touching anything else.
pub async fn touch_created(pool: &SqlitePool, id: i64, now: i64) -> Result<()> {
    sqlx::query("UPDATE packages SET created = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a package and its artifact rows. Returns the deleted record.
pub async fn delete_by_path(pool: &SqlitePool, import_path: &str) -> Result<Option<PackageRecord>> {
    let mut tx = pool.begin().await?;
    let Some(rec) = find_by_path(&mut tx, import_path).await? else {
        return Ok(None);
    };
    artifacts::delete_for_package(&mut tx, rec.id).await?;
    sqlx::query("DELETE FROM packages WHERE id = ?")
        .bind(rec.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    debug!(import_path, "deleted package record");
    Ok(Some(rec))
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM packages").fetch_one(pool).await?;
    Ok(row.get("n"))
}

/// Insert or update a record. On return `rec.id` is set.
///
/// Run inside a transaction; the ref bookkeeping touches other rows.
pub async fn save(conn: &mut SqliteConnection, rec: &mut PackageRecord, update_refs: bool) -> Result<()> {
    rec.synopsis = truncate_bytes(&rec.synopsis, MAX_SYNOPSIS_LEN).to_string();
    rec.pkg_ver = PACKAGE_VERSION;
    rec.priority = rec.static_priority();

    match find_by_path(&mut *conn, &rec.import_path).await? {
        Some(existing) => {
            rec.id = existing.id;
            write(&mut *conn, rec).await?;
        }
        None => {
            rec.views = rec.views.max(1);
            for id in take_pending(&mut *conn, &rec.import_path).await? {
                rec.add_ref(id);
            }
            insert(&mut *conn, rec).await?;
        }
    }

    if update_refs {
        link_imports(&mut *conn, rec).await?;
        prune_refs(&mut *conn, rec).await?;
        write(&mut *conn, rec).await?;
    }
    Ok(())
}

async fn insert(conn: &mut SqliteConnection, rec: &mut PackageRecord) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO packages (import_path, project_path, view_dir_path, synopsis, etag,
            is_cmd, is_std, is_subrepo, is_cgo, pkg_ver, priority, views, stars, created, last_viewed,
            import_paths, import_ids, ref_ids, subdirs)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&rec.import_path)
    .bind(&rec.project_path)
    .bind(&rec.view_dir_path)
    .bind(&rec.synopsis)
    .bind(&rec.etag)
    .bind(rec.is_cmd)
    .bind(rec.is_std)
    .bind(rec.is_subrepo)
    .bind(rec.is_cgo)
    .bind(rec.pkg_ver)
    .bind(rec.priority)
    .bind(rec.views)
    .bind(rec.stars)
    .bind(rec.created)
    .bind(rec.last_viewed)
    .bind(encode_list(&rec.import_paths))
    .bind(encode_list(&rec.import_ids))
    .bind(encode_list(&rec.ref_ids))
    .bind(encode_list(&rec.subdirs))
    .execute(&mut *conn)
    .await?;
    rec.id = result.last_insert_rowid();
    Ok(())
}

async fn write(conn: &mut SqliteConnection, rec: &PackageRecord) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE packages SET project_path = ?, view_dir_path = ?, synopsis = ?, etag = ?,
            is_cmd = ?, is_std = ?, is_subrepo = ?, is_cgo = ?, pkg_ver = ?, priority = ?,
            views = ?, stars = ?, created = ?, last_viewed = ?,
            import_paths = ?, import_ids = ?, ref_ids = ?, subdirs = ?
        WHERE id = ?
        "#,
    )
    .bind(&rec.project_path)
    .bind(&rec.view_dir_path)
    .bind(&rec.synopsis)
    .bind(&rec.etag)
    .bind(rec.is_cmd)
    .bind(rec.is_std)
    .bind(rec.is_subrepo)
    .bind(rec.is_cgo)
    .bind(rec.pkg_ver)
    .bind(rec.priority)
    .bind(rec.views)
    .bind(rec.stars)
    .bind(rec.created)
    .bind(rec.last_viewed)
    .bind(encode_list(&rec.import_paths))
    .bind(encode_list(&rec.import_ids))
    .bind(encode_list(&rec.ref_ids))
    .bind(encode_list(&rec.subdirs))
    .bind(rec.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn set_ref_ids(conn: &mut SqliteConnection, id: i64, ref_ids: &[i64]) -> Result<()> {
    sqlx::query("UPDATE packages SET ref_ids = ? WHERE id = ?")
        .bind(encode_list(ref_ids))
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn is_linkable(import_path: &str) -> bool {
    import_path != "C" && !is_std_path(import_path) && is_valid_remote_path(import_path)
}

async fn link_imports(conn: &mut SqliteConnection, rec: &mut PackageRecord) -> Result<()> {
    let mut import_ids = Vec::new();
    for path in rec.import_paths.iter().filter(|p| is_linkable(p)) {
        match find_by_path(&mut *conn, path).await? {
            Some(mut imported) => {
                if imported.add_ref(rec.id) {
                    set_ref_ids(&mut *conn, imported.id, &imported.ref_ids).await?;
                }
                import_ids.push(imported.id);
            }
            None => add_pending(&mut *conn, path, rec.id).await?,
        }
    }
    rec.import_ids = import_ids;
    Ok(())
}

/// Keep only referrers that still import this package.
async fn prune_refs(conn: &mut SqliteConnection, rec: &mut PackageRecord) -> Result<()> {
    let mut kept = Vec::new();
    for id in rec.ref_ids.clone() {
        let Some(mut referrer) = find_by_id(&mut *conn, id).await? else {
            continue;
        };
        if !referrer.import_paths.contains(&rec.import_path) {
            continue;
        }
        if !referrer.import_ids.contains(&rec.id) {
            referrer.import_ids.push(rec.id);
            sqlx::query("UPDATE packages SET import_ids = ? WHERE id = ?")
                .bind(encode_list(&referrer.import_ids))
                .bind(referrer.id)
                .execute(&mut *conn)
                .await?;
        }
        kept.push(id);
    }
    rec.ref_ids = kept;
    Ok(())
}

async fn add_pending(conn: &mut SqliteConnection, import_path: &str, referrer: i64) -> Result<()> {
    let row = sqlx::query("SELECT ref_ids FROM pending_refs WHERE import_path = ?")
        .bind(import_path)
        .fetch_optional(&mut *conn)
        .await?;
    let mut ids = row
        .map(|r| decode_ids(&r.get::<String, _>("ref_ids")))
        .unwrap_or_default();
    if ids.contains(&referrer) {
        return Ok(());
    }
    ids.push(referrer);
    sqlx::query(
        "INSERT INTO pending_refs (import_path, ref_ids) VALUES (?, ?) \
         ON CONFLICT(import_path) DO UPDATE SET ref_ids = excluded.ref_ids",
    )
    .bind(import_path)
    .bind(encode_list(&ids))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn take_pending(conn: &mut SqliteConnection, import_path: &str) -> Result<Vec<i64>> {
    let row = sqlx::query("SELECT ref_ids FROM pending_refs WHERE import_path = ?")
        .bind(import_path)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(Vec::new());
    };
    sqlx::query("DELETE FROM pending_refs WHERE import_path = ?")
        .bind(import_path)
        .execute(&mut *conn)
        .await?;
    Ok(decode_ids(&row.get::<String, _>("ref_ids")))
}

pub async fn count_pending(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM pending_refs").fetch_one(pool).await?;
    Ok(row.get("n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::open(&tmp.path().join("test.sqlite")).await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        (tmp, pool)
    }

    async fn save_new(pool: &SqlitePool, rec: &mut PackageRecord) {
        let mut tx = pool.begin().await.unwrap();
        save(&mut tx, rec, true).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_then_update() {
        let (_tmp, pool) = test_pool().await;
        let mut rec = PackageRecord::new("github.com/u/a");
        rec.synopsis = "x".repeat(400);
        rec.is_subrepo = true;
        save_new(&pool, &mut rec).await;
        assert!(rec.id > 0);

        let stored = get_by_path(&pool, "github.com/u/a").await.unwrap().unwrap();
        assert_eq!(stored.synopsis.len(), MAX_SYNOPSIS_LEN);
        assert_eq!(stored.views, 1);
        assert_eq!(stored.priority, docwalker_core::models::PRIORITY_SUBREPO);
        assert_eq!(stored.pkg_ver, PACKAGE_VERSION);

        rec.etag = "e2".to_string();
        let id = rec.id;
        save_new(&pool, &mut rec).await;
        assert_eq!(rec.id, id);
        assert_eq!(count(&pool).await.unwrap(), 1);
        assert_eq!(get_by_id(&pool, id).await.unwrap().unwrap().etag, "e2");
    }

    #[tokio::test]
    async fn test_refs_link_existing_and_pending() {
        let (_tmp, pool) = test_pool().await;

        let mut lib = PackageRecord::new("github.com/u/lib");
        save_new(&pool, &mut lib).await;

        let mut app = PackageRecord::new("github.com/u/app");
        app.import_paths = vec![
            "fmt".to_string(),
            "C".to_string(),
            "github.com/u/lib".to_string(),
            "github.com/u/later".to_string(),
        ];
        save_new(&pool, &mut app).await;
        assert_eq!(app.import_ids, vec![lib.id]);
        assert_eq!(count_pending(&pool).await.unwrap(), 1);

        let lib = get_by_path(&pool, "github.com/u/lib").await.unwrap().unwrap();
        assert_eq!(lib.ref_ids, vec![app.id]);

        // The pending ref is merged when the imported package first appears.
        let mut later = PackageRecord::new("github.com/u/later");
        save_new(&pool, &mut later).await;
        assert_eq!(later.ref_ids, vec![app.id]);
        assert_eq!(count_pending(&pool).await.unwrap(), 0);
        let app = get_by_id(&pool, app.id).await.unwrap().unwrap();
        assert!(app.import_ids.contains(&later.id));
    }

    #[tokio::test]
    async fn test_refs_pruned_when_import_dropped() {
        let (_tmp, pool) = test_pool().await;
        let mut lib = PackageRecord::new("github.com/u/lib");
        save_new(&pool, &mut lib).await;
        let mut app = PackageRecord::new("github.com/u/app");
        app.import_paths = vec!["github.com/u/lib".to_string()];
        save_new(&pool, &mut app).await;

        app.import_paths.clear();
        save_new(&pool, &mut app).await;

        let mut lib = get_by_path(&pool, "github.com/u/lib").await.unwrap().unwrap();
        assert_eq!(lib.ref_ids, vec![app.id]);
        save_new(&pool, &mut lib).await;
        assert!(lib.ref_ids.is_empty());
    }

    #[tokio::test]
    async fn test_touch_and_delete() {
        let (_tmp, pool) = test_pool().await;
        let mut rec = PackageRecord::new("github.com/u/a");
        save_new(&pool, &mut rec).await;

        touch_view(&pool, rec.id, 100).await.unwrap();
        touch_created(&pool, rec.id, 200).await.unwrap();
        let stored = get_by_id(&pool, rec.id).await.unwrap().unwrap();
        assert_eq!((stored.views, stored.last_viewed, stored.created), (2, 100, 200));

        let mut conn = pool.acquire().await.unwrap();
        artifacts::save(&mut conn, rec.id, "e", 0).await.unwrap();
        drop(conn);

        let deleted = delete_by_path(&pool, "github.com/u/a").await.unwrap();
        assert_eq!(deleted.map(|r| r.id), Some(rec.id));
        assert!(get_by_path(&pool, "github.com/u/a").await.unwrap().is_none());
        assert!(artifacts::get(&pool, rec.id, "e").await.unwrap().is_none());
        assert!(delete_by_path(&pool, "github.com/u/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reads_legacy_encoding() {
        let (_tmp, pool) = test_pool().await;
        sqlx::query("INSERT INTO packages (import_path, ref_ids, import_paths) VALUES (?, ?, ?)")
            .bind("github.com/u/old")
            .bind("$3|$5|")
            .bind("fmt|github.com/u/x|")
            .execute(&pool)
            .await
            .unwrap();
        let rec = get_by_path(&pool, "github.com/u/old").await.unwrap().unwrap();
        assert_eq!(rec.ref_ids, vec![3, 5]);
        assert_eq!(rec.import_paths, vec!["fmt", "github.com/u/x"]);
    }
}
