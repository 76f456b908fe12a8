//! Artifact files and rows.
//!
//! A rendered package page is split into JS chunks
//! ([`docwalker_core::chunk::build_js_chunks`]) and written under the docs
//! root:
//!
//! | File | Content |
//! |------|---------|
//! | `<path>.js` | first chunk |
//! | `<path>-<n>.js` | extra chunk `n`, `1..=num_extra_files` |
//! | `<path>_RM_<lang>.js` | readme for locale `lang` |
//!
//! Once distributed, chunks live in the bucket as `<path>-<etag>.js` and
//! `<path>-<etag>-<n>.js` and the local files are removed.
//!
//! Row helpers at the bottom of this module persist [`ArtifactRecord`]s.
//! Status updates are conditional on the current status being lower, so a
//! generation never moves backward.

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::debug;

use docwalker_core::chunk::{build_js_chunks, to_js};
use docwalker_core::comment::html_escape;
use docwalker_core::models::{ArtifactRecord, ArtifactStatus, Package};

/// Readme locales the store knows how to clean up.
const README_LOCALES: &[&str] = &["en", "zh"];

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    docs_root: PathBuf,
    bucket_url: String,
    write_readmes: bool,
}

impl ArtifactStore {
    pub fn new(docs_root: impl Into<PathBuf>, bucket_url: impl Into<String>, write_readmes: bool) -> Self {
        Self {
            docs_root: docs_root.into(),
            bucket_url: bucket_url.into(),
            write_readmes,
        }
    }

    pub fn docs_root(&self) -> &Path {
        &self.docs_root
    }

    // ============ Paths ============

    pub fn local_path(&self, import_path: &str) -> PathBuf {
        self.docs_root.join(format!("{}.js", import_path))
    }

    pub fn extra_path(&self, import_path: &str, n: i64) -> PathBuf {
        self.docs_root.join(format!("{}-{}.js", import_path, n))
    }

    pub fn readme_path(&self, import_path: &str, lang: &str) -> PathBuf {
        self.docs_root.join(format!("{}_RM_{}.js", import_path, lang))
    }

    /// Every chunk file of an artifact, first chunk first.
    pub fn local_paths(&self, import_path: &str, num_extra: i64) -> Vec<PathBuf> {
        let mut paths = vec![self.local_path(import_path)];
        paths.extend((1..=num_extra).map(|n| self.extra_path(import_path, n)));
        paths
    }

    /// Bucket object names of a distributed artifact, in chunk order.
    pub fn object_names(import_path: &str, etag: &str, num_extra: i64) -> Vec<String> {
        let mut names = vec![format!("{}-{}.js", import_path, etag)];
        names.extend((1..=num_extra).map(|n| format!("{}-{}-{}.js", import_path, etag, n)));
        names
    }

    /// URLs a client loads, in order, to display the artifact.
    pub fn doc_urls(&self, import_path: &str, artifact: &ArtifactRecord) -> Vec<String> {
        if artifact.status == ArtifactStatus::Distributed {
            Self::object_names(import_path, &artifact.etag, artifact.num_extra_files)
                .into_iter()
                .map(|name| format!("{}{}", self.bucket_url, name))
                .collect()
        } else {
            let mut urls = vec![format!("/docs/{}.js", import_path)];
            urls.extend((1..=artifact.num_extra_files).map(|n| format!("/docs/{}-{}.js", import_path, n)));
            urls
        }
    }

    // ============ Files ============

    /// Split `html` into chunks and write them. Returns the number of
    /// extra chunks beyond the first.
    pub async fn write_doc(&self, import_path: &str, html: &str) -> Result<i64> {
        let chunks = build_js_chunks(html);
        let paths = self.local_paths(import_path, chunks.len() as i64 - 1);
        for (path, chunk) in paths.iter().zip(chunks.iter()) {
            write_file(path, chunk.as_bytes()).await?;
        }
        debug!(import_path, chunks = chunks.len(), "wrote doc chunks");
        Ok(chunks.len() as i64 - 1)
    }

    /// Write each readme: its rendered HTML, or an escaped `<pre>` block
    /// when rendering failed.
    pub async fn write_readmes(&self, pkg: &Package) -> Result<()> {
        if !self.write_readmes {
            return Ok(());
        }
        for (lang, data) in &pkg.readmes {
            let body = match pkg.readme_html.get(lang) {
                Some(html) => html.clone(),
                None => format!("<pre>{}</pre>", html_escape(&String::from_utf8_lossy(data))),
            };
            write_file(&self.readme_path(pkg.import_path(), lang), to_js(&body).as_bytes()).await?;
        }
        Ok(())
    }

    pub fn has_first_chunk(&self, import_path: &str) -> bool {
        self.local_path(import_path).is_file()
    }

    /// Remove chunk files only; readmes keep being served locally.
    pub async fn remove_chunks(&self, import_path: &str, num_extra: i64) -> Result<()> {
        remove_files(self.local_paths(import_path, num_extra)).await
    }

    /// Remove chunk files and readmes. Missing files are fine.
    pub async fn remove_local(&self, import_path: &str, num_extra: i64) -> Result<()> {
        let mut paths = self.local_paths(import_path, num_extra);
        paths.extend(README_LOCALES.iter().map(|lang| self.readme_path(import_path, lang)));
        remove_files(paths).await
    }
}

async fn remove_files(paths: Vec<PathBuf>) -> Result<()> {
    for path in paths {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
    Ok(())
}

async fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

// ============ Rows ============

fn row_to_artifact(row: &SqliteRow) -> ArtifactRecord {
    ArtifactRecord {
        id: row.get("id"),
        pkg_id: row.get("pkg_id"),
        etag: row.get("etag"),
        status: ArtifactStatus::from_i64(row.get("status")),
        num_extra_files: row.get("num_extra_files"),
    }
}

pub async fn get(pool: &SqlitePool, pkg_id: i64, etag: &str) -> Result<Option<ArtifactRecord>> {
    let row = sqlx::query(
        "SELECT id, pkg_id, etag, status, num_extra_files FROM artifacts WHERE pkg_id = ? AND etag = ?",
    )
    .bind(pkg_id)
    .bind(etag)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(row_to_artifact))
}

/// Record a fresh generation for `(pkg_id, etag)`.
///
/// Regenerating an etag that already has a row starts a new generation:
/// the status is reset to `Generated`, whatever it was. This is the one
/// write that moves a row back. The lifecycle passes only advance status
/// through [`set_status`].
pub async fn save(
    conn: &mut SqliteConnection,
    pkg_id: i64,
    etag: &str,
    num_extra_files: i64,
) -> Result<ArtifactRecord> {
    let row = sqlx::query(
        r#"
        INSERT INTO artifacts (pkg_id, etag, status, num_extra_files)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(pkg_id, etag) DO UPDATE SET
            status = excluded.status,
            num_extra_files = excluded.num_extra_files
        RETURNING id, pkg_id, etag, status, num_extra_files
        "#,
    )
    .bind(pkg_id)
    .bind(etag)
    .bind(ArtifactStatus::Generated.as_i64())
    .bind(num_extra_files)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row_to_artifact(&row))
}

/// Move an artifact forward to `status`. Returns false when the row is
/// already at or past it.
pub async fn set_status(pool: &SqlitePool, id: i64, status: ArtifactStatus) -> Result<bool> {
    let result = sqlx::query("UPDATE artifacts SET status = ? WHERE id = ? AND status < ?")
        .bind(status.as_i64())
        .bind(id)
        .bind(status.as_i64())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Retire older local generations of a package. Their files were just
/// overwritten by the generation for `current_etag`.
pub async fn supersede(conn: &mut SqliteConnection, pkg_id: i64, current_etag: &str) -> Result<u64> {
    let result = sqlx::query("UPDATE artifacts SET status = ? WHERE pkg_id = ? AND etag != ? AND status = ?")
        .bind(ArtifactStatus::Recycled.as_i64())
        .bind(pkg_id)
        .bind(current_etag)
        .bind(ArtifactStatus::Generated.as_i64())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_for_package(conn: &mut SqliteConnection, pkg_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM artifacts WHERE pkg_id = ?")
        .bind(pkg_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> ArtifactStore {
        ArtifactStore::new(tmp.path(), "https://cdn.example.com/", true)
    }

    async fn test_pool() -> (TempDir, SqlitePool) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::open(&tmp.path().join("test.sqlite")).await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        (tmp, pool)
    }

    #[test]
    fn test_paths_and_urls() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        assert_eq!(s.local_path("github.com/u/r"), tmp.path().join("github.com/u/r.js"));
        assert_eq!(s.extra_path("github.com/u/r", 2), tmp.path().join("github.com/u/r-2.js"));
        assert_eq!(s.readme_path("github.com/u/r", "zh"), tmp.path().join("github.com/u/r_RM_zh.js"));
        assert_eq!(
            ArtifactStore::object_names("github.com/u/r", "abc", 1),
            vec!["github.com/u/r-abc.js", "github.com/u/r-abc-1.js"]
        );

        let mut art = ArtifactRecord {
            id: 1,
            pkg_id: 1,
            etag: "abc".to_string(),
            status: ArtifactStatus::Generated,
            num_extra_files: 1,
        };
        assert_eq!(
            s.doc_urls("github.com/u/r", &art),
            vec!["/docs/github.com/u/r.js", "/docs/github.com/u/r-1.js"]
        );
        art.status = ArtifactStatus::Distributed;
        assert_eq!(
            s.doc_urls("github.com/u/r", &art)[1],
            "https://cdn.example.com/github.com/u/r-abc-1.js"
        );
    }

    #[tokio::test]
    async fn test_write_large_doc_splits_into_two_chunks() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        let html = "<p>x</p>".repeat(11_250);
        assert_eq!(html.len(), 90_000);

        let extra = s.write_doc("github.com/u/big", &html).await.unwrap();
        assert_eq!(extra, 1);
        assert!(s.has_first_chunk("github.com/u/big"));
        assert!(s.extra_path("github.com/u/big", 1).is_file());

        s.remove_local("github.com/u/big", extra).await.unwrap();
        assert!(!s.has_first_chunk("github.com/u/big"));
        assert!(!s.extra_path("github.com/u/big", 1).exists());
        // Second removal is a no-op.
        s.remove_local("github.com/u/big", extra).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_readmes_escapes() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        let mut pkg = Package::default();
        pkg.record.import_path = "github.com/u/r".to_string();
        pkg.readmes.insert("en".to_string(), b"<b>hi</b>".to_vec());
        s.write_readmes(&pkg).await.unwrap();

        let js = std::fs::read_to_string(s.readme_path("github.com/u/r", "en")).unwrap();
        assert!(js.starts_with("document.write("));
        assert!(js.contains("&lt;b&gt;hi&lt;/b&gt;"));
    }

    #[tokio::test]
    async fn test_write_readmes_prefers_rendered_html() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        let mut pkg = Package::default();
        pkg.record.import_path = "github.com/u/r".to_string();
        pkg.readmes.insert("en".to_string(), b"# hi".to_vec());
        pkg.readmes.insert("zh".to_string(), b"<i>".to_vec());
        pkg.readme_html.insert("en".to_string(), "<h1>hi</h1>".to_string());
        s.write_readmes(&pkg).await.unwrap();

        let en = std::fs::read_to_string(s.readme_path("github.com/u/r", "en")).unwrap();
        assert!(en.contains(r"\x3ch1>hi\x3c/h1>"), "{}", en);
        assert!(!en.contains("pre>"));
        let zh = std::fs::read_to_string(s.readme_path("github.com/u/r", "zh")).unwrap();
        assert!(zh.contains("&lt;i&gt;"));
    }

    #[tokio::test]
    async fn test_status_never_moves_backward() {
        let (_tmp, pool) = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let art = save(&mut conn, 7, "e1", 0).await.unwrap();
        drop(conn);
        assert_eq!(art.status, ArtifactStatus::Generated);

        assert!(set_status(&pool, art.id, ArtifactStatus::Distributed).await.unwrap());
        assert!(!set_status(&pool, art.id, ArtifactStatus::Generated).await.unwrap());
        assert!(!set_status(&pool, art.id, ArtifactStatus::Distributed).await.unwrap());
        assert!(set_status(&pool, art.id, ArtifactStatus::Recycled).await.unwrap());
        assert!(!set_status(&pool, art.id, ArtifactStatus::Distributed).await.unwrap());

        let stored = get(&pool, 7, "e1").await.unwrap().unwrap();
        assert_eq!(stored.status, ArtifactStatus::Recycled);
    }

    #[tokio::test]
    async fn test_regeneration_and_supersede() {
        let (_tmp, pool) = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let old = save(&mut conn, 1, "old", 0).await.unwrap();
        let new = save(&mut conn, 1, "new", 2).await.unwrap();
        assert_eq!(supersede(&mut conn, 1, "new").await.unwrap(), 1);
        drop(conn);

        assert_eq!(get(&pool, 1, "old").await.unwrap().unwrap().status, ArtifactStatus::Recycled);
        assert_eq!(get(&pool, 1, "new").await.unwrap().unwrap().num_extra_files, 2);

        // Rebuilding a recycled etag starts over at Generated with the same id.
        let mut conn = pool.acquire().await.unwrap();
        let again = save(&mut conn, 1, "old", 0).await.unwrap();
        assert_eq!(again.id, old.id);
        assert_eq!(again.status, ArtifactStatus::Generated);
        assert_ne!(again.id, new.id);
    }
}
