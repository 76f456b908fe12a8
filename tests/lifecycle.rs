//! Distribute and recycle passes against an in-memory object store.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use docwalker::artifacts::{self, ArtifactStore};
use docwalker::lifecycle::Lifecycle;
use docwalker::object_store::ObjectStore;
use docwalker::{db, migrate, packages};
use docwalker_core::models::{ArtifactRecord, ArtifactStatus, PackageRecord};

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    put_delay: Option<Duration>,
}

impl MemoryStore {
    fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(&self, local: &Path, name: &str) -> Result<()> {
        let data = tokio::fs::read(local).await?;
        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }
        self.objects.lock().unwrap().insert(name.to_string(), data);
        Ok(())
    }

    async fn remove_object(&self, name: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(name);
        Ok(())
    }
}

struct Fixture {
    _tmp: TempDir,
    pool: SqlitePool,
    store: ArtifactStore,
}

async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let pool = db::open(&tmp.path().join("lc.sqlite")).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    let store = ArtifactStore::new(tmp.path().join("docs"), "https://bucket.example.com/", true);
    Fixture { _tmp: tmp, pool, store }
}

/// Insert a package viewed at `last_viewed` with a generated artifact of
/// `html` on disk.
async fn seed(f: &Fixture, import_path: &str, etag: &str, last_viewed: i64, html: &str) -> ArtifactRecord {
    let num_extra = f.store.write_doc(import_path, html).await.unwrap();
    let mut rec = PackageRecord::new(import_path);
    rec.etag = etag.to_string();
    rec.last_viewed = last_viewed;
    let mut tx = f.pool.begin().await.unwrap();
    packages::save(&mut tx, &mut rec, false).await.unwrap();
    let art = artifacts::save(&mut tx, rec.id, etag, num_extra).await.unwrap();
    tx.commit().await.unwrap();
    art
}

async fn status_of(pool: &SqlitePool, art: &ArtifactRecord) -> ArtifactStatus {
    artifacts::get(pool, art.pkg_id, &art.etag).await.unwrap().unwrap().status
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

const DAY: i64 = 24 * 60 * 60;

#[tokio::test]
async fn test_distribute_uploads_and_removes_local_chunks() {
    let f = fixture().await;
    let objects = Arc::new(MemoryStore::default());
    let lc = Lifecycle::new(
        f.pool.clone(),
        f.store.clone(),
        Some(objects.clone() as Arc<dyn ObjectStore>),
        Duration::from_secs(7 * DAY as u64),
    );

    let big = "<p>x</p>".repeat(11_250);
    let art = seed(&f, "github.com/u/big", "e1", now(), &big).await;
    assert_eq!(art.num_extra_files, 1);

    let report = lc.distribute().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(status_of(&f.pool, &art).await, ArtifactStatus::Distributed);
    assert_eq!(
        objects.names(),
        vec!["github.com/u/big-e1-1.js", "github.com/u/big-e1.js"]
    );
    assert!(!f.store.local_path("github.com/u/big").exists());
    assert!(!f.store.extra_path("github.com/u/big", 1).exists());

    let again = lc.distribute().await.unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(objects.names().len(), 2);
}

#[tokio::test]
async fn test_recycle_is_idempotent() {
    let f = fixture().await;
    let objects = Arc::new(MemoryStore::default());
    let lc = Lifecycle::new(
        f.pool.clone(),
        f.store.clone(),
        Some(objects.clone() as Arc<dyn ObjectStore>),
        Duration::from_secs(7 * DAY as u64),
    );

    let stale = seed(&f, "github.com/u/gone", "e2", now() - 30 * DAY, "<p>gone</p>").await;
    let fresh = seed(&f, "github.com/u/new", "e3", now(), "<p>new</p>").await;

    lc.distribute().await.unwrap();
    assert_eq!(objects.names().len(), 2);

    let report = lc.recycle().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(status_of(&f.pool, &stale).await, ArtifactStatus::Recycled);
    assert_eq!(status_of(&f.pool, &fresh).await, ArtifactStatus::Distributed);
    assert!(!objects.names().contains(&"github.com/u/gone-e2.js".to_string()));
    assert!(objects.names().contains(&"github.com/u/new-e3.js".to_string()));

    let again = lc.recycle().await.unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(status_of(&f.pool, &stale).await, ArtifactStatus::Recycled);
}

#[tokio::test]
async fn test_recycle_generated_removes_local_files() {
    let f = fixture().await;
    let lc = Lifecycle::new(f.pool.clone(), f.store.clone(), None, Duration::from_secs(7 * DAY as u64));

    let art = seed(&f, "github.com/u/old", "e1", now() - 30 * DAY, "<p>old</p>").await;
    assert!(f.store.has_first_chunk("github.com/u/old"));

    let report = lc.recycle().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(status_of(&f.pool, &art).await, ArtifactStatus::Recycled);
    assert!(!f.store.has_first_chunk("github.com/u/old"));
}

#[tokio::test]
async fn test_recycled_artifact_never_moves_backward() {
    let f = fixture().await;
    let objects = Arc::new(MemoryStore::default());
    let lc = Lifecycle::new(
        f.pool.clone(),
        f.store.clone(),
        Some(objects.clone() as Arc<dyn ObjectStore>),
        Duration::from_secs(7 * DAY as u64),
    );

    let art = seed(&f, "github.com/u/old", "e1", now() - 30 * DAY, "<p>old</p>").await;
    lc.recycle().await.unwrap();
    assert_eq!(status_of(&f.pool, &art).await, ArtifactStatus::Recycled);

    assert!(!artifacts::set_status(&f.pool, art.id, ArtifactStatus::Distributed)
        .await
        .unwrap());
    let report = lc.distribute().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(status_of(&f.pool, &art).await, ArtifactStatus::Recycled);
    assert!(objects.names().is_empty());
}

#[tokio::test]
async fn test_overlapping_distribute_is_skipped() {
    let f = fixture().await;
    let objects = Arc::new(MemoryStore {
        put_delay: Some(Duration::from_millis(300)),
        ..Default::default()
    });
    let lc = Arc::new(Lifecycle::new(
        f.pool.clone(),
        f.store.clone(),
        Some(objects.clone() as Arc<dyn ObjectStore>),
        Duration::from_secs(7 * DAY as u64),
    ));

    let art = seed(&f, "github.com/u/slow", "e1", now(), "<p>slow</p>").await;

    let first = {
        let lc = Arc::clone(&lc);
        tokio::spawn(async move { lc.distribute().await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = lc.distribute().await.unwrap();
    assert!(second.skipped);

    let first = first.await.unwrap();
    assert!(!first.skipped);
    assert_eq!(first.processed, 1);
    assert_eq!(status_of(&f.pool, &art).await, ArtifactStatus::Distributed);
}

#[tokio::test]
async fn test_superseded_distributed_artifact_is_recycled() {
    let f = fixture().await;
    let objects = Arc::new(MemoryStore::default());
    let lc = Lifecycle::new(
        f.pool.clone(),
        f.store.clone(),
        Some(objects.clone() as Arc<dyn ObjectStore>),
        Duration::from_secs(7 * DAY as u64),
    );

    let old = seed(&f, "github.com/u/pkg", "e1", now(), "<p>v1</p>").await;
    lc.distribute().await.unwrap();
    assert_eq!(objects.names(), vec!["github.com/u/pkg-e1.js"]);

    // A newer revision is generated for the same package.
    let num_extra = f.store.write_doc("github.com/u/pkg", "<p>v2</p>").await.unwrap();
    let mut rec = packages::get_by_path(&f.pool, "github.com/u/pkg").await.unwrap().unwrap();
    rec.etag = "e2".to_string();
    let mut tx = f.pool.begin().await.unwrap();
    packages::save(&mut tx, &mut rec, false).await.unwrap();
    let new = artifacts::save(&mut tx, rec.id, "e2", num_extra).await.unwrap();
    artifacts::supersede(&mut tx, rec.id, "e2").await.unwrap();
    tx.commit().await.unwrap();

    let report = lc.recycle().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(status_of(&f.pool, &old).await, ArtifactStatus::Recycled);
    assert_eq!(status_of(&f.pool, &new).await, ArtifactStatus::Generated);
    assert!(objects.names().is_empty());
    assert!(f.store.has_first_chunk("github.com/u/pkg"));
}

#[tokio::test]
async fn test_regeneration_starts_new_generation() {
    let f = fixture().await;
    let lc = Lifecycle::new(f.pool.clone(), f.store.clone(), None, Duration::from_secs(7 * DAY as u64));

    let art = seed(&f, "github.com/u/back", "e1", now() - 30 * DAY, "<p>old</p>").await;
    lc.recycle().await.unwrap();
    assert_eq!(status_of(&f.pool, &art).await, ArtifactStatus::Recycled);

    let again = seed(&f, "github.com/u/back", "e1", now(), "<p>new</p>").await;
    assert_eq!(again.id, art.id);
    assert_eq!(status_of(&f.pool, &art).await, ArtifactStatus::Generated);
    assert!(f.store.has_first_chunk("github.com/u/back"));
}
