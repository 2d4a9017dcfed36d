#![forbid(unsafe_code)]

mod common;

use std::time::{Duration, Instant};

use common::{new_db, write_source, FakeTranscoder};
use imagedb::{FetchOptions, ImageDbError, StoreOptions};
use rstest::rstest;
use tokio_util::sync::CancellationToken;

const GEN_DELAY: Duration = Duration::from_millis(150);

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_fetches_for_one_key_generate_once() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = FakeTranscoder::slow(GEN_DELAY);
    let db = new_db(dir.path(), transcoder.clone());
    let source = write_source(dir.path(), "a.jpg").await;
    db.store(&source, StoreOptions::new()).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            db.fetch("a.jpg", FetchOptions::new().width(102)).await
        }));
    }
    let mut paths = Vec::new();
    for task in tasks {
        paths.push(task.await.unwrap().unwrap().unwrap());
    }

    assert_eq!(transcoder.calls(), 1, "single-flight per derivative key");
    paths.dedup();
    assert_eq!(paths.len(), 1, "all callers observe the same path");
    assert!(db.storage_root().join("w/102/a.jpg").exists());
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test(flavor = "multi_thread")]
async fn distinct_keys_generate_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = FakeTranscoder::slow(GEN_DELAY);
    let db = new_db(dir.path(), transcoder.clone());
    let source = write_source(dir.path(), "a.jpg").await;
    db.store(&source, StoreOptions::new()).await.unwrap();

    let started = Instant::now();
    let (w, h) = tokio::join!(
        db.fetch("a.jpg", FetchOptions::new().width(60)),
        db.fetch("a.jpg", FetchOptions::new().height(80)),
    );
    w.unwrap().unwrap();
    h.unwrap().unwrap();

    assert_eq!(transcoder.calls(), 2);
    // Two serialized generations would take at least twice the delay.
    assert!(
        started.elapsed() < GEN_DELAY * 2,
        "distinct keys must not serialize against each other"
    );
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test(flavor = "multi_thread")]
async fn waiters_observe_the_cache_hit_path() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = FakeTranscoder::slow(GEN_DELAY);
    let db = new_db(dir.path(), transcoder.clone());
    let source = write_source(dir.path(), "a.jpg").await;
    db.store(&source, StoreOptions::new()).await.unwrap();

    let racer = {
        let db = db.clone();
        tokio::spawn(async move { db.fetch("a.jpg", FetchOptions::new().width(60)).await })
    };
    // Give the racer a head start into its generation window.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let late = db
        .fetch("a.jpg", FetchOptions::new().width(60))
        .await
        .unwrap()
        .unwrap();
    racer.await.unwrap().unwrap();

    assert_eq!(transcoder.calls(), 1);
    assert!(late.ends_with("w/60/a.jpg"));
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_child_creation_yields_one_instance() {
    let dir = tempfile::tempdir().unwrap();
    let db = new_db(dir.path(), FakeTranscoder::new());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            db.child("g1").map(|c| c.storage_root().to_path_buf())
        }));
    }
    let mut roots = Vec::new();
    for task in tasks {
        roots.push(task.await.unwrap().unwrap());
    }
    roots.dedup();
    assert_eq!(roots.len(), 1);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn cancelled_generation_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let db = imagedb::Db::builder()
        .storage_root(dir.path())
        .transcoder(FakeTranscoder::new())
        .cancel(cancel.clone())
        .build()
        .unwrap();
    let source = write_source(dir.path(), "a.jpg").await;
    db.store(&source, StoreOptions::new()).await.unwrap();
    db.fetch("a.jpg", FetchOptions::new().width(50)).await.unwrap();

    cancel.cancel();
    // Cache hits still serve; only generation is refused.
    assert!(db
        .fetch("a.jpg", FetchOptions::new().width(50))
        .await
        .unwrap()
        .is_some());
    let result = db.fetch("a.jpg", FetchOptions::new().width(60)).await;
    assert!(matches!(result, Err(ImageDbError::Cancelled)));
    assert!(!db.storage_root().join("w/60/a.jpg").exists());
}
