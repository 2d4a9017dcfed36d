#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use imagedb::{CreateEvent, Db, DeleteEvent, Hooks, Resize, TranscodeError, Transcoder};
use imagedb_transcode::TranscodeResult;
use parking_lot::Mutex;

/// Transcoder double: copies the input verbatim and counts invocations.
/// An optional delay widens the race window for single-flight tests.
#[derive(Default)]
pub struct FakeTranscoder {
    calls: AtomicUsize,
    delay: Option<Duration>,
    fail: bool,
    fail_after: Option<usize>,
}

impl FakeTranscoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    /// Succeed for the first `n` invocations, fail afterwards.
    pub fn failing_after(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_after: Some(n),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _resize: Option<Resize>,
    ) -> TranscodeResult<()> {
        if !tokio::fs::try_exists(input).await? {
            return Err(TranscodeError::InputMissing(input.to_path_buf()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail || self.fail_after.is_some_and(|limit| call >= limit) {
            return Err(TranscodeError::Convert {
                detail: "forced failure".to_string(),
            });
        }
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

/// Hook double recording every event it receives.
#[derive(Default)]
pub struct RecordingHooks {
    pub created: Mutex<Vec<CreateEvent>>,
    pub deleted: Mutex<Vec<DeleteEvent>>,
}

impl RecordingHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Hooks for RecordingHooks {
    fn on_create(&self, event: &CreateEvent) {
        self.created.lock().push(event.clone());
    }

    fn on_delete(&self, event: &DeleteEvent) {
        self.deleted.lock().push(event.clone());
    }
}

/// Hook double that always panics; operations must be isolated from it.
pub struct PanickingHooks;

impl Hooks for PanickingHooks {
    fn on_create(&self, _event: &CreateEvent) {
        panic!("hook blew up");
    }

    fn on_delete(&self, _event: &DeleteEvent) {
        panic!("hook blew up");
    }
}

/// Opt-in log output for debugging a failing test run (`RUST_LOG=debug`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn new_db(root: &Path, transcoder: Arc<FakeTranscoder>) -> Db {
    init_tracing();
    Db::builder()
        .storage_root(root)
        .transcoder(transcoder)
        .build()
        .unwrap()
}

/// Write a deterministic source file and return its path.
pub async fn write_source(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    tokio::fs::write(&path, format!("image-bytes:{name}"))
        .await
        .unwrap();
    path
}

/// Hook emission is spawned; give the runtime a beat to drain it.
pub async fn settle_hooks() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
