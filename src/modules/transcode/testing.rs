//! In-memory stand-ins for the stores, engine and lock used in unit tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::Notify;

use super::encoder::{EncodeError, EncodeProfile, EncodingEngine, EncodingInvoker, EngineExit};
use super::error::JobError;
use super::ledger::{JobLedger, LedgerError};
use super::lock::JobLock;
use super::model::{JobRecord, JobStage, PublishedUrls};
use super::orchestrator::TranscodeOrchestrator;
use super::recorder::{RecorderError, StatusRecorder, VideoStore};
use super::transfer::ArtifactTransfer;
use super::workspace::WorkspaceManager;
use crate::config::settings::tests::sample_config;
use crate::infrastructure::storage::local::LocalDirStore;
use crate::infrastructure::storage::{ByteReader, ObjectStore, StorageError, StorageResult};
use crate::state::AppState;

/// Destination that remembers the keys it was asked to store, in order.
#[derive(Default)]
pub struct RecordingStore {
    keys: Mutex<Vec<String>>,
    fail_suffix: Mutex<Option<String>>,
}

impl RecordingStore {
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }

    /// Refuse every upload whose key ends with `suffix`.
    pub fn fail_keys_ending_with(&self, suffix: &str) {
        *self.fail_suffix.lock().unwrap() = Some(suffix.to_string());
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn get(&self, key: &str) -> StorageResult<ByteReader> {
        Err(StorageError::NotFound(key.to_string()))
    }

    async fn put_file(&self, key: &str, path: &Path, _content_type: &str) -> StorageResult<()> {
        if !path.is_file() {
            return Err(StorageError::UploadFailed(path.display().to_string()));
        }
        if let Some(suffix) = self.fail_suffix.lock().unwrap().as_deref() {
            if key.ends_with(suffix) {
                return Err(StorageError::UploadFailed(key.to_string()));
            }
        }
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")))
    }
}

/// Source whose stream yields some bytes and then breaks.
pub struct FailingReaderStore {
    prefix: Vec<u8>,
}

impl FailingReaderStore {
    pub fn new(prefix: Vec<u8>) -> Self {
        Self { prefix }
    }
}

#[async_trait]
impl ObjectStore for FailingReaderStore {
    async fn get(&self, _key: &str) -> StorageResult<ByteReader> {
        let reader = io::Cursor::new(self.prefix.clone()).chain(BrokenReader);
        Ok(Box::pin(reader))
    }

    async fn put_file(&self, key: &str, _path: &Path, _content_type: &str) -> StorageResult<()> {
        Err(StorageError::UploadFailed(key.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FakeOutcome {
    /// Exit 0 and write the output file named by the last argument.
    Succeed,
    /// Exit 0 without writing anything.
    SucceedWithoutOutput,
    Exit(i32),
}

/// Engine that plays back scripted outcomes; once the script runs out every
/// call succeeds.
pub struct FakeEngine {
    script: Mutex<VecDeque<FakeOutcome>>,
    calls: Mutex<Vec<Vec<String>>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeEngine {
    pub fn succeeding() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(outcomes: Vec<FakeOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    /// Succeeding engine whose first call blocks until `gate` is notified.
    pub fn gated(gate: Arc<Notify>) -> Self {
        let engine = Self::succeeding();
        *engine.gate.lock().unwrap() = Some(gate);
        engine
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EncodingEngine for FakeEngine {
    async fn invoke(&self, args: &[String], _working_dir: &Path) -> Result<EngineExit, EncodeError> {
        self.calls.lock().unwrap().push(args.to_vec());
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FakeOutcome::Succeed);

        match outcome {
            FakeOutcome::Succeed => {
                let output = Path::new(args.last().expect("output argument"));
                std::fs::write(output, b"artifact").map_err(EncodeError::Spawn)?;
                if output.extension().is_some_and(|e| e == "m3u8") {
                    let segment = output.with_file_name("master0.ts");
                    std::fs::write(segment, b"segment").map_err(EncodeError::Spawn)?;
                }
                Ok(EngineExit {
                    code: Some(0),
                    stderr: String::new(),
                })
            }
            FakeOutcome::SucceedWithoutOutput => Ok(EngineExit {
                code: Some(0),
                stderr: String::new(),
            }),
            FakeOutcome::Exit(code) => Ok(EngineExit {
                code: Some(code),
                stderr: "Invalid data found when processing input".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRow {
    pub status: String,
    pub hls_master_url: Option<String>,
    pub thumb_url: Option<String>,
}

pub struct InMemoryVideoStore {
    rows: Mutex<HashMap<String, VideoRow>>,
    fail_next: AtomicBool,
    publish_calls: AtomicUsize,
}

impl InMemoryVideoStore {
    /// Store holding `ids`, each freshly uploaded and not yet published.
    pub fn with_videos(ids: &[&str]) -> Self {
        let rows = ids
            .iter()
            .map(|id| {
                (
                    id.to_string(),
                    VideoRow {
                        status: "UPLOADED".to_string(),
                        hls_master_url: None,
                        thumb_url: None,
                    },
                )
            })
            .collect();
        Self {
            rows: Mutex::new(rows),
            fail_next: AtomicBool::new(false),
            publish_calls: AtomicUsize::new(0),
        }
    }

    pub fn record(&self, id: &str) -> Option<VideoRow> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    /// Make the next update fail as if the database were unreachable.
    pub fn fail_next_publish(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoStore for InMemoryVideoStore {
    async fn mark_published(&self, video_id: &str, urls: &PublishedUrls) -> Result<(), RecorderError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RecorderError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(video_id)
            .ok_or_else(|| RecorderError::NotFound(video_id.to_string()))?;
        row.status = "PUBLISHED".to_string();
        row.hls_master_url = Some(urls.hls_master_url.clone());
        row.thumb_url = Some(urls.thumb_url.clone());
        Ok(())
    }

    async fn live_urls(&self, video_id: &str) -> Result<Option<PublishedUrls>, RecorderError> {
        let rows = self.rows.lock().unwrap();
        let row = rows
            .get(video_id)
            .ok_or_else(|| RecorderError::NotFound(video_id.to_string()))?;
        if row.status != "PUBLISHED" {
            return Ok(None);
        }
        Ok(row
            .hls_master_url
            .clone()
            .zip(row.thumb_url.clone())
            .map(|(hls_master_url, thumb_url)| PublishedUrls { hls_master_url, thumb_url }))
    }
}

/// Ledger with the same update rules as the Postgres one.
#[derive(Default)]
pub struct InMemoryLedger {
    entries: Mutex<HashMap<String, JobRecord>>,
}

impl InMemoryLedger {
    pub fn entry(&self, video_id: &str) -> Option<JobRecord> {
        self.entries.lock().unwrap().get(video_id).cloned()
    }

    fn update<F>(&self, video_id: &str, f: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(video_id)
            .ok_or_else(|| LedgerError::Missing(video_id.to_string()))?;
        f(entry);
        entry.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}

#[async_trait]
impl JobLedger for InMemoryLedger {
    async fn find(&self, video_id: &str) -> Result<Option<JobRecord>, LedgerError> {
        Ok(self.entry(video_id))
    }

    async fn begin(&self, video_id: &str, source_key: &str) -> Result<JobRecord, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let mut entries = self.entries.lock().unwrap();
        let attempts = entries.get(video_id).map(|e| e.attempts).unwrap_or(0) + 1;
        let created_at = entries.get(video_id).map(|e| e.created_at).unwrap_or(now);
        let record = JobRecord {
            video_id: video_id.to_string(),
            source_key: source_key.to_string(),
            stage: JobStage::Started,
            hls_master_url: None,
            thumb_url: None,
            error_code: None,
            error: None,
            attempts,
            created_at,
            updated_at: now,
        };
        entries.insert(video_id.to_string(), record.clone());
        Ok(record)
    }

    async fn resume(&self, video_id: &str) -> Result<(), LedgerError> {
        self.update(video_id, |e| {
            e.attempts += 1;
            e.error_code = None;
            e.error = None;
        })
    }

    async fn checkpoint(
        &self,
        video_id: &str,
        stage: JobStage,
        urls: Option<&PublishedUrls>,
    ) -> Result<(), LedgerError> {
        self.update(video_id, |e| {
            e.stage = stage;
            if let Some(urls) = urls {
                e.hls_master_url = Some(urls.hls_master_url.clone());
                e.thumb_url = Some(urls.thumb_url.clone());
            }
        })
    }

    async fn fail(&self, video_id: &str, code: &str, error: &str) -> Result<(), LedgerError> {
        self.update(video_id, |e| {
            if e.stage != JobStage::Placed {
                e.stage = JobStage::Failed;
            }
            e.error_code = Some(code.to_string());
            e.error = Some(error.to_string());
        })
    }
}

/// Lock table kept in memory, keyed by video id with the holder's token as
/// value. Release only succeeds for the token that acquired it.
#[derive(Default)]
pub struct InMemoryLock {
    held: Mutex<HashMap<String, String>>,
    issued: AtomicUsize,
}

impl InMemoryLock {
    /// Take the lock for someone else; returns their token.
    pub fn hold(&self, video_id: &str) -> String {
        let token = format!("{}-other", video_id);
        self.held.lock().unwrap().insert(video_id.to_string(), token.clone());
        token
    }

    pub fn is_held(&self, video_id: &str) -> bool {
        self.held.lock().unwrap().contains_key(video_id)
    }
}

#[async_trait]
impl JobLock for InMemoryLock {
    async fn acquire(&self, video_id: &str, _ttl: Duration) -> Result<Option<String>, JobError> {
        let mut held = self.held.lock().unwrap();
        if held.contains_key(video_id) {
            return Ok(None);
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let token = format!("{}-{}", video_id, n);
        held.insert(video_id.to_string(), token.clone());
        Ok(Some(token))
    }

    async fn release(&self, video_id: &str, token: &str) -> Result<(), JobError> {
        let mut held = self.held.lock().unwrap();
        if held.get(video_id).is_some_and(|t| t == token) {
            held.remove(video_id);
        }
        Ok(())
    }
}

/// Application state wired to in-memory fakes, with `uploads/v1/raw.mp4`
/// present in the source bucket.
pub struct TestApp {
    pub state: AppState,
    pub videos: Arc<InMemoryVideoStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub locks: Arc<InMemoryLock>,
    _bucket: TempDir,
    _work: TempDir,
}

pub fn test_app(video_ids: &[&str]) -> TestApp {
    test_app_with(video_ids, Arc::new(FakeEngine::succeeding()))
}

pub fn test_app_with(video_ids: &[&str], engine: Arc<FakeEngine>) -> TestApp {
    let bucket = tempfile::tempdir().unwrap();
    let raw = bucket.path().join("uploads/v1/raw.mp4");
    std::fs::create_dir_all(raw.parent().unwrap()).unwrap();
    std::fs::write(&raw, b"small valid video").unwrap();
    let work = tempfile::tempdir().unwrap();

    let mut config = sample_config();
    config.work_root = work.path().to_path_buf();

    let videos = Arc::new(InMemoryVideoStore::with_videos(video_ids));
    let ledger = Arc::new(InMemoryLedger::default());
    let locks = Arc::new(InMemoryLock::default());

    let orchestrator = TranscodeOrchestrator::new(
        WorkspaceManager::new(&config.work_root),
        ArtifactTransfer::new(
            Arc::new(LocalDirStore::new(bucket.path())),
            Arc::new(RecordingStore::default()),
            &config.public_video_base_url,
        ),
        EncodingInvoker::new(engine, EncodeProfile::default()),
        StatusRecorder::new(videos.clone()),
        ledger.clone(),
    );

    let state = AppState::new(config, Arc::new(orchestrator), ledger.clone(), locks.clone());

    TestApp {
        state,
        videos,
        ledger,
        locks,
        _bucket: bucket,
        _work: work,
    }
}
