//! In-memory collaborators for orchestrator tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sparkit_core::request::{Asset, GenerationRequest, RenderBackend};
use sparkit_core::sanitize::OutputSanitizer;
use sparkit_core::types::DbId;
use sparkit_db::models::generation_task::GenerationTask;
use sparkit_db::models::status::{TaskStatus, ACTIVE_TASK_STATUSES, OPEN_TASK_STATUSES};
use sparkit_pipeline::ledger::{LedgerError, LedgerOutcome, TaskLedger};
use sparkit_pipeline::orchestrator::{Collaborators, Orchestrator};
use sparkit_pipeline::{PipelineConfig, Workflow};
use sparkit_providers::{
    FastImageGenerator, ImageGenerator, ImageOptions, ProviderError, TextGenerator, TextOptions,
};
use sparkit_storage::{CredentialCache, FallbackStore, StorageError, UploadPipeline};

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// What a fake generator does for one call.
#[derive(Debug, Clone)]
pub enum Behaviour {
    Succeed,
    Fail(&'static str),
    Block,
    Hang,
}

impl Behaviour {
    async fn apply<T>(self, value: T) -> Result<T, ProviderError> {
        match self {
            Self::Succeed => Ok(value),
            Self::Fail(msg) => Err(ProviderError::Api {
                status: 500,
                body: msg.to_string(),
            }),
            Self::Block => Err(ProviderError::ContentBlocked {
                reason: "SAFETY".into(),
            }),
            Self::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(value)
            }
        }
    }
}

type Script = Box<dyn Fn(&str) -> Behaviour + Send + Sync>;

/// Text generator returning a fixed description.
pub struct FakeText {
    pub text: String,
    pub behaviour: Behaviour,
    pub calls: AtomicUsize,
}

impl FakeText {
    pub fn new(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            text: text.into(),
            behaviour: Behaviour::Succeed,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            text: String::new(),
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextGenerator for FakeText {
    async fn generate_text(
        &self,
        _prompt: &str,
        _image: Option<&Asset>,
        _options: &TextOptions,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.behaviour.clone().apply(self.text.clone()).await
    }
}

/// Image generator whose behaviour is chosen from the prompt.
pub struct FakeImage {
    script: Script,
    pub prompts: Mutex<Vec<String>>,
    pub input_counts: Mutex<Vec<usize>>,
}

impl FakeImage {
    pub fn new(script: impl Fn(&str) -> Behaviour + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            prompts: Mutex::new(Vec::new()),
            input_counts: Mutex::new(Vec::new()),
        })
    }

    pub fn always_ok() -> Arc<Self> {
        Self::new(|_| Behaviour::Succeed)
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageGenerator for FakeImage {
    async fn generate_image(
        &self,
        prompt: &str,
        images: &[Asset],
        _options: &ImageOptions,
    ) -> Result<Asset, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.input_counts.lock().unwrap().push(images.len());
        let behaviour = (self.script)(prompt);
        behaviour.apply(png()).await
    }
}

/// Fast backend recording seeds and the peak number of concurrent calls.
#[derive(Default)]
pub struct FakeFast {
    pub seeds: Mutex<Vec<u64>>,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

#[async_trait]
impl FastImageGenerator for FakeFast {
    async fn generate_fast(
        &self,
        _image: &Asset,
        _prompt: &str,
        seed: u64,
    ) -> Result<Asset, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.seeds.lock().unwrap().push(seed);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(png())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Fallback-only store keeping uploaded filenames.
#[derive(Default)]
pub struct MemoryStore {
    pub filenames: Mutex<Vec<String>>,
    /// Filenames containing this fragment fail.
    pub fail_on: Option<&'static str>,
}

#[async_trait]
impl FallbackStore for MemoryStore {
    async fn upload(
        &self,
        _bytes: &[u8],
        _media_type: &str,
        filename: &str,
    ) -> Result<String, StorageError> {
        if self.fail_on.is_some_and(|f| filename.contains(f)) {
            return Err(StorageError::S3("bucket unavailable".into()));
        }
        self.filenames.lock().unwrap().push(filename.to_string());
        Ok(format!("https://assets.test/{filename}"))
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Ledger with the same transition rules as the PostgreSQL one.
#[derive(Default)]
pub struct MemoryLedger {
    rows: Mutex<Vec<GenerationTask>>,
    next_id: AtomicI64,
}

impl MemoryLedger {
    pub fn rows(&self) -> Vec<GenerationTask> {
        self.rows.lock().unwrap().clone()
    }

    pub fn count_status(&self, status: TaskStatus) -> usize {
        self.rows()
            .iter()
            .filter(|r| r.status_id == status.id())
            .count()
    }
}

#[async_trait]
impl TaskLedger for MemoryLedger {
    async fn open_batch(
        &self,
        owner: &str,
        kind: &str,
        descriptions: &[Option<String>],
    ) -> Result<Vec<DbId>, LedgerError> {
        self.cleanup_stale(owner, kind).await?;
        let now = chrono::Utc::now();
        let mut rows = self.rows.lock().unwrap();
        let mut ids = Vec::with_capacity(descriptions.len());
        for description in descriptions {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            rows.push(GenerationTask {
                id,
                owner_key: owner.to_string(),
                task_kind: kind.to_string(),
                description: description.clone(),
                status_id: TaskStatus::Pending.id(),
                output_url: None,
                error_message: None,
                created_at: now,
                updated_at: now,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn mark_processing(&self, ids: &[DbId]) -> Result<u64, LedgerError> {
        let mut rows = self.rows.lock().unwrap();
        let mut changed = 0;
        for row in rows.iter_mut().filter(|r| ids.contains(&r.id)) {
            if row.status_id == TaskStatus::Pending.id() {
                row.status_id = TaskStatus::Processing.id();
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn close_entry(&self, id: DbId, outcome: &LedgerOutcome) -> Result<bool, LedgerError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows
            .iter_mut()
            .find(|r| r.id == id && OPEN_TASK_STATUSES.contains(&r.status_id))
        else {
            return Ok(false);
        };
        match outcome {
            LedgerOutcome::Completed {
                output_url,
                description,
            } => {
                row.status_id = TaskStatus::Completed.id();
                row.output_url = Some(output_url.clone());
                if description.is_some() {
                    row.description = description.clone();
                }
            }
            LedgerOutcome::Failed { error } => {
                row.status_id = TaskStatus::Failed.id();
                row.error_message = Some(error.clone());
            }
        }
        Ok(true)
    }

    async fn cleanup_stale(&self, owner: &str, kind: &str) -> Result<u64, LedgerError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| {
            let stale = ACTIVE_TASK_STATUSES.contains(&r.status_id)
                || (r.status_id == TaskStatus::Completed.id() && r.output_url.is_none());
            !(r.owner_key == owner && r.task_kind == kind && stale)
        });
        Ok((before - rows.len()) as u64)
    }

    async fn fail_open(&self, ids: &[DbId], reason: &str) -> Result<u64, LedgerError> {
        let mut rows = self.rows.lock().unwrap();
        let mut closed = 0;
        for row in rows.iter_mut().filter(|r| ids.contains(&r.id)) {
            if OPEN_TASK_STATUSES.contains(&row.status_id) {
                row.status_id = TaskStatus::Failed.id();
                row.error_message = Some(reason.to_string());
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn list_active(
        &self,
        owner: &str,
        kind: Option<&str>,
    ) -> Result<Vec<GenerationTask>, LedgerError> {
        let mut rows: Vec<_> = self
            .rows()
            .into_iter()
            .filter(|r| r.owner_key == owner && ACTIVE_TASK_STATUSES.contains(&r.status_id))
            .filter(|r| kind.map_or(true, |k| k == r.task_kind))
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(rows)
    }

    async fn list_by_ids(&self, ids: &[DbId]) -> Result<Vec<GenerationTask>, LedgerError> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|r| ids.contains(&r.id))
            .collect())
    }

    async fn remove(&self, id: DbId, owner: &str) -> Result<bool, LedgerError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.id == id && r.owner_key == owner));
        Ok(rows.len() < before)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub const OWNER: &str = "owner-1";

pub fn png() -> Asset {
    Asset::new(vec![0x89, b'P', b'N', b'G'], "image/png")
}

pub fn request(variant_count: usize, backend: RenderBackend) -> GenerationRequest {
    GenerationRequest {
        primary: png(),
        auxiliary: vec![],
        instruction: "keep it natural".into(),
        variant_count,
        aspect_ratio: Some("3:4".into()),
        backend,
    }
}

/// A well-formed pose description with `count` numbered variants.
pub fn pose_text(count: usize) -> String {
    (1..=count)
        .map(|i| {
            format!(
                "- Pose{i}: leaning against the wall, take number {i}\n\
                 - Camera Position{i}: eye level shot\n\
                 - Composition{i}: rule of thirds framing\n"
            )
        })
        .collect()
}

/// A well-formed snapshot description with `count` numbered variants.
pub fn snapshot_text(count: usize) -> String {
    (1..=count)
        .map(|i| {
            format!(
                "- {{{{background{i}}}}}: a quiet street in Lisbon, scene {i}\n\
                 - {{{{scene{i}}}}}: walking past a cafe\n\
                 - {{{{lighting and vibe{i}}}}}: golden hour glow\n\
                 - {{{{pose and expression{i}}}}}: mid-stride, laughing softly\n\
                 - {{{{Composition{i}}}}}: full body, centered\n\
                 - {{{{camera position{i}}}}}: low angle from the curb\n"
            )
        })
        .collect()
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        request_budget: Duration::from_secs(10),
        persist_budget: Duration::from_secs(10),
        serial_delay: Duration::from_millis(1),
        ..PipelineConfig::default()
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub ledger: Arc<MemoryLedger>,
    pub store: Arc<MemoryStore>,
}

pub fn harness(
    text: Arc<FakeText>,
    image: Arc<FakeImage>,
    fast: Option<Arc<FakeFast>>,
    store: MemoryStore,
    config: PipelineConfig,
) -> Harness {
    let ledger = Arc::new(MemoryLedger::default());
    let store = Arc::new(store);
    let uploads = UploadPipeline::new(
        None,
        Some(store.clone() as Arc<dyn FallbackStore>),
        Arc::new(CredentialCache::new()),
    );

    let collaborators = Collaborators {
        text,
        image,
        fast: fast.map(|f| f as Arc<dyn FastImageGenerator>),
        uploads,
        ledger: ledger.clone(),
    };
    let orchestrator = Orchestrator::new(
        collaborators,
        Workflow::builtin().unwrap(),
        config,
        OutputSanitizer::default(),
    );

    Harness {
        orchestrator,
        ledger,
        store,
    }
}
