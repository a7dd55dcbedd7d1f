//! Pipeline orchestrator.
//!
//! One run walks `Describing -> Deriving (optional) -> Rendering ->
//! Persisting` and ends in a [`BatchResponse`] or a [`PipelineError`]. Every
//! run opens one ledger entry per requested variant before the first model
//! call; on success each entry is closed by the persist step, on failure every
//! entry still open is closed as failed before the error is returned.
//!
//! Budgets: the request budget covers describe, derive and render. When it
//! expires mid-render the fan-out is cancelled and the run continues with the
//! variants already rendered. Persisting has its own budget so an expired
//! request still records its ledger state.

use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::join_all;
use sparkit_core::extract::GuidanceRecord;
use sparkit_core::request::{Asset, GenerationRequest, RenderBackend, Stage, StageResult};
use sparkit_core::sanitize::OutputSanitizer;
use sparkit_core::types::DbId;
use sparkit_providers::{
    FastImageGenerator, ImageGenerator, ImageOptions, ProviderError, TextGenerator, TextOptions,
};
use sparkit_storage::{UploadOutcome, UploadPipeline};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::fanout::{self, FanOutPolicy, FanOutReport};
use crate::ledger::{LedgerOutcome, TaskLedger};
use crate::response::BatchResponse;
use crate::workflow::Workflow;

/// Sampling temperature for the describe stage.
const DESCRIBE_TEMPERATURE: f32 = 0.7;

/// Ledger error for entries whose run was dropped before it finished.
pub const ABANDONED_REASON: &str = "generation was abandoned before it finished";

/// External services the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub text: Arc<dyn TextGenerator>,
    pub image: Arc<dyn ImageGenerator>,
    /// `None` disables the `fast` render backend.
    pub fast: Option<Arc<dyn FastImageGenerator>>,
    pub uploads: UploadPipeline,
    pub ledger: Arc<dyn TaskLedger>,
}

pub struct Orchestrator {
    collaborators: Collaborators,
    workflows: Vec<Workflow>,
    config: PipelineConfig,
    sanitizer: OutputSanitizer,
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        workflows: Vec<Workflow>,
        config: PipelineConfig,
        sanitizer: OutputSanitizer,
    ) -> Self {
        Self {
            collaborators,
            workflows,
            config,
            sanitizer,
        }
    }

    pub fn workflow(&self, kind: &str) -> Option<&Workflow> {
        self.workflows.iter().find(|w| w.kind == kind)
    }

    /// Kinds of every registered workflow.
    pub fn workflow_kinds(&self) -> Vec<&'static str> {
        self.workflows.iter().map(|w| w.kind).collect()
    }

    pub fn ledger(&self) -> &Arc<dyn TaskLedger> {
        &self.collaborators.ledger
    }

    /// Run workflow `kind` for `owner`.
    pub async fn run(
        &self,
        owner: &str,
        kind: &str,
        request: GenerationRequest,
    ) -> Result<BatchResponse, PipelineError> {
        let workflow = self
            .workflow(kind)
            .ok_or_else(|| PipelineError::UnknownWorkflow(kind.to_string()))?;
        self.check_request(workflow, &request)?;

        let variants = request.variant_count;
        let ids = self
            .collaborators
            .ledger
            .open_batch(owner, workflow.kind, &vec![None; variants])
            .await?;

        tracing::info!(
            owner,
            kind = workflow.kind,
            variants,
            backend = request.backend.as_str(),
            "Batch opened",
        );

        // Closes the batch if this future is dropped before it settles, e.g.
        // when the HTTP request times out or the client disconnects.
        let guard = OpenBatchGuard::new(self.collaborators.ledger.clone(), &ids, workflow.kind);

        let result = match self.execute(workflow, &request, &ids).await {
            Ok(response) => Ok(response),
            Err(err) => {
                let reason = self.sanitizer.text(&err.to_string());
                match self.collaborators.ledger.fail_open(&ids, &reason).await {
                    Ok(closed) => {
                        tracing::warn!(kind = workflow.kind, closed, error = %err, "Batch failed");
                    }
                    Err(e) => {
                        tracing::error!(
                            kind = workflow.kind,
                            error = %e,
                            "Failed to close ledger entries after batch failure",
                        );
                    }
                }
                Err(err)
            }
        };
        guard.disarm();
        result
    }

    fn check_request(
        &self,
        workflow: &Workflow,
        request: &GenerationRequest,
    ) -> Result<(), PipelineError> {
        request.validate()?;
        workflow.check_request(request)?;

        if request.variant_count > self.config.max_variants {
            return Err(PipelineError::InvalidRequest(format!(
                "at most {} variants per request",
                self.config.max_variants
            )));
        }
        if request.backend == RenderBackend::Fast && self.collaborators.fast.is_none() {
            return Err(PipelineError::InvalidRequest(
                "fast render backend is not configured".into(),
            ));
        }
        if !self.collaborators.uploads.is_configured() {
            return Err(PipelineError::Internal("no asset store configured".into()));
        }
        Ok(())
    }

    async fn execute(
        &self,
        workflow: &Workflow,
        request: &GenerationRequest,
        ids: &[DbId],
    ) -> Result<BatchResponse, PipelineError> {
        let started = std::time::Instant::now();
        let deadline = Instant::now() + self.config.request_budget;
        let variants = request.variant_count;

        self.collaborators.ledger.mark_processing(ids).await?;

        // Describing
        tracing::debug!(stage = %Stage::Describing, "Stage started");
        let described = self.describe(workflow, request, deadline).await?;
        let extraction = workflow.guidance(described.as_text().unwrap_or_default(), variants);
        if extraction.records.is_empty() {
            return Err(PipelineError::GuidanceUnavailable);
        }
        let records = extraction.records;
        tracing::info!(
            stage = %Stage::Describing,
            strategy = extraction.strategy.unwrap_or("none"),
            records = records.len(),
            requested = variants,
            "Guidance extracted",
        );

        // Deriving
        let mut notes = Vec::new();
        let derived = match &workflow.derive {
            Some(stage) => {
                tracing::debug!(stage = %Stage::Deriving, "Stage started");
                let options = self.image_options(request);
                let call = self.collaborators.image.generate_image(
                    stage.prompt,
                    std::slice::from_ref(&request.primary),
                    &options,
                );
                match within(deadline, Stage::Deriving, call).await {
                    Ok(asset) => Some(StageResult::asset(Stage::Deriving, asset)),
                    Err(err @ PipelineError::TimedOut { .. }) => return Err(err),
                    Err(err) if stage.strict => return Err(err),
                    Err(err) => {
                        tracing::warn!(stage = %Stage::Deriving, error = %err, "Derived asset skipped");
                        notes.push(format!("derived asset: {err}"));
                        None
                    }
                }
            }
            None => None,
        };
        let derived_asset = derived.as_ref().and_then(StageResult::as_asset).cloned();

        // Rendering
        tracing::debug!(stage = %Stage::Rendering, variants = records.len(), "Stage started");
        let inputs = workflow.render_inputs(request, derived_asset.as_ref());

        let prompts: Vec<String> = records
            .iter()
            .map(|record| workflow.render_prompt(record, &request.instruction))
            .collect();
        let rendered = self.render(request, prompts, inputs, deadline).await?;
        if rendered.cancelled {
            tracing::warn!(
                stage = %Stage::Rendering,
                succeeded = rendered.succeeded,
                "Request budget expired, continuing with partial results",
            );
        }

        // Persisting
        tracing::debug!(stage = %Stage::Persisting, "Stage started");
        let persist_deadline = Instant::now() + self.config.persist_budget;
        let (variant_urls, derived_url) = self
            .persist(workflow, variants, rendered, derived_asset, persist_deadline, &mut notes)
            .await;
        self.close_entries(ids, &records, &variant_urls, persist_deadline)
            .await;

        if variant_urls.iter().all(Result::is_err) {
            let errors = variant_urls
                .iter()
                .enumerate()
                .filter_map(|(i, r)| r.as_ref().err().map(|e| format!("variant {}: {e}", i + 1)))
                .collect();
            return Err(PipelineError::NoVariantSucceeded { errors });
        }

        let response =
            BatchResponse::assemble(&self.sanitizer, derived_url, &records, variant_urls, notes);
        tracing::info!(
            kind = workflow.kind,
            requested = response.requested_count,
            succeeded = response.succeeded_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch finished",
        );
        Ok(response)
    }

    async fn describe(
        &self,
        workflow: &Workflow,
        request: &GenerationRequest,
        deadline: Instant,
    ) -> Result<StageResult, PipelineError> {
        let prompt = workflow.describe_prompt(request.variant_count, &request.instruction);
        let options = TextOptions {
            temperature: Some(DESCRIBE_TEMPERATURE),
            max_output_tokens: None,
        };
        let call = self
            .collaborators
            .text
            .generate_text(&prompt, Some(&request.primary), &options);
        let text = within(deadline, Stage::Describing, call).await?;
        Ok(StageResult::text(Stage::Describing, text))
    }

    /// Render one asset per prompt. Prompt `i` drives variant `i`.
    async fn render(
        &self,
        request: &GenerationRequest,
        prompts: Vec<String>,
        inputs: Vec<Asset>,
        deadline: Instant,
    ) -> Result<FanOutReport<Asset>, PipelineError> {
        let cancel = CancellationToken::new();
        let _timer = DeadlineTimer::start(deadline, cancel.clone());

        let outcome = match request.backend {
            RenderBackend::Quality => {
                let image = self.collaborators.image.clone();
                let inputs = Arc::new(inputs);
                let options = self.image_options(request);
                let worker = move |index: usize, prompt: String| {
                    let image = image.clone();
                    let inputs = inputs.clone();
                    let options = options.clone();
                    async move {
                        let started = std::time::Instant::now();
                        let result = image.generate_image(&prompt, &inputs, &options).await;
                        log_render(index, started, &result);
                        result
                    }
                };
                fanout::run(prompts, worker, FanOutPolicy::Parallel, &cancel).await
            }
            RenderBackend::Fast => {
                let Some(fast) = self.collaborators.fast.clone() else {
                    return Err(PipelineError::InvalidRequest(
                        "fast render backend is not configured".into(),
                    ));
                };
                // The fast backend takes a single image: the first render input.
                let Some(subject) = inputs.into_iter().next() else {
                    return Err(PipelineError::InvalidRequest("no image to render from".into()));
                };
                let seed_base = seed_base();
                let worker = move |index: usize, prompt: String| {
                    let fast = fast.clone();
                    let subject = subject.clone();
                    async move {
                        let started = std::time::Instant::now();
                        let seed = seed_base.wrapping_add(index as u64);
                        let result = fast.generate_fast(&subject, &prompt, seed).await;
                        log_render(index, started, &result);
                        result
                    }
                };
                let policy = FanOutPolicy::Serial {
                    delay: self.config.serial_delay,
                };
                fanout::run(prompts, worker, policy, &cancel).await
            }
        };

        outcome.map_err(|failure| {
            if failure.cancelled {
                return PipelineError::TimedOut {
                    stage: Stage::Rendering,
                };
            }
            PipelineError::NoVariantSucceeded {
                errors: failure
                    .errors
                    .into_iter()
                    .map(|(i, e)| format!("variant {}: {e}", i + 1))
                    .collect(),
            }
        })
    }

    /// Upload every rendered variant and the derived asset.
    ///
    /// Returns one URL or failure reason per requested variant, in variant
    /// order, plus the derived asset URL.
    async fn persist(
        &self,
        workflow: &Workflow,
        variants: usize,
        rendered: FanOutReport<Asset>,
        derived: Option<Asset>,
        deadline: Instant,
        notes: &mut Vec<String>,
    ) -> (Vec<Result<String, String>>, Option<String>) {
        let mut outcomes: Vec<Result<String, String>> = (0..variants)
            .map(|_| Err("no guidance record for this variant".to_string()))
            .collect();

        let mut jobs = Vec::new();
        for task in rendered.tasks {
            let reason = task.failure_reason();
            match task.output {
                Some(asset) => jobs.push((task.index, asset)),
                None => outcomes[task.index] = Err(reason.unwrap_or_else(|| "render failed".into())),
            }
        }
        let job_indices: Vec<usize> = jobs.iter().map(|(index, _)| *index).collect();

        let cancel = CancellationToken::new();
        let _timer = DeadlineTimer::start(deadline, cancel.clone());

        let kind = workflow.kind;
        let uploads = self.collaborators.uploads.clone();
        let worker = move |_: usize, (index, asset): (usize, Asset)| {
            let uploads = uploads.clone();
            async move {
                let label = format!("{kind}-{}", index + 1);
                match uploads.upload(&asset.bytes, &asset.media_type, &label).await {
                    UploadOutcome::Stored { url, store } => {
                        tracing::debug!(variant = index + 1, ?store, "Variant stored");
                        Ok(url)
                    }
                    UploadOutcome::Failed { reason } => Err(reason),
                }
            }
        };

        let derived_upload = async {
            match derived {
                Some(asset) => {
                    let label = format!("{kind}-derived");
                    let upload = self
                        .collaborators
                        .uploads
                        .upload(&asset.bytes, &asset.media_type, &label);
                    Some(tokio::time::timeout_at(deadline, upload).await)
                }
                None => None,
            }
        };

        let job_count = jobs.len();
        let (uploaded, derived_outcome) = tokio::join!(
            fanout::run(jobs, worker, FanOutPolicy::Parallel, &cancel),
            derived_upload,
        );

        let uploaded = fanout::into_results(uploaded, job_count);
        for (index, result) in job_indices.into_iter().zip(uploaded) {
            outcomes[index] = result.and_then(|url| {
                self.sanitizer
                    .url(&url)
                    .map_err(|e| format!("upload returned an unusable URL: {e}"))
            });
        }

        let derived_url = match derived_outcome {
            None => None,
            Some(Ok(UploadOutcome::Stored { url, .. })) => Some(url),
            Some(Ok(UploadOutcome::Failed { reason })) => {
                notes.push(format!("derived asset: {reason}"));
                None
            }
            Some(Err(_)) => {
                notes.push("derived asset: upload did not finish before the deadline".into());
                None
            }
        };

        (outcomes, derived_url)
    }

    /// Close every ledger entry of the batch, concurrently and index-aligned.
    async fn close_entries(
        &self,
        ids: &[DbId],
        records: &[GuidanceRecord],
        outcomes: &[Result<String, String>],
        deadline: Instant,
    ) {
        let ledger = &self.collaborators.ledger;
        let closes = ids.iter().zip(outcomes).enumerate().map(|(index, (&id, outcome))| {
            let outcome = match outcome {
                Ok(url) => LedgerOutcome::Completed {
                    output_url: url.clone(),
                    description: records.get(index).map(|r| self.sanitizer.text(&r.summary())),
                },
                Err(reason) => LedgerOutcome::Failed {
                    error: self.sanitizer.text(reason),
                },
            };
            async move { (id, ledger.close_entry(id, &outcome).await) }
        });

        match tokio::time::timeout_at(deadline, join_all(closes)).await {
            Ok(results) => {
                for (id, result) in results {
                    match result {
                        Ok(true) => {}
                        Ok(false) => tracing::debug!(id, "Ledger entry was already closed"),
                        Err(e) => tracing::warn!(id, error = %e, "Failed to close ledger entry"),
                    }
                }
            }
            Err(_) => tracing::warn!(entries = ids.len(), "Ledger close did not finish in budget"),
        }
    }

    fn image_options(&self, request: &GenerationRequest) -> ImageOptions {
        ImageOptions {
            aspect_ratio: request.aspect_ratio.clone(),
            resolution: self.config.resolution.clone(),
        }
    }
}

/// Await a collaborator call against the request deadline.
async fn within<T>(
    deadline: Instant,
    stage: Stage,
    call: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, PipelineError> {
    match tokio::time::timeout_at(deadline, call).await {
        Ok(result) => result.map_err(|e| PipelineError::from_provider(stage, e)),
        Err(_) => Err(PipelineError::TimedOut { stage }),
    }
}

fn log_render(index: usize, started: std::time::Instant, result: &Result<Asset, ProviderError>) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(asset) => tracing::debug!(variant = index + 1, elapsed_ms, bytes = asset.len(), "Variant rendered"),
        Err(e) => tracing::warn!(variant = index + 1, elapsed_ms, error = %e, "Variant render failed"),
    }
}

/// Per-request seed base for the fast backend.
fn seed_base() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Fails the still-open ledger entries of a batch when dropped armed.
///
/// `run` disarms it once the batch has settled. Dropping the run future
/// earlier leaves nothing else to close the entries, so the guard hands
/// `fail_open` to the runtime.
struct OpenBatchGuard {
    ledger: Arc<dyn TaskLedger>,
    ids: Vec<DbId>,
    kind: &'static str,
    armed: bool,
}

impl OpenBatchGuard {
    fn new(ledger: Arc<dyn TaskLedger>, ids: &[DbId], kind: &'static str) -> Self {
        Self {
            ledger,
            ids: ids.to_vec(),
            kind,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for OpenBatchGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(kind = self.kind, "No runtime to close abandoned ledger entries");
            return;
        };

        let ledger = self.ledger.clone();
        let ids = std::mem::take(&mut self.ids);
        let kind = self.kind;
        runtime.spawn(async move {
            match ledger.fail_open(&ids, ABANDONED_REASON).await {
                Ok(closed) => tracing::warn!(kind, closed, "Abandoned batch closed"),
                Err(e) => tracing::error!(
                    kind,
                    error = %e,
                    "Failed to close ledger entries of an abandoned batch",
                ),
            }
        });
    }
}

/// Cancels a token at a deadline; stops when dropped.
struct DeadlineTimer(JoinHandle<()>);

impl DeadlineTimer {
    fn start(deadline: Instant, token: CancellationToken) -> Self {
        Self(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            token.cancel();
        }))
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}
