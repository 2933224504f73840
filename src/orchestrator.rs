use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::SoraError;
use crate::jobs::{BatchDefaults, JobSpec, build_all};
use crate::openai::{ApiError, CreateVideoRequest, VideoApi, VideoRecord};
use crate::output::ResultWriter;
use crate::retry::RetryPolicy;
use crate::ui::BatchProgress;

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const MAX_CONCURRENCY: usize = 10;

/// Knobs for one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum in-flight create calls.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Stop scheduling new work after the first failed job.
    pub fail_fast: bool,
    /// Print would-be requests instead of calling the API.
    pub dry_run: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            fail_fast: false,
            dry_run: false,
        }
    }
}

impl BatchOptions {
    /// Concurrency and attempts are clamped to `[1, 10]`, with a warning when adjusted.
    pub fn new(concurrency: usize, attempts: u32) -> Self {
        let clamped = concurrency.clamp(1, MAX_CONCURRENCY);
        if clamped != concurrency {
            warn!(requested = concurrency, using = clamped, "concurrency clamped to [1, {MAX_CONCURRENCY}]");
        }
        let retry = RetryPolicy::new(attempts);
        if retry.attempts() != attempts {
            warn!(requested = attempts, using = retry.attempts(), "max attempts clamped");
        }
        Self {
            concurrency: clamped,
            retry,
            ..Default::default()
        }
    }

    pub fn fail_fast(mut self, on: bool) -> Self {
        self.fail_fast = on;
        self
    }

    pub fn dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }
}

/// Failure detail for one job, persisted next to successful records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
    pub attempts: u32,
}

impl ErrorInfo {
    const CANCELED: &'static str = "canceled";

    fn canceled(attempts: u32) -> Self {
        Self {
            kind: Self::CANCELED.into(),
            message: "skipped after an earlier job failed (fail-fast)".into(),
            attempts,
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.kind == Self::CANCELED
    }
}

/// Result of one job's submission: the created record or why there is none.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    /// 1-based position in the batch input.
    pub index: usize,
    pub result: Result<VideoRecord, ErrorInfo>,
    /// Where the outcome was persisted, if it was.
    pub output: Option<PathBuf>,
}

impl SubmissionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_canceled(&self) -> bool {
        matches!(&self.result, Err(info) if info.is_canceled())
    }
}

/// Every job's outcome in input order.
#[derive(Debug)]
pub struct BatchResult {
    pub outcomes: Vec<SubmissionOutcome>,
    pub any_failed: bool,
    /// Index of the job whose failure stopped a fail-fast run.
    pub aborted_by: Option<usize>,
}

impl BatchResult {
    pub fn exit_code(&self) -> u8 {
        u8::from(self.any_failed)
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

#[derive(Debug)]
pub enum BatchRun {
    /// Dry run: one would-be request per job, nothing sent or written.
    Preview(Vec<Value>),
    Submitted(BatchResult),
}

impl BatchRun {
    pub fn exit_code(&self) -> u8 {
        match self {
            BatchRun::Preview(_) => 0,
            BatchRun::Submitted(result) => result.exit_code(),
        }
    }
}

#[derive(Debug)]
pub enum SubmitError {
    /// Fatal error, or the last transient one once attempts ran out.
    Remote { error: ApiError, attempts: u32 },
    Canceled { attempts: u32 },
}

impl SubmitError {
    pub fn attempts(&self) -> u32 {
        match self {
            SubmitError::Remote { attempts, .. } | SubmitError::Canceled { attempts } => *attempts,
        }
    }

    fn to_info(&self) -> ErrorInfo {
        match self {
            SubmitError::Remote { error, attempts } => ErrorInfo {
                kind: error.kind().into(),
                message: error.to_string(),
                attempts: *attempts,
            },
            SubmitError::Canceled { attempts } => ErrorInfo::canceled(*attempts),
        }
    }
}

impl From<SubmitError> for SoraError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Remote { error, .. } => SoraError::Api(error),
            SubmitError::Canceled { .. } => SoraError::Canceled,
        }
    }
}

/// One-shot cancellation shared by all tasks of a batch.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Runs one job's create call under the retry policy.
///
/// Cancellation is checked before each call and during backoff; a call
/// already on the wire is never interrupted.
pub async fn submit<C: VideoApi>(
    api: &C,
    request: &CreateVideoRequest,
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    label: &str,
) -> Result<VideoRecord, SubmitError> {
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(SubmitError::Canceled { attempts: attempt });
        }
        attempt += 1;

        let error = match api.create(request).await {
            Ok(record) => return Ok(record),
            Err(error) => error,
        };
        if !policy.should_retry(&error, attempt) {
            return Err(SubmitError::Remote {
                error,
                attempts: attempt,
            });
        }

        let delay = policy.backoff_delay(&error, attempt);
        warn!(
            job = label,
            attempt,
            attempts = policy.attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "transient failure, retrying"
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(SubmitError::Canceled { attempts: attempt }),
            _ = sleep(delay) => {}
        }
    }
}

/// Validates every payload and returns the would-be request of each job.
/// Nothing touches the network or the output directory.
pub fn dry_run_batch(
    jobs: &[JobSpec],
    defaults: &BatchDefaults,
    writer: &ResultWriter,
) -> Result<BatchRun, SoraError> {
    let requests = build_all(jobs, defaults)?;
    info!(jobs = jobs.len(), "dry run");
    Ok(BatchRun::Preview(preview_batch(jobs, &requests, writer)))
}

// Endpoint, index, result path and request body per job.
fn preview_batch(
    jobs: &[JobSpec],
    requests: &[CreateVideoRequest],
    writer: &ResultWriter,
) -> Vec<Value> {
    jobs.iter()
        .zip(requests)
        .enumerate()
        .map(|(i, (job, request))| {
            let index = i + 1;
            let mut preview = json!({
                "endpoint": "/v1/videos",
                "job": index,
                "output": writer.path_for(index, job).display().to_string(),
            });
            if let (Some(map), Value::Object(body)) = (preview.as_object_mut(), request.preview()) {
                map.extend(body);
            }
            preview
        })
        .collect()
}

// Everything a spawned job task owns.
struct JobContext<C> {
    api: Arc<C>,
    limiter: Arc<Semaphore>,
    cancel: CancelSignal,
    policy: RetryPolicy,
    fail_fast: bool,
    writer: ResultWriter,
    progress: BatchProgress,
    any_failed: Arc<AtomicBool>,
    label: String,
}

/// Fans a batch out to the API under a shared concurrency limit.
pub struct BatchOrchestrator<C> {
    api: Arc<C>,
    writer: ResultWriter,
    options: BatchOptions,
    show_progress: bool,
}

impl<C: VideoApi + 'static> BatchOrchestrator<C> {
    pub fn new(api: Arc<C>, writer: ResultWriter, options: BatchOptions) -> Self {
        Self {
            api,
            writer,
            options,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Validates every payload, then either previews (dry run) or submits all jobs.
    ///
    /// Payload errors abort before any call. Remote errors stay local to
    /// their job unless `fail_fast` is set, in which case unscheduled jobs are
    /// skipped and in-flight calls are awaited.
    pub async fn run_batch(
        &self,
        jobs: &[JobSpec],
        defaults: &BatchDefaults,
    ) -> Result<BatchRun, SoraError> {
        if self.options.dry_run {
            return dry_run_batch(jobs, defaults, &self.writer);
        }
        let requests = build_all(jobs, defaults)?;
        info!(jobs = jobs.len(), concurrency = self.options.concurrency, "submitting batch");

        let total = jobs.len();
        let span = info_span!("batch", run = %Uuid::new_v4(), jobs = total);
        let limiter = Arc::new(Semaphore::new(self.options.concurrency));
        let cancel = CancelSignal::new();
        let any_failed = Arc::new(AtomicBool::new(false));
        let progress = if self.show_progress {
            BatchProgress::start(total as u64)
        } else {
            BatchProgress::hidden()
        };

        let mut tasks = JoinSet::new();
        let mut task_index = HashMap::new();
        for (i, (job, request)) in jobs.iter().zip(requests).enumerate() {
            let index = i + 1;
            let ctx = JobContext {
                api: Arc::clone(&self.api),
                limiter: Arc::clone(&limiter),
                cancel: cancel.clone(),
                policy: self.options.retry,
                fail_fast: self.options.fail_fast,
                writer: self.writer.clone(),
                progress: progress.clone(),
                any_failed: Arc::clone(&any_failed),
                label: format!("[job {index}/{total}]"),
            };
            let handle = tasks.spawn(run_job(ctx, index, job.clone(), request).instrument(span.clone()));
            task_index.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<SubmissionOutcome>> = (0..total).map(|_| None).collect();
        let mut aborted_by = None;
        while let Some(joined) = tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((_, outcome)) => outcome,
                Err(join_err) => {
                    let index = task_index.get(&join_err.id()).copied().unwrap_or_default();
                    error!(job = index, error = %join_err, "job task panicked");
                    any_failed.store(true, Ordering::Relaxed);
                    SubmissionOutcome {
                        index,
                        result: Err(ErrorInfo {
                            kind: "panic".into(),
                            message: join_err.to_string(),
                            attempts: 0,
                        }),
                        output: None,
                    }
                }
            };

            if self.options.fail_fast
                && aborted_by.is_none()
                && !outcome.is_success()
                && !outcome.is_canceled()
            {
                aborted_by = Some(outcome.index);
                cancel.cancel();
            }
            if let Some(slot) = outcome.index.checked_sub(1).and_then(|i| slots.get_mut(i)) {
                *slot = Some(outcome);
            }
        }

        let result = BatchResult {
            outcomes: slots.into_iter().flatten().collect(),
            any_failed: any_failed.load(Ordering::Relaxed),
            aborted_by,
        };
        progress.finish(&result);
        Ok(BatchRun::Submitted(result))
    }
}

async fn acquire<C>(ctx: &JobContext<C>) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => None,
        permit = Arc::clone(&ctx.limiter).acquire_owned() => permit.ok(),
    }
}

async fn run_job<C: VideoApi>(
    ctx: JobContext<C>,
    index: usize,
    job: JobSpec,
    request: CreateVideoRequest,
) -> SubmissionOutcome {
    let permit = acquire(&ctx).await;
    let result = match &permit {
        None => {
            debug!(job = %ctx.label, "skipped");
            Err(ErrorInfo::canceled(0))
        }
        Some(_) => {
            info!(job = %ctx.label, "starting");
            let started = Instant::now();
            let submitted = submit(&*ctx.api, &request, &ctx.policy, &ctx.cancel, &ctx.label).await;
            match submitted {
                Ok(record) => {
                    info!(
                        job = %ctx.label,
                        id = record.id().unwrap_or("?"),
                        elapsed_secs = started.elapsed().as_secs_f64(),
                        "completed"
                    );
                    Ok(record)
                }
                Err(err) => {
                    let info = err.to_info();
                    if !info.is_canceled() {
                        error!(job = %ctx.label, attempts = err.attempts(), "failed: {}", info.message);
                    }
                    Err(info)
                }
            }
        }
    };

    if let Err(info) = &result {
        ctx.any_failed.store(true, Ordering::Relaxed);
        if ctx.fail_fast && !info.is_canceled() {
            ctx.cancel.cancel();
        }
    }
    // Released only after a fail-fast cancel is visible to waiters.
    drop(permit);

    let mut outcome = SubmissionOutcome {
        index,
        result,
        output: None,
    };
    if !outcome.is_canceled() {
        match ctx.writer.write(index, &job, &outcome).await {
            Ok(path) => outcome.output = Some(path),
            Err(err) => {
                error!(job = %ctx.label, error = %err, "failed to write result");
                ctx.any_failed.store(true, Ordering::Relaxed);
            }
        }
    }
    ctx.progress.job_done(&ctx.label, &outcome);
    outcome
}
