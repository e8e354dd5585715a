// src/coordinator.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Concurrent multipart upload engine.
//!
//! Flow:
//! - `plan()` partitions the source into parts and allocates progress counters.
//! - `run()` initiates the session, then drains a shared part queue with a
//!   bounded pool of workers, each driving a `RetryingPartUploader`.
//! - When every part is stored, results are sorted by part number and the
//!   session is completed.
//! - When some parts failed, the `PartialFailureHandler` decides: retry only
//!   the failed parts, or abort the session.
//! - A raised `CancellationToken` closes in-flight transfers, waits for the
//!   workers, and aborts the session.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationToken;
use crate::config::UploadConfig;
use crate::error::{PartError, UploadError, UploadResult};
use crate::planner::{self, Part, UploadPlan};
use crate::presigned::{PartTransport, PresignedPutClient};
use crate::progress::{ProgressAggregator, ProgressSnapshot};
use crate::retry::{RetryingPartUploader, SessionTarget};
use crate::source::UploadSource;
use crate::store::{MultipartStore, PartResult};

/// Lifecycle of a multipart upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Planning,
    Initiated,
    PartsInFlight,
    AllSucceeded,
    PartialFailure,
    Retrying,
    Completing,
    Aborting,
    Terminated,
}

/// Answer to a partial failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry,
    Abort,
}

/// What the caller is shown when a round ends with parts missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFailureReport {
    pub completed: usize,
    pub total: usize,
    pub failed: usize,
    /// Part numbers that will be re-queued on `Retry`, ascending.
    pub failed_parts: Vec<u32>,
    /// Last error seen for each part that exhausted its retries.
    pub errors: Vec<(u32, PartError)>,
}

/// Decision port called when a round ends with failed parts. Invoked once per
/// failed round, from a blocking thread, so implementations may prompt a user.
pub trait PartialFailureHandler: Send + Sync {
    fn on_partial_failure(&self, report: &PartialFailureReport) -> Decision;
}

impl<F> PartialFailureHandler for F
where
    F: Fn(&PartialFailureReport) -> Decision + Send + Sync,
{
    fn on_partial_failure(&self, report: &PartialFailureReport) -> Decision {
        self(report)
    }
}

/// Always answers with the same decision.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub Decision);

impl PartialFailureHandler for FixedDecision {
    fn on_partial_failure(&self, _report: &PartialFailureReport) -> Decision {
        self.0
    }
}

/// Retries without asking for up to `rounds` failed rounds, then aborts.
#[derive(Debug)]
pub struct BoundedRetry {
    remaining: AtomicU32,
}

impl BoundedRetry {
    pub fn new(rounds: u32) -> Self {
        Self {
            remaining: AtomicU32::new(rounds),
        }
    }
}

impl PartialFailureHandler for BoundedRetry {
    fn on_partial_failure(&self, _report: &PartialFailureReport) -> Decision {
        let took = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if took.is_ok() {
            Decision::Retry
        } else {
            Decision::Abort
        }
    }
}

/// Result info for a finished upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub bucket: String,
    pub key: String,
    /// `None` for single-shot uploads.
    pub upload_id: Option<String>,
    pub e_tag: Option<String>,
    pub total_bytes: u64,
    pub parts: usize,
    pub retry_rounds: u32,
    pub started_at: SystemTime,
    pub completed_at: SystemTime,
}

/// A planned, not yet initiated, multipart upload.
pub struct PlannedUpload {
    pub bucket: String,
    pub key: String,
    pub plan: UploadPlan,
    source: Arc<dyn UploadSource>,
    progress: Arc<ProgressAggregator>,
}

impl PlannedUpload {
    /// Shared progress counters; poll `snapshot()` on any cadence.
    pub fn progress(&self) -> Arc<ProgressAggregator> {
        Arc::clone(&self.progress)
    }
}

impl std::fmt::Debug for PlannedUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedUpload")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("parts", &self.plan.part_count())
            .field("progress", &self.progress.snapshot())
            .finish()
    }
}

/// Mutable state of an initiated session, owned by the coordinator.
struct UploadSession {
    target: Arc<SessionTarget>,
    plan: UploadPlan,
    completed: HashMap<u32, PartResult>,
    pending: VecDeque<Part>,
    retry_rounds: u32,
}

/// State shared by the workers of one round.
#[derive(Default)]
struct RoundState {
    queue: Mutex<VecDeque<Part>>,
    completed: Mutex<Vec<PartResult>>,
    failures: Mutex<Vec<(u32, PartError)>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns the worker pool and the finalize/abort decision for one upload.
pub struct UploadCoordinator {
    store: Arc<dyn MultipartStore>,
    transport: Arc<dyn PartTransport>,
    config: UploadConfig,
    handler: Arc<dyn PartialFailureHandler>,
    cancel: CancellationToken,
    state: watch::Sender<UploadState>,
}

impl UploadCoordinator {
    pub fn new(
        store: Arc<dyn MultipartStore>,
        transport: Arc<dyn PartTransport>,
        config: UploadConfig,
        handler: Arc<dyn PartialFailureHandler>,
    ) -> Self {
        let (state, _) = watch::channel(UploadState::Planning);
        Self {
            store,
            transport,
            config,
            handler,
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// Use an externally owned token, e.g. one wired to Ctrl-C.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Watch the state machine from another task.
    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> UploadState {
        *self.state.borrow()
    }

    fn set_state(&self, next: UploadState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!("Upload state {:?} -> {:?}", prev, next);
        }
    }

    /// Partition `source` into parts. No store call is made.
    pub fn plan(
        &self,
        source: Arc<dyn UploadSource>,
        bucket: &str,
        key: &str,
    ) -> UploadResult<PlannedUpload> {
        self.set_state(UploadState::Planning);
        let plan = planner::plan(source.size(), self.config.part_size).inspect_err(|_| {
            self.set_state(UploadState::Terminated);
        })?;
        let progress = Arc::new(ProgressAggregator::new(plan.part_count(), plan.file_size));
        debug!(
            "Planned {} parts of {} bytes for s3://{}/{}",
            plan.part_count(),
            plan.part_size,
            bucket,
            key
        );
        Ok(PlannedUpload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            plan,
            source,
            progress,
        })
    }

    /// Initiate, upload every part, and complete or abort the session.
    pub async fn run(&self, planned: PlannedUpload) -> UploadResult<UploadOutcome> {
        let started_at = SystemTime::now();
        let PlannedUpload {
            bucket,
            key,
            plan,
            source,
            progress,
        } = planned;

        if self.cancel.is_cancelled() {
            self.set_state(UploadState::Terminated);
            return Err(UploadError::UploadCancelled);
        }

        let upload_id = match self
            .store
            .initiate_multipart_upload(&bucket, &key, self.config.content_type.as_deref())
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.set_state(UploadState::Terminated);
                return Err(UploadError::InitiateFailed(format!("{:#}", e)));
            }
        };
        self.set_state(UploadState::Initiated);
        info!(
            "Initiated multipart upload {} for s3://{}/{} ({} parts)",
            upload_id,
            bucket,
            key,
            plan.part_count()
        );

        let target = Arc::new(SessionTarget {
            bucket,
            key,
            upload_id,
        });
        let uploader = RetryingPartUploader::new(
            PresignedPutClient::new(
                Arc::clone(&self.store),
                Arc::clone(&self.transport),
                self.cancel.clone(),
            ),
            source,
            Arc::clone(&progress),
            self.cancel.clone(),
            Arc::clone(&target),
            self.config.presign_ttl,
            self.config.retry_base_delay,
        );

        let mut session = UploadSession {
            target,
            pending: plan.parts.iter().copied().collect(),
            plan,
            completed: HashMap::new(),
            retry_rounds: 0,
        };

        loop {
            self.set_state(UploadState::PartsInFlight);
            let pending = std::mem::take(&mut session.pending);
            let (completed, failures) = self.run_round(&uploader, pending).await;

            if self.cancel.is_cancelled() {
                warn!(
                    "Upload {} cancelled with {}/{} parts stored",
                    session.target.upload_id,
                    session.completed.len(),
                    session.plan.part_count()
                );
                self.abort_session(&session.target).await;
                return Err(UploadError::UploadCancelled);
            }

            for result in completed {
                session.completed.insert(result.part_number, result);
            }

            let total = session.plan.part_count();
            if session.completed.len() == total {
                self.set_state(UploadState::AllSucceeded);
                return self.complete_session(session, &progress, started_at).await;
            }

            let failed_parts: Vec<Part> = session
                .plan
                .parts
                .iter()
                .filter(|p| !session.completed.contains_key(&p.part_number))
                .copied()
                .collect();
            let mut errors = failures;
            errors.sort_by_key(|(n, _)| *n);
            let report = PartialFailureReport {
                completed: session.completed.len(),
                total,
                failed: failed_parts.len(),
                failed_parts: failed_parts.iter().map(|p| p.part_number).collect(),
                errors,
            };
            self.set_state(UploadState::PartialFailure);
            warn!(
                "Upload {}: {}/{} parts stored, {} failed",
                session.target.upload_id, report.completed, report.total, report.failed
            );

            let decision = tokio::select! {
                _ = self.cancel.cancelled() => None,
                d = self.decide(report.clone()) => Some(d),
            };

            match decision {
                None => {
                    self.abort_session(&session.target).await;
                    return Err(UploadError::UploadCancelled);
                }
                Some(_) if self.cancel.is_cancelled() => {
                    self.abort_session(&session.target).await;
                    return Err(UploadError::UploadCancelled);
                }
                Some(Decision::Retry) => {
                    self.set_state(UploadState::Retrying);
                    session.retry_rounds += 1;
                    info!(
                        "Retrying {} failed parts of upload {} (round {})",
                        failed_parts.len(),
                        session.target.upload_id,
                        session.retry_rounds
                    );
                    for part in &failed_parts {
                        progress.reset_part(part.part_number);
                    }
                    session.pending = failed_parts.into_iter().collect();
                }
                Some(Decision::Abort) => {
                    self.abort_session(&session.target).await;
                    return Err(UploadError::UploadAborted {
                        completed: report.completed,
                        total: report.total,
                        failed: report.failed,
                    });
                }
            }
        }
    }

    /// Drain `pending` with `min(concurrency, pending.len())` workers.
    async fn run_round(
        &self,
        uploader: &RetryingPartUploader,
        pending: VecDeque<Part>,
    ) -> (Vec<PartResult>, Vec<(u32, PartError)>) {
        let workers = self.config.concurrency.max(1).min(pending.len());
        let shared = Arc::new(RoundState {
            queue: Mutex::new(pending),
            ..Default::default()
        });

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let shared = Arc::clone(&shared);
            let uploader = uploader.clone();
            let cancel = self.cancel.clone();
            let max_retries = self.config.max_retries;
            set.spawn(async move {
                worker_loop(worker_id, shared, uploader, cancel, max_retries).await
            });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!("Upload worker terminated abnormally: {}", e);
            }
        }

        let completed = std::mem::take(&mut *lock(&shared.completed));
        let failures = std::mem::take(&mut *lock(&shared.failures));
        (completed, failures)
    }

    async fn decide(&self, report: PartialFailureReport) -> Decision {
        let handler = Arc::clone(&self.handler);
        match tokio::task::spawn_blocking(move || handler.on_partial_failure(&report)).await {
            Ok(decision) => decision,
            Err(e) => {
                error!("Partial-failure handler failed, aborting: {}", e);
                Decision::Abort
            }
        }
    }

    async fn complete_session(
        &self,
        session: UploadSession,
        progress: &ProgressAggregator,
        started_at: SystemTime,
    ) -> UploadResult<UploadOutcome> {
        self.set_state(UploadState::Completing);
        let UploadSession {
            target,
            plan,
            completed,
            retry_rounds,
            ..
        } = session;

        // CompleteMultipartUpload requires ascending part numbers.
        let mut parts: Vec<PartResult> = completed.into_values().collect();
        parts.sort_by_key(|p| p.part_number);

        let result = self
            .store
            .complete_multipart_upload(&target.bucket, &target.key, &target.upload_id, &parts)
            .await;
        self.set_state(UploadState::Terminated);

        match result {
            Ok(e_tag) => {
                let ProgressSnapshot {
                    transferred_bytes, ..
                } = progress.snapshot();
                info!(
                    "Completed multipart upload {} for s3://{}/{}: {} parts, {} bytes",
                    target.upload_id,
                    target.bucket,
                    target.key,
                    parts.len(),
                    transferred_bytes
                );
                Ok(UploadOutcome {
                    bucket: target.bucket.clone(),
                    key: target.key.clone(),
                    upload_id: Some(target.upload_id.clone()),
                    e_tag,
                    total_bytes: plan.file_size,
                    parts: parts.len(),
                    retry_rounds,
                    started_at,
                    completed_at: SystemTime::now(),
                })
            }
            Err(e) => {
                error!(
                    "CompleteMultipartUpload for {} failed: {:#}",
                    target.upload_id, e
                );
                Err(UploadError::CompletionFailed {
                    upload_id: target.upload_id.clone(),
                    reason: format!("{:#}", e),
                })
            }
        }
    }

    /// Best effort: a failed abort is logged, never raised.
    async fn abort_session(&self, target: &SessionTarget) {
        self.set_state(UploadState::Aborting);
        match self
            .store
            .abort_multipart_upload(&target.bucket, &target.key, &target.upload_id)
            .await
        {
            Ok(()) => info!("Aborted multipart upload {}", target.upload_id),
            Err(e) => warn!(
                "AbortMultipartUpload for {} failed (ignored): {:#}",
                target.upload_id, e
            ),
        }
        self.set_state(UploadState::Terminated);
    }
}

async fn worker_loop(
    worker_id: usize,
    shared: Arc<RoundState>,
    uploader: RetryingPartUploader,
    cancel: CancellationToken,
    max_retries: u32,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let Some(part) = lock(&shared.queue).pop_front() else {
            break;
        };

        match uploader.upload(part, max_retries).await {
            Ok(result) => {
                let mut done = lock(&shared.completed);
                if cancel.is_cancelled() {
                    break;
                }
                done.push(result);
            }
            Err(PartError::Cancelled) => break,
            Err(e) => {
                error!("Worker {}: part {} gave up: {}", worker_id, part.part_number, e);
                lock(&shared.failures).push((part.part_number, e));
                // Stop pulling; remaining workers keep draining the queue.
                break;
            }
        }
    }
    debug!("Worker {} exiting", worker_id);
}
