// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Acquisition Orchestrator.
//!
//! Drives one job through the state machine
//! `Queued -> Attempting -> {Succeeded | Retrying | Failed}`, trying
//! strategies strictly in catalog order. This is the only place where
//! phase transitions are decided.
//!
//! Guarantees per job:
//! - exactly one terminal notification (`ready` or `failed`)
//! - the job's temporary directory is gone once `run` returns, including
//!   after timeout and cancellation
//! - each attempt writes into a fresh subdirectory, removed before the next
//!   attempt starts, so at most one local artifact exists at a time
//! - the interim `downloading` notification runs beside the first attempt
//!   and is joined before the terminal one is sent
//! - notification outcomes never change the job's phase

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::delivery::DeliveryPipeline;
use crate::error::{truncate_message, AcquireError, ErrorClass, ExtractionError};
use crate::events::{now_timestamp, EventBus, PipelineEvent};
use crate::extractor::{AttemptSpec, Extractor};
use crate::job::{Artifact, Job, JobError, JobOutput, JobPhase, JobRequest, MediaMetadata};
use crate::locator;
use crate::notifier::{NotificationEvent, Notifier};
use crate::strategy::StrategyCatalog;

/// Final state of a job as returned to the caller.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: Job,
    /// Truncated final error when the job failed.
    pub error: Option<String>,
    /// Whether the receiver acknowledged the terminal notification.
    pub terminal_notified: bool,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.job.phase == JobPhase::Succeeded
    }
}

pub struct Orchestrator {
    config: PipelineConfig,
    catalog: Arc<StrategyCatalog>,
    extractor: Arc<dyn Extractor>,
    delivery: DeliveryPipeline,
    notifier: Arc<dyn Notifier>,
    events: EventBus,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        catalog: Arc<StrategyCatalog>,
        extractor: Arc<dyn Extractor>,
        delivery: DeliveryPipeline,
        notifier: Arc<dyn Notifier>,
        events: EventBus,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            config,
            catalog,
            extractor,
            delivery,
            notifier,
            events,
            permits,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Jobs currently holding a worker slot.
    pub fn active_jobs(&self) -> usize {
        self.config.max_concurrent_jobs.max(1) - self.permits.available_permits()
    }

    /// Cancel every queued and running job. Each still reaches `Failed`
    /// and sends its terminal notification.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run a job on its own task.
    pub fn submit(self: &Arc<Self>, request: JobRequest, cancel: CancellationToken) -> JoinHandle<JobReport> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(request, cancel).await })
    }

    /// Run a job to a terminal phase. Waits for a worker slot first; the job
    /// timeout only starts counting once the slot is held.
    pub async fn run(&self, request: JobRequest, cancel: CancellationToken) -> JobReport {
        let mut job = Job::new(request);
        let mut interim = None;
        let started = Instant::now();
        self.events.emit(PipelineEvent::JobQueued {
            job_id: job.id().to_string(),
            media_kind: job.request.media_kind,
            timestamp: now_timestamp(),
        });

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            _ = self.shutdown.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        };

        let result = match permit {
            None => Err(AcquireError::Cancelled("cancelled before start".into())),
            Some(_permit) => {
                let timeout = self.config.job_timeout;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(AcquireError::Cancelled("cancelled by caller".into())),
                    _ = self.shutdown.cancelled() => Err(AcquireError::Cancelled("pipeline shutting down".into())),
                    outcome = tokio::time::timeout(timeout, self.drive(&mut job, &mut interim)) => match outcome {
                        Ok(result) => result,
                        Err(_) => Err(AcquireError::Cancelled(format!(
                            "job exceeded timeout of {timeout:?}"
                        ))),
                    },
                }
            }
        };

        self.finish(job, result, started, interim).await
    }

    /// Everything between the worker slot and the terminal transition. The
    /// work directory lives inside this future, so dropping the future on
    /// timeout or cancellation removes it.
    async fn drive(
        &self,
        job: &mut Job,
        interim: &mut Option<JoinHandle<bool>>,
    ) -> Result<JobOutput, AcquireError> {
        let work = tempfile::Builder::new()
            .prefix(&format!("mediaferry-{}-", safe_stem(job.id())))
            .tempdir_in(&self.config.work_root)
            .map_err(AcquireError::WorkDir)?;

        let result = self.acquire(job, work.path(), interim).await;

        let dir = work.path().to_path_buf();
        if let Err(e) = work.close() {
            tracing::warn!(job_id = %job.id(), dir = %dir.display(), error = %e, "work directory cleanup failed");
        }
        result
    }

    async fn acquire(
        &self,
        job: &mut Job,
        work_dir: &Path,
        interim: &mut Option<JoinHandle<bool>>,
    ) -> Result<JobOutput, AcquireError> {
        // The attempt directory holds the artifact until the upload is done.
        let (metadata, artifact, _attempt_dir) =
            self.extract_with_fallback(job, work_dir, interim).await?;
        self.events.emit(PipelineEvent::ArtifactLocated {
            job_id: job.id().to_string(),
            file_name: artifact
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            byte_len: artifact.byte_len,
        });

        let upload_started = Instant::now();
        let delivered = self
            .delivery
            .deliver(&artifact, &job.request.owner_id, job.id())
            .await?;
        self.events.emit(PipelineEvent::Uploaded {
            job_id: job.id().to_string(),
            storage_key: delivered.storage_key.clone(),
            byte_size: delivered.byte_size,
            elapsed_ms: upload_started.elapsed().as_millis() as u64,
        });

        Ok(JobOutput {
            byte_size: delivered.byte_size,
            duration_seconds: metadata.duration_seconds,
            title: metadata.title,
            storage_key: delivered.storage_key,
            public_url: delivered.public_url,
        })
    }

    /// The attempt loop. Returns once one strategy produced a locatable
    /// artifact, together with the attempt directory holding it, or with the
    /// final classified error.
    async fn extract_with_fallback(
        &self,
        job: &mut Job,
        work_dir: &Path,
        interim: &mut Option<JoinHandle<bool>>,
    ) -> Result<(MediaMetadata, Artifact, TempDir), AcquireError> {
        let stem = safe_stem(job.id());
        let kind = job.request.media_kind;

        loop {
            let Some((index, strategy)) = self.catalog.next(&job.attempted) else {
                return Err(ExtractionError::transient("strategy catalog exhausted").into());
            };
            let first = job.phase == JobPhase::Queued;
            self.advance(job, JobPhase::Attempting, Some(index));
            if first {
                let event = NotificationEvent::downloading(
                    job.id(),
                    job.request.callback_url.as_deref(),
                    job.request.shared_secret.as_deref(),
                );
                *interim = Some(self.spawn_notification(event));
            }

            let attempt = job.attempt_count();
            let attempt_dir = tempfile::Builder::new()
                .prefix(&format!("attempt-{attempt}-"))
                .tempdir_in(work_dir)
                .map_err(AcquireError::WorkDir)?;
            tracing::info!(
                job_id = %job.id(),
                extractor = self.extractor.name(),
                strategy = %strategy.name,
                attempt,
                "extraction attempt"
            );
            self.events.emit(PipelineEvent::AttemptStarted {
                job_id: job.id().to_string(),
                attempt,
                strategy: strategy.name.clone(),
            });

            let spec = AttemptSpec {
                url: &job.request.url,
                media_kind: kind,
                quality: job.request.quality,
                output_stem: &stem,
                work_dir: attempt_dir.path(),
            };
            let attempt_started = Instant::now();
            let err = match self.extractor.attempt(spec, strategy).await {
                Ok(extraction) => {
                    let path =
                        locator::locate(attempt_dir.path(), &stem, kind.canonical_extension()).await?;
                    if let Some(reported) = &extraction.reported_path {
                        if reported != &path {
                            tracing::debug!(job_id = %job.id(), reported = %reported.display(), located = %path.display(), "extractor reported a different path");
                        }
                    }
                    let artifact = locator::describe(path, kind).await?;
                    if artifact.extension != kind.canonical_extension() {
                        tracing::warn!(job_id = %job.id(), extension = %artifact.extension, expected = kind.canonical_extension(), "artifact has unexpected extension");
                    }
                    return Ok((extraction.metadata, artifact, attempt_dir));
                }
                Err(err) => err,
            };
            release_attempt_dir(job.id(), attempt_dir);

            let class = err.class;
            tracing::warn!(job_id = %job.id(), strategy = %strategy.name, attempt, class = %class, error = %err, "extraction attempt failed");
            self.events.emit(PipelineEvent::AttemptFailed {
                job_id: job.id().to_string(),
                attempt,
                strategy: strategy.name.clone(),
                class,
                error: truncate_message(&err.message, self.config.max_error_chars),
                elapsed_ms: attempt_started.elapsed().as_millis() as u64,
            });
            let err = AcquireError::from(err);
            job.last_error = Some(self.job_error(&err));

            let budget_left = job.attempt_count() < self.config.max_attempts;
            let strategy_left = self.catalog.next(&job.attempted).is_some();
            match err.class() {
                ErrorClass::Transient if budget_left && strategy_left => {
                    self.advance(job, JobPhase::Retrying, None);
                }
                _ => {
                    if budget_left && strategy_left {
                        tracing::info!(job_id = %job.id(), "non-retryable failure, not trying further strategies");
                    } else {
                        tracing::info!(job_id = %job.id(), attempts = job.attempt_count(), "no attempts left");
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn finish(
        &self,
        mut job: Job,
        result: Result<JobOutput, AcquireError>,
        started: Instant,
        interim: Option<JoinHandle<bool>>,
    ) -> JobReport {
        let total_ms = started.elapsed().as_millis() as u64;
        let secret = job.request.shared_secret.clone();
        let callback = job.request.callback_url.clone();

        let (event, error) = match result {
            Ok(output) => {
                self.advance(&mut job, JobPhase::Succeeded, None);
                tracing::info!(job_id = %job.id(), url = %output.public_url, attempts = job.attempt_count(), total_ms, "job succeeded");
                self.events.emit(PipelineEvent::JobSucceeded {
                    job_id: job.id().to_string(),
                    public_url: output.public_url.clone(),
                    attempts: job.attempt_count(),
                    total_ms,
                });
                let event = NotificationEvent::ready(
                    job.id(),
                    callback.as_deref(),
                    secret.as_deref(),
                    &output.public_url,
                    output.title.as_deref(),
                    output.duration_seconds,
                );
                job.output = Some(output);
                (event, None)
            }
            Err(err) => {
                let message = truncate_message(&err.to_string(), self.config.max_error_chars);
                job.last_error = Some(self.job_error(&err));
                self.advance(&mut job, JobPhase::Failed, None);
                tracing::warn!(job_id = %job.id(), kind = err.kind(), attempts = job.attempt_count(), total_ms, error = %message, "job failed");
                self.events.emit(PipelineEvent::JobFailed {
                    job_id: job.id().to_string(),
                    kind: err.kind().to_string(),
                    error: message.clone(),
                    attempts: job.attempt_count(),
                    total_ms,
                });
                let event =
                    NotificationEvent::failed(job.id(), callback.as_deref(), secret.as_deref(), &message);
                (event, Some(message))
            }
        };

        if let Some(handle) = interim {
            if let Err(e) = handle.await {
                tracing::warn!(job_id = %job.id(), error = %e, "interim notification task failed");
            }
        }
        let terminal_notified = send_notification(self.notifier.as_ref(), &self.events, &event).await;
        JobReport {
            job,
            error,
            terminal_notified,
        }
    }

    /// Send on its own task so a slow receiver never holds up extraction.
    fn spawn_notification(&self, event: NotificationEvent) -> JoinHandle<bool> {
        let notifier = Arc::clone(&self.notifier);
        let events = self.events.clone();
        tokio::spawn(async move { send_notification(notifier.as_ref(), &events, &event).await })
    }

    fn job_error(&self, err: &AcquireError) -> JobError {
        JobError {
            kind: err.kind().to_string(),
            class: err.class(),
            message: truncate_message(&err.to_string(), self.config.max_error_chars),
        }
    }

    fn advance(&self, job: &mut Job, next: JobPhase, strategy_index: Option<usize>) {
        let from = job.phase;
        let moved = match (next, strategy_index) {
            (JobPhase::Attempting, Some(index)) => job.begin_attempt(index),
            _ => job.transition(next),
        };
        match moved {
            Ok(()) => self.events.emit(PipelineEvent::PhaseChanged {
                job_id: job.id().to_string(),
                from,
                to: next,
            }),
            Err(e) => tracing::error!(job_id = %job.id(), error = %e, "rejected job transition"),
        }
    }
}

async fn send_notification(
    notifier: &dyn Notifier,
    events: &EventBus,
    event: &NotificationEvent,
) -> bool {
    let delivered = notifier.notify(event).await;
    events.emit(PipelineEvent::NotificationSent {
        job_id: event.job_id.clone(),
        status: event.status.as_str().to_string(),
        delivered,
    });
    delivered
}

fn release_attempt_dir(job_id: &str, dir: TempDir) {
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        tracing::warn!(job_id, dir = %path.display(), error = %e, "attempt directory cleanup failed");
    }
}

/// File-name-safe form of a job id.
fn safe_stem(job_id: &str) -> String {
    let stem: String = job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "job".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_stem() {
        assert_eq!(safe_stem("asset-1_a"), "asset-1_a");
        assert_eq!(safe_stem("../etc/passwd"), "___etc_passwd");
        assert_eq!(safe_stem(""), "job");
    }
}
