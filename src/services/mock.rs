/*!
 * Mock service implementations for testing.
 *
 * - `MockRenderService` renders deterministic artifacts, optionally slowly or
 *   failing, and counts calls and aborts.
 * - `MockExportService` plays back a scripted status sequence per project,
 *   one step per poll.
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::errors::ServiceError;
use crate::export::models::{BatchExportRequest, BatchSnapshot, ExportJob, JobStatus};

use super::{ExportService, PreviewRequest, RenderService};

/// Render service double
#[derive(Debug, Clone, Default)]
pub struct MockRenderService {
    delay: Option<Duration>,
    /// Number of upcoming calls that fail
    failures: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    cancellations: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<PreviewRequest>>>,
}

impl MockRenderService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `delay` to answer each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the next `count` calls fail with a connection error
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Artifact this mock produces for a request
    pub fn artifact_for(request: &PreviewRequest) -> String {
        let texts: Vec<&str> = request.cues.iter().map(|cue| cue.text.as_str()).collect();
        format!(
            "[{} {} {}] {}",
            request.style.font_name,
            request.style.font_size,
            request.style.primary_colour,
            texts.join(" / ")
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Calls dropped or cancelled before answering
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PreviewRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RenderService for MockRenderService {
    async fn render_preview(
        &self,
        request: &PreviewRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        // Counts the call as aborted unless it runs to the end
        let mut abort = AbortGuard::new(&self.cancellations);
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        abort.disarm();

        let should_fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ServiceError::ConnectionError("render service unreachable".to_string()));
        }

        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(Self::artifact_for(request))
    }
}

/// Increments a counter when dropped while armed
struct AbortGuard<'a> {
    counter: &'a AtomicUsize,
    armed: bool,
}

impl<'a> AbortGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        Self { counter, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Clone)]
struct ScriptedJob {
    job: ExportJob,
    script: Vec<JobStatus>,
    step: usize,
}

impl ScriptedJob {
    fn advance(&mut self, graceful_cancel: bool) {
        if self.job.status.is_terminal() {
            return;
        }
        if self.step + 1 < self.script.len() {
            self.step += 1;
            self.set_status(self.script[self.step]);
        } else if graceful_cancel {
            // Script ran out while a cancel was pending
            self.set_status(JobStatus::Cancelled);
        }
    }

    fn set_status(&mut self, status: JobStatus) {
        self.job.status = status;
        self.job.progress = match status {
            JobStatus::Pending => 0.0,
            JobStatus::Processing => {
                let span = self.script.len().saturating_sub(1).max(1) as f64;
                (self.step as f64 / span * 100.0).min(99.0)
            }
            JobStatus::Completed => 100.0,
            JobStatus::Failed | JobStatus::Cancelled => self.job.progress,
        };
        match status {
            JobStatus::Failed => self.job.error = Some("encoder exited with status 1".to_string()),
            JobStatus::Completed => self.job.output_ref = Some(format!("exports/{}.mp4", self.job.project_id)),
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
struct MockBatch {
    jobs: Vec<ScriptedJob>,
    cancel_requested: bool,
}

impl MockBatch {
    fn snapshot(&self, id: &str) -> BatchSnapshot {
        BatchSnapshot {
            id: id.to_string(),
            jobs: self.jobs.iter().map(|scripted| scripted.job.clone()).collect(),
        }
    }
}

#[derive(Debug, Default)]
struct MockExportState {
    scripts: HashMap<String, Vec<JobStatus>>,
    batches: HashMap<String, MockBatch>,
    requests: Vec<BatchExportRequest>,
    poll_failures: usize,
    /// HTTP status of the scripted poll failures, a connection error when unset
    poll_failure_status: Option<u16>,
    cancel_failures: usize,
}

/// Export service double driven by per-project status scripts
#[derive(Debug, Clone, Default)]
pub struct MockExportService {
    state: Arc<Mutex<MockExportState>>,
    /// Let processing jobs run their script to the end after a cancel
    graceful_cancel: bool,
    poll_delay: Option<Duration>,
    polls: Arc<AtomicUsize>,
    cancels: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockExportService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status sequence for a project's job, one entry per poll
    ///
    /// The first entry is the state at creation. Projects without a script
    /// go `pending -> processing -> completed`.
    pub fn script(&self, project_id: &str, statuses: Vec<JobStatus>) {
        self.state.lock().scripts.insert(project_id.to_string(), statuses);
    }

    /// Processing jobs finish their script before honoring a cancel
    pub fn with_graceful_cancel(mut self) -> Self {
        self.graceful_cancel = true;
        self
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = Some(delay);
        self
    }

    /// Make the next `count` polls fail with a connection error
    pub fn fail_polls(&self, count: usize) {
        let mut state = self.state.lock();
        state.poll_failures = count;
        state.poll_failure_status = None;
    }

    /// Make the next `count` cancel calls fail with a 503
    pub fn fail_cancels(&self, count: usize) {
        self.state.lock().cancel_failures = count;
    }

    /// Make the next `count` polls fail with an API error carrying `status_code`
    pub fn fail_polls_with_status(&self, count: usize, status_code: u16) {
        let mut state = self.state.lock();
        state.poll_failures = count;
        state.poll_failure_status = Some(status_code);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous polls observed
    pub fn max_concurrent_polls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<BatchExportRequest> {
        self.state.lock().requests.clone()
    }

    fn unknown_batch(batch_id: &str) -> ServiceError {
        ServiceError::ApiError {
            status_code: 404,
            message: format!("batch {} not found", batch_id),
        }
    }
}

#[async_trait]
impl ExportService for MockExportService {
    async fn create_batch(
        &self,
        request: &BatchExportRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ServiceError> {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let mut state = self.state.lock();
        let jobs = request
            .project_ids
            .iter()
            .enumerate()
            .map(|(index, project_id)| {
                let script = state
                    .scripts
                    .get(project_id)
                    .cloned()
                    .filter(|script| !script.is_empty())
                    .unwrap_or_else(|| vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Completed]);
                let mut job = ExportJob::new(format!("{}-job-{}", batch_id, index), project_id.clone());
                job.project_name = format!("Project {}", project_id);
                let mut scripted = ScriptedJob { job, script, step: 0 };
                scripted.set_status(scripted.script[0]);
                scripted
            })
            .collect();

        state.requests.push(request.clone());
        state.batches.insert(batch_id.clone(), MockBatch { jobs, cancel_requested: false });
        Ok(batch_id)
    }

    async fn get_batch(
        &self,
        batch_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchSnapshot, ServiceError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);

        let result = async {
            if let Some(delay) = self.poll_delay {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let mut state = self.state.lock();
            if state.poll_failures > 0 {
                state.poll_failures -= 1;
                return Err(match state.poll_failure_status {
                    Some(status_code) => ServiceError::ApiError {
                        status_code,
                        message: "scripted poll failure".to_string(),
                    },
                    None => ServiceError::ConnectionError("export service unreachable".to_string()),
                });
            }

            let graceful = self.graceful_cancel;
            let batch = state.batches.get_mut(batch_id).ok_or_else(|| Self::unknown_batch(batch_id))?;
            let cancel_requested = batch.cancel_requested;
            for scripted in batch.jobs.iter_mut() {
                scripted.advance(graceful && cancel_requested);
            }
            Ok(batch.snapshot(batch_id))
        }
        .await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn cancel_batch(
        &self,
        batch_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchSnapshot, ServiceError> {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        self.cancels.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        if state.cancel_failures > 0 {
            state.cancel_failures -= 1;
            return Err(ServiceError::ApiError {
                status_code: 503,
                message: "cancel unavailable".to_string(),
            });
        }
        let graceful = self.graceful_cancel;
        let batch = state.batches.get_mut(batch_id).ok_or_else(|| Self::unknown_batch(batch_id))?;
        batch.cancel_requested = true;
        for scripted in batch.jobs.iter_mut() {
            let stop = match scripted.job.status {
                JobStatus::Pending => true,
                JobStatus::Processing => !graceful,
                _ => false,
            };
            if stop {
                scripted.set_status(JobStatus::Cancelled);
            }
        }
        Ok(batch.snapshot(batch_id))
    }

    async fn download(
        &self,
        batch_id: &str,
        project_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ServiceError> {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        let state = self.state.lock();
        let batch = state.batches.get(batch_id).ok_or_else(|| Self::unknown_batch(batch_id))?;
        match batch.jobs.iter().find(|scripted| scripted.job.project_id == project_id) {
            Some(scripted) if scripted.job.status == JobStatus::Completed => {
                Ok(Bytes::from(format!("video:{}", project_id)))
            }
            Some(scripted) => Err(ServiceError::ApiError {
                status_code: 409,
                message: format!("job for {} is {}", project_id, scripted.job.status),
            }),
            None => Err(ServiceError::ApiError {
                status_code: 404,
                message: format!("project {} not in batch", project_id),
            }),
        }
    }
}
