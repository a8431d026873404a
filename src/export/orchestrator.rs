/*!
 * Batch export orchestration.
 *
 * Each created batch gets a session: a mirror of its jobs, a watch channel the
 * UI observes, and a poll scheduler that runs until the aggregate status is
 * terminal or the session is closed. Polls and cancels of one batch go through
 * the same async lock, so a cancel response can never be overwritten by a poll
 * that was already in flight.
 */

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::app_config::ExportConfig;
use crate::errors::{ExportError, ServiceError};
use crate::services::{cancellable, ExportService};

use super::models::{BatchExportRequest, BatchSnapshot, ExportBatch, ExportParams, JobStatus};

/// Reachability of the export service as seen by the poller
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PollHealth {
    #[default]
    Healthy,
    /// Recent polls failed, still within the failure budget
    Retrying { consecutive_failures: u32 },
    /// Too many polls failed in a row; job states may be out of date
    StatusUnknown {
        consecutive_failures: u32,
        last_error: String,
    },
}

/// What the UI observes for a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchView {
    pub batch: ExportBatch,
    pub health: PollHealth,
}

struct SessionState {
    consecutive_failures: u32,
}

struct BatchSession {
    batch_id: String,
    project_ids: Vec<String>,
    params: ExportParams,
    /// Held for the whole duration of every poll or cancel
    calls: tokio::sync::Mutex<SessionState>,
    view: watch::Sender<BatchView>,
    /// Fired when the session is closed; aborts the poller and in-flight calls
    closed: CancellationToken,
}

impl BatchSession {
    fn batch(&self) -> ExportBatch {
        self.view.borrow().batch.clone()
    }

    fn apply<F: FnOnce(&mut BatchView)>(&self, update: F) -> ExportBatch {
        self.view.send_modify(update);
        self.batch()
    }
}

struct Inner {
    service: Arc<dyn ExportService>,
    config: ExportConfig,
    sessions: Mutex<HashMap<String, Arc<BatchSession>>>,
}

impl Inner {
    fn session(&self, batch_id: &str) -> Result<Arc<BatchSession>, ExportError> {
        self.sessions
            .lock()
            .get(batch_id)
            .cloned()
            .ok_or_else(|| ExportError::UnknownBatch(batch_id.to_string()))
    }

    /// One serialized status poll
    async fn poll_session(&self, session: &BatchSession) -> Result<ExportBatch, ExportError> {
        let mut state = session.calls.lock().await;

        let current = session.batch();
        if current.is_terminal() {
            return Ok(current);
        }

        let result = cancellable(
            &session.closed,
            self.service.get_batch(&session.batch_id, &session.closed),
        )
        .await;
        self.absorb_poll(session, &mut state, result)
    }

    fn absorb_poll(
        &self,
        session: &BatchSession,
        state: &mut SessionState,
        result: Result<BatchSnapshot, ServiceError>,
    ) -> Result<ExportBatch, ExportError> {
        match result {
            Ok(snapshot) => {
                state.consecutive_failures = 0;
                let batch = session.apply(|view| {
                    view.batch.merge(snapshot);
                    view.health = PollHealth::Healthy;
                });
                debug!(
                    "Batch {}: {} ({:.0}%, {}/{} done)",
                    batch.id,
                    batch.status,
                    batch.total_progress,
                    batch.completed_count + batch.failed_count + batch.cancelled_count,
                    batch.total_count
                );
                Ok(batch)
            }
            Err(e) if e.is_cancelled() => Err(e.into()),
            Err(e) => {
                state.consecutive_failures += 1;
                let failures = state.consecutive_failures;
                warn!("Polling batch {} failed ({} in a row): {}", session.batch_id, failures, e);

                // Permanent errors will not clear up by retrying
                let health = if !e.is_transient() || failures >= self.config.max_consecutive_poll_failures {
                    PollHealth::StatusUnknown {
                        consecutive_failures: failures,
                        last_error: e.to_string(),
                    }
                } else {
                    PollHealth::Retrying { consecutive_failures: failures }
                };
                session.apply(|view| view.health = health);
                Err(e.into())
            }
        }
    }
}

/// Creates export batches and tracks them until they finish
#[derive(Clone)]
pub struct ExportOrchestrator {
    inner: Arc<Inner>,
}

impl ExportOrchestrator {
    pub fn new(service: Arc<dyn ExportService>, config: ExportConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                config,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a batch and start polling it
    ///
    /// Returns as soon as the service accepted the batch; its view starts out
    /// `pending`.
    pub async fn create_batch(
        &self,
        project_ids: Vec<String>,
        params: ExportParams,
    ) -> Result<String, ExportError> {
        if project_ids.is_empty() {
            return Err(ExportError::EmptyBatch);
        }
        if let Some(blank) = project_ids.iter().find(|id| id.trim().is_empty()) {
            return Err(ExportError::InvalidProjectId(blank.clone()));
        }

        let request = BatchExportRequest::new(project_ids.clone(), &params);
        let batch_id = self
            .inner
            .service
            .create_batch(&request, &CancellationToken::new())
            .await?;
        info!("Created export batch {} with {} projects", batch_id, project_ids.len());

        let (view, _) = watch::channel(BatchView {
            batch: ExportBatch::pending(batch_id.clone(), &project_ids),
            health: PollHealth::Healthy,
        });
        let session = Arc::new(BatchSession {
            batch_id: batch_id.clone(),
            project_ids,
            params,
            calls: tokio::sync::Mutex::new(SessionState { consecutive_failures: 0 }),
            view,
            closed: CancellationToken::new(),
        });

        let previous = self.inner.sessions.lock().insert(batch_id.clone(), session.clone());
        if let Some(previous) = previous {
            previous.closed.cancel();
        }

        self.spawn_poller(session);
        Ok(batch_id)
    }

    /// Poll on a fixed interval until the batch is terminal or closed
    fn spawn_poller(&self, session: Arc<BatchSession>) {
        let inner = self.inner.clone();
        let interval = self.inner.config.poll_interval();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = session.closed.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                if session.batch().is_terminal() {
                    break;
                }

                match inner.poll_session(&session).await {
                    Ok(batch) if batch.is_terminal() => {
                        info!("Export batch {} finished: {}", batch.id, batch.status);
                        break;
                    }
                    Ok(_) => {}
                    Err(ExportError::Service(e)) if e.is_cancelled() => break,
                    // Already reported; retried on the next tick
                    Err(_) => {}
                }
            }
            debug!("Stopped polling batch {}", session.batch_id);
        });
    }

    /// Fetch the batch state now
    pub async fn poll(&self, batch_id: &str) -> Result<ExportBatch, ExportError> {
        let session = self.inner.session(batch_id)?;
        self.inner.poll_session(&session).await
    }

    /// Request cancellation of the unfinished jobs of a batch
    ///
    /// The service may still finish a job it is working on, so the batch is
    /// polled once more after the cancel response to observe the real outcome.
    pub async fn cancel(&self, batch_id: &str) -> Result<ExportBatch, ExportError> {
        let session = self.inner.session(batch_id)?;
        let mut state = session.calls.lock().await;

        let current = session.batch();
        if current.is_terminal() {
            debug!("Batch {} already {}, nothing to cancel", batch_id, current.status);
            return Ok(current);
        }

        info!("Cancelling export batch {}", batch_id);
        let snapshot = cancellable(
            &session.closed,
            self.inner.service.cancel_batch(batch_id, &session.closed),
        )
        .await?;
        session.apply(|view| view.batch.merge(snapshot));

        let result = cancellable(
            &session.closed,
            self.inner.service.get_batch(batch_id, &session.closed),
        )
        .await;
        match self.inner.absorb_poll(&session, &mut state, result) {
            Ok(batch) => Ok(batch),
            Err(ExportError::Service(e)) if e.is_cancelled() => Err(e.into()),
            // The cancel itself went through; the poller will catch up
            Err(_) => Ok(session.batch()),
        }
    }

    /// Download the artifact of a completed job
    pub async fn download_artifact(&self, batch_id: &str, project_id: &str) -> Result<Bytes, ExportError> {
        let session = self.inner.session(batch_id)?;

        let status = match session.batch().job(project_id) {
            Some(job) => job.status,
            None if session.project_ids.iter().any(|id| id == project_id) => JobStatus::Pending,
            None => {
                return Err(ExportError::UnknownProject {
                    batch_id: batch_id.to_string(),
                    project_id: project_id.to_string(),
                });
            }
        };
        if status != JobStatus::Completed {
            return Err(ExportError::NotDownloadable {
                project_id: project_id.to_string(),
                status,
            });
        }

        let bytes = cancellable(
            &session.closed,
            self.inner.service.download(batch_id, project_id, &session.closed),
        )
        .await?;
        debug!("Downloaded {} bytes for {} in batch {}", bytes.len(), project_id, batch_id);
        Ok(bytes)
    }

    /// Start a new batch with the failed and cancelled projects of a finished one
    pub async fn retry_failed(&self, batch_id: &str) -> Result<String, ExportError> {
        let session = self.inner.session(batch_id)?;
        let batch = session.batch();
        if !batch.is_terminal() {
            return Err(ExportError::BatchNotFinished(batch_id.to_string()));
        }

        let project_ids = batch.retryable_project_ids();
        if project_ids.is_empty() {
            return Err(ExportError::NothingToRetry(batch_id.to_string()));
        }

        info!("Retrying {} projects from batch {}", project_ids.len(), batch_id);
        self.create_batch(project_ids, session.params.clone()).await
    }

    /// Observe a batch
    pub fn subscribe(&self, batch_id: &str) -> Result<watch::Receiver<BatchView>, ExportError> {
        Ok(self.inner.session(batch_id)?.view.subscribe())
    }

    /// Latest mirrored state of a batch
    pub fn snapshot(&self, batch_id: &str) -> Result<ExportBatch, ExportError> {
        Ok(self.inner.session(batch_id)?.batch())
    }

    /// Latest view of a batch, including poll health
    pub fn view(&self, batch_id: &str) -> Result<BatchView, ExportError> {
        Ok(self.inner.session(batch_id)?.view.borrow().clone())
    }

    /// Wait until the batch reaches a terminal aggregate status
    pub async fn wait_for_terminal(&self, batch_id: &str) -> Result<ExportBatch, ExportError> {
        let mut receiver = self.subscribe(batch_id)?;
        let view = receiver
            .wait_for(|view| view.batch.is_terminal())
            .await
            .map_err(|_| ExportError::UnknownBatch(batch_id.to_string()))?;
        Ok(view.batch.clone())
    }

    /// Stop tracking a batch, aborting its poller and in-flight calls
    pub fn close(&self, batch_id: &str) -> bool {
        match self.inner.sessions.lock().remove(batch_id) {
            Some(session) => {
                session.closed.cancel();
                debug!("Closed batch session {}", batch_id);
                true
            }
            None => false,
        }
    }

    /// Ids of the tracked batches
    pub fn batch_ids(&self) -> Vec<String> {
        self.inner.sessions.lock().keys().cloned().collect()
    }

    /// Close every session
    pub fn shutdown(&self) {
        let sessions: Vec<_> = self.inner.sessions.lock().drain().collect();
        for (_, session) in sessions {
            session.closed.cancel();
        }
    }
}
