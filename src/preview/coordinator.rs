/*!
 * Preview request coordination.
 *
 * Edits arrive far faster than the render service can answer. The coordinator
 * turns that stream into as few remote renders as possible:
 *
 * - unchanged input is ignored,
 * - cached input is displayed immediately, skipping the debounce,
 * - anything else waits for a quiet period, then issues one request,
 * - issuing a request aborts the previous one, so at most one is in flight,
 * - a response is only displayed if it still matches the latest input.
 *
 * The media surface observes `PreviewState` through a watch channel.
 */

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::app_config::PreviewConfig;
use crate::captions::CaptionCue;
use crate::services::{cancellable, PreviewRequest, RenderService};
use crate::style::{compute_key, CacheKey, StyleDescriptor};

use super::cache::PreviewCache;

/// What the pipeline is doing right now
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreviewStatus {
    /// Nothing requested yet
    #[default]
    Idle,
    /// Waiting for edits to settle
    Debouncing,
    /// A render request is in flight
    Loading,
    /// The displayed artifact matches the latest input
    Ready,
    /// The latest render failed; the previous artifact is still shown
    Error(String),
}

impl PreviewStatus {
    /// Whether work is still pending for the latest input
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Debouncing | Self::Loading)
    }
}

/// Observable preview state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewState {
    /// Artifact handed to the media surface
    pub artifact: Option<Arc<str>>,
    /// Key of the displayed artifact
    pub displayed_key: Option<CacheKey>,
    /// Key of the latest input
    pub committed_key: Option<CacheKey>,
    pub status: PreviewStatus,
}

/// Result of feeding an edit to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Same rendering-relevant input as before
    Unchanged,
    /// Served from cache, displayed already
    CacheHit,
    /// A render will be issued once the debounce elapses
    Scheduled,
}

struct InFlight {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct Pipeline {
    committed_key: Option<CacheKey>,
    displayed_key: Option<CacheKey>,
    /// Bumped on every commit; stale timers and responses compare against it
    generation: u64,
    debounce: Option<CancellationToken>,
    in_flight: Option<InFlight>,
}

impl Pipeline {
    fn cancel_debounce(&mut self) {
        if let Some(token) = self.debounce.take() {
            token.cancel();
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            debug!("Aborting superseded preview request");
            in_flight.token.cancel();
        }
    }

    /// Release the in-flight slot if it still belongs to `generation`
    fn finish(&mut self, generation: u64) {
        if self.in_flight.as_ref().is_some_and(|f| f.generation == generation) {
            self.in_flight = None;
        }
    }

    fn is_pending(&self) -> bool {
        self.debounce.is_some() || self.in_flight.is_some()
    }
}

struct Inner {
    cache: PreviewCache,
    service: Arc<dyn RenderService>,
    debounce: Duration,
    pipeline: Mutex<Pipeline>,
    state: watch::Sender<PreviewState>,
}

impl Inner {
    fn publish(&self, pipeline: &Pipeline, status: PreviewStatus, artifact: Option<Arc<str>>) {
        self.state.send_modify(|state| {
            if artifact.is_some() {
                state.artifact = artifact;
            }
            state.displayed_key = pipeline.displayed_key.clone();
            state.committed_key = pipeline.committed_key.clone();
            state.status = status;
        });
    }

    /// Issue the render for `generation`, unless a newer commit exists
    async fn issue(self: Arc<Self>, key: CacheKey, request: PreviewRequest, generation: u64) {
        let token = {
            let mut pipeline = self.pipeline.lock();
            if pipeline.generation != generation {
                return;
            }
            pipeline.debounce = None;
            pipeline.cancel_in_flight();

            let token = CancellationToken::new();
            pipeline.in_flight = Some(InFlight {
                generation,
                token: token.clone(),
            });
            self.publish(&pipeline, PreviewStatus::Loading, None);
            token
        };

        debug!("Requesting preview {}", key.short());
        let result = cancellable(&token, self.service.render_preview(&request, &token)).await;

        match result {
            Ok(artifact) => {
                let artifact: Arc<str> = artifact.into();
                self.cache.put(key.clone(), artifact.clone());

                let mut pipeline = self.pipeline.lock();
                pipeline.finish(generation);
                if pipeline.committed_key.as_ref() == Some(&key) {
                    // The latest input is answered; a timer for the same key is redundant
                    pipeline.cancel_debounce();
                    pipeline.displayed_key = Some(key.clone());
                    let status = if pipeline.in_flight.is_some() {
                        PreviewStatus::Loading
                    } else {
                        PreviewStatus::Ready
                    };
                    self.publish(&pipeline, status, Some(artifact));
                    debug!("Displaying preview {}", key.short());
                } else {
                    debug!("Discarding stale preview {}", key.short());
                }
            }
            Err(e) if e.is_cancelled() => {
                debug!("Preview request {} cancelled", key.short());
            }
            Err(e) => {
                warn!("Preview request {} failed: {}", key.short(), e);
                let mut pipeline = self.pipeline.lock();
                pipeline.finish(generation);
                if pipeline.generation == generation {
                    self.publish(&pipeline, PreviewStatus::Error(e.to_string()), None);
                }
            }
        }
    }
}

/// Turns edits into debounced, cancellable preview renders
///
/// Must be used from within a Tokio runtime. Dropping the coordinator aborts
/// pending work.
pub struct PreviewCoordinator {
    inner: Arc<Inner>,
}

impl PreviewCoordinator {
    pub fn new(cache: PreviewCache, service: Arc<dyn RenderService>, debounce: Duration) -> Self {
        let (state, _) = watch::channel(PreviewState::default());
        Self {
            inner: Arc::new(Inner {
                cache,
                service,
                debounce,
                pipeline: Mutex::new(Pipeline::default()),
                state,
            }),
        }
    }

    pub fn from_config(config: &PreviewConfig, service: Arc<dyn RenderService>) -> Self {
        Self::new(PreviewCache::from_config(config), service, config.debounce())
    }

    /// Feed the latest edit
    pub fn on_change(&self, cues: &[CaptionCue], style: &StyleDescriptor) -> ChangeOutcome {
        let key = compute_key(cues, style);
        let mut pipeline = self.inner.pipeline.lock();

        if pipeline.committed_key.as_ref() == Some(&key)
            && (pipeline.displayed_key.as_ref() == Some(&key) || pipeline.is_pending())
        {
            return ChangeOutcome::Unchanged;
        }

        pipeline.committed_key = Some(key.clone());
        pipeline.generation += 1;
        pipeline.cancel_debounce();

        if let Some(artifact) = self.inner.cache.get(&key) {
            pipeline.cancel_in_flight();
            pipeline.displayed_key = Some(key);
            self.inner.publish(&pipeline, PreviewStatus::Ready, Some(artifact));
            return ChangeOutcome::CacheHit;
        }

        let token = CancellationToken::new();
        pipeline.debounce = Some(token.clone());
        self.inner.publish(&pipeline, PreviewStatus::Debouncing, None);

        let generation = pipeline.generation;
        let request = PreviewRequest::new(cues, style);
        let inner = self.inner.clone();
        let delay = self.inner.debounce;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => inner.issue(key, request, generation).await,
            }
        });

        ChangeOutcome::Scheduled
    }

    /// Render now, ignoring any cached artifact
    ///
    /// The fresh result still replaces the cache entry.
    pub fn force_refresh(&self, cues: &[CaptionCue], style: &StyleDescriptor) {
        let key = compute_key(cues, style);
        let generation = {
            let mut pipeline = self.inner.pipeline.lock();
            pipeline.committed_key = Some(key.clone());
            pipeline.generation += 1;
            pipeline.cancel_debounce();
            self.inner.publish(&pipeline, PreviewStatus::Loading, None);
            pipeline.generation
        };

        let request = PreviewRequest::new(cues, style);
        tokio::spawn(self.inner.clone().issue(key, request, generation));
    }

    /// Drop pending and in-flight work, keeping what is displayed
    pub fn cancel_pending(&self) {
        let mut pipeline = self.inner.pipeline.lock();
        pipeline.cancel_debounce();
        pipeline.cancel_in_flight();
        pipeline.generation += 1;
        pipeline.committed_key = pipeline.displayed_key.clone();

        let status = if pipeline.displayed_key.is_some() {
            PreviewStatus::Ready
        } else {
            PreviewStatus::Idle
        };
        self.inner.publish(&pipeline, status, None);
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> PreviewState {
        self.inner.state.borrow().clone()
    }

    pub fn cache(&self) -> &PreviewCache {
        &self.inner.cache
    }

    /// Wait until no work is pending for the latest input
    pub async fn settled(&self) -> PreviewState {
        let mut receiver = self.subscribe();
        match receiver.wait_for(|state| !state.status.is_busy()).await {
            Ok(state) => state.clone(),
            // The sender lives in `self`, so it cannot be gone
            Err(_) => self.state(),
        }
    }
}

impl Drop for PreviewCoordinator {
    fn drop(&mut self) {
        let mut pipeline = self.inner.pipeline.lock();
        pipeline.cancel_debounce();
        pipeline.cancel_in_flight();
    }
}
