/*!
 * Application controller behind the command line front-end.
 *
 * Wires configuration, the HTTP service client, the preview coordinator and
 * the export orchestrator together, and renders export progress in the
 * terminal.
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::app_config::Config;
use crate::captions::{load_srt, validate_cues};
use crate::export::{BatchView, ExportBatch, ExportOrchestrator, ExportParams, JobStatus, PollHealth};
use crate::preview::{PreviewCoordinator, PreviewStatus};
use crate::services::{ExportService, HttpServiceClient, RenderService};
use crate::style::StyleDescriptor;

/// Concurrent downloads once a batch has finished
const MAX_CONCURRENT_DOWNLOADS: usize = 4;

/// Main application controller
pub struct Controller {
    config: Config,
    render: Arc<dyn RenderService>,
    export: Arc<dyn ExportService>,
}

impl Controller {
    /// Create a controller talking to the configured HTTP service
    pub fn with_config(config: Config) -> Result<Self> {
        let client = Arc::new(
            HttpServiceClient::from_config(&config.service)
                .map_err(|e| anyhow!("Failed to create service client: {}", e))?,
        );
        Ok(Self::with_services(config, client.clone(), client))
    }

    /// Create a controller with explicit service implementations
    pub fn with_services(config: Config, render: Arc<dyn RenderService>, export: Arc<dyn ExportService>) -> Self {
        Self { config, render, export }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Render the preview artifact for a caption file and write it to `output`
    pub async fn preview(
        &self,
        captions: &Path,
        style: Option<&Path>,
        output: &Path,
        force_refresh: bool,
    ) -> Result<PathBuf> {
        let cues = load_srt(captions)?;
        validate_cues(&cues)?;
        let style = match style {
            Some(path) => load_style(path)?,
            None => StyleDescriptor::default(),
        };

        let coordinator = PreviewCoordinator::from_config(&self.config.preview, self.render.clone());
        if force_refresh {
            coordinator.force_refresh(&cues, &style);
        } else {
            coordinator.on_change(&cues, &style);
        }

        let state = coordinator.settled().await;
        if let PreviewStatus::Error(message) = &state.status {
            return Err(anyhow!("Preview rendering failed: {}", message));
        }
        let artifact = state
            .artifact
            .ok_or_else(|| anyhow!("Render service returned no preview"))?;

        std::fs::write(output, artifact.as_bytes())
            .with_context(|| format!("Failed to write preview to {}", output.display()))?;
        info!("Preview for {} cues written to {}", cues.len(), output.display());
        Ok(output.to_path_buf())
    }

    /// Export projects, follow progress until done and download the results
    ///
    /// `interrupt` requests cancellation of the batch; the controller then
    /// waits for the state the service actually reaches.
    pub async fn export(
        &self,
        project_ids: Vec<String>,
        params: ExportParams,
        download_dir: Option<PathBuf>,
        interrupt: CancellationToken,
    ) -> Result<ExportBatch> {
        let orchestrator = ExportOrchestrator::new(self.export.clone(), self.config.export.clone());
        let extension = params.format.extension();
        let batch_id = orchestrator.create_batch(project_ids, params).await?;
        info!("Export batch {} created", batch_id);

        let progress = ExportProgress::new();
        let batch = match self.follow_batch(&orchestrator, &batch_id, &progress, interrupt).await {
            Ok(batch) => batch,
            Err(e) => {
                // Nothing else stops the poller of an unfinished batch
                orchestrator.shutdown();
                return Err(e);
            }
        };
        progress.finish(&batch);

        info!(
            "Batch {} {}: {} completed, {} failed, {} cancelled",
            batch.id, batch.status, batch.completed_count, batch.failed_count, batch.cancelled_count
        );
        for job in batch.jobs.iter().filter(|job| job.status == JobStatus::Failed) {
            warn!(
                "{} failed: {}",
                display_name(job.project_name.as_str(), &job.project_id),
                job.error.as_deref().unwrap_or("no error message")
            );
        }

        let download_dir = download_dir.unwrap_or_else(|| self.config.export.resolved_download_dir());
        let downloaded = self.download_completed(&orchestrator, &batch, &download_dir, extension).await;
        orchestrator.close(&batch_id);
        downloaded?;
        Ok(batch)
    }

    /// Render progress until the batch is terminal, cancelling it on `interrupt`
    async fn follow_batch(
        &self,
        orchestrator: &ExportOrchestrator,
        batch_id: &str,
        progress: &ExportProgress,
        interrupt: CancellationToken,
    ) -> Result<ExportBatch> {
        let mut receiver = orchestrator.subscribe(batch_id)?;
        let mut cancel_sent = false;

        loop {
            let view = receiver.borrow_and_update().clone();
            progress.update(&view);
            if view.batch.is_terminal() {
                return Ok(view.batch);
            }

            tokio::select! {
                changed = receiver.changed() => {
                    if changed.is_err() {
                        return Err(anyhow!("Export batch {} was closed", batch_id));
                    }
                }
                _ = interrupt.cancelled(), if !cancel_sent => {
                    cancel_sent = true;
                    warn!("Interrupted, cancelling batch {}", batch_id);
                    let batch = orchestrator.cancel(batch_id).await?;
                    progress.update(&BatchView { batch, health: PollHealth::Healthy });
                }
            }
        }
    }

    async fn download_completed(
        &self,
        orchestrator: &ExportOrchestrator,
        batch: &ExportBatch,
        download_dir: &Path,
        extension: &str,
    ) -> Result<()> {
        let completed: Vec<_> = batch
            .jobs
            .iter()
            .filter(|job| job.status == JobStatus::Completed)
            .collect();
        if completed.is_empty() {
            return Ok(());
        }

        std::fs::create_dir_all(download_dir)
            .with_context(|| format!("Failed to create download directory {}", download_dir.display()))?;

        let results = stream::iter(completed)
            .map(|job| async move {
                let bytes = orchestrator.download_artifact(&batch.id, &job.project_id).await?;
                let path = download_dir.join(format!("{}.{}", sanitize_file_stem(&job.project_id), extension));
                tokio::fs::write(&path, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Saved {}", path.display());
                Ok::<_, anyhow::Error>(())
            })
            .buffer_unordered(MAX_CONCURRENT_DOWNLOADS)
            .collect::<Vec<_>>()
            .await;

        let errors: Vec<String> = results
            .into_iter()
            .filter_map(|result| result.err().map(|e| e.to_string()))
            .collect();
        if !errors.is_empty() {
            return Err(anyhow!("Failed to download {} exports: {}", errors.len(), errors.join("; ")));
        }
        Ok(())
    }

    /// One-off status lookup of any batch known to the service
    pub async fn status(&self, batch_id: &str) -> Result<ExportBatch> {
        let snapshot = self
            .export
            .get_batch(batch_id, &CancellationToken::new())
            .await
            .with_context(|| format!("Failed to fetch batch {}", batch_id))?;
        Ok(ExportBatch::from_jobs(snapshot.id, snapshot.jobs))
    }
}

/// Read a style descriptor from a JSON file
pub fn load_style(path: &Path) -> Result<StyleDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read style file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse style file {}", path.display()))
}

fn display_name<'a>(project_name: &'a str, project_id: &'a str) -> &'a str {
    if project_name.is_empty() { project_id } else { project_name }
}

/// Keep project ids usable as file names
fn sanitize_file_stem(project_id: &str) -> String {
    project_id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Terminal progress display, one bar per job plus a batch total
struct ExportProgress {
    multi: MultiProgress,
    total: ProgressBar,
    jobs: parking_lot::Mutex<HashMap<String, ProgressBar>>,
}

impl ExportProgress {
    fn new() -> Self {
        let multi = MultiProgress::new();
        let total = multi.add(ProgressBar::new(100));
        total.set_style(bar_style("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}"));
        total.set_message("Waiting for export service");
        Self {
            multi,
            total,
            jobs: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn update(&self, view: &BatchView) {
        let batch = &view.batch;
        self.total.set_position(batch.total_progress.round() as u64);

        let health = match &view.health {
            PollHealth::Healthy => String::new(),
            PollHealth::Retrying { consecutive_failures } => format!(" (retrying, {} failed polls)", consecutive_failures),
            PollHealth::StatusUnknown { .. } => " (status unknown)".to_string(),
        };
        self.total.set_message(format!(
            "{} - {}/{} completed, {} failed{}",
            batch.status, batch.completed_count, batch.total_count, batch.failed_count, health
        ));

        let mut bars = self.jobs.lock();
        for job in &batch.jobs {
            let bar = bars.entry(job.id.clone()).or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(100));
                bar.set_style(bar_style("  [{bar:30.green/white}] {percent:>3}% {msg}"));
                bar
            });
            bar.set_position(job.progress.round() as u64);
            bar.set_message(format!(
                "{} ({})",
                display_name(job.project_name.as_str(), &job.project_id),
                job.status
            ));
            if job.status.is_terminal() && !bar.is_finished() {
                bar.finish();
            }
        }
    }

    fn finish(&self, batch: &ExportBatch) {
        self.total.finish_with_message(format!("Batch {}", batch.status));
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{bar:40}] {percent}% {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░")
}
