/*!
 * Export job and batch models.
 *
 * The export service owns the jobs; the orchestrator keeps a mirror built from
 * successive snapshots. Everything batch-level (counts, progress, aggregate
 * status) is derived from the mirrored jobs and never taken from the wire.
 */

use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::style::{NativeStyle, StyleDescriptor};

/// Lifecycle of a single export job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl JobStatus {
    /// Terminal states are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed | Self::Cancelled => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch-level status, derived from the jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Created, no snapshot observed yet
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Aggregate a set of job statuses
    ///
    /// Any unfinished job keeps the batch processing. Once all are terminal:
    /// all completed is `Completed`; any failure makes the batch `Failed`;
    /// otherwise at least one completed job makes it `Completed` and only an
    /// all-cancelled batch is `Cancelled`.
    pub fn aggregate<'a>(statuses: impl IntoIterator<Item = &'a JobStatus>) -> Self {
        let mut total = 0;
        let mut completed = 0;
        let mut failed = 0;
        for status in statuses {
            total += 1;
            match status {
                JobStatus::Pending | JobStatus::Processing => return Self::Processing,
                JobStatus::Completed => completed += 1,
                JobStatus::Failed => failed += 1,
                JobStatus::Cancelled => {}
            }
        }

        if total == 0 {
            Self::Pending
        } else if completed == total {
            Self::Completed
        } else if failed > 0 {
            Self::Failed
        } else if completed > 0 {
            Self::Completed
        } else {
            Self::Cancelled
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One project's export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub status: JobStatus,
    /// Percentage in `[0, 100]`
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Service reference of the finished artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
}

impl ExportJob {
    pub fn new(id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            project_name: String::new(),
            status: JobStatus::Pending,
            progress: 0.0,
            error: None,
            output_ref: None,
        }
    }

    /// Progress as it counts toward the batch: finished jobs count fully
    pub fn effective_progress(&self) -> f64 {
        if self.status.is_terminal() {
            100.0
        } else {
            clamp_progress(self.progress)
        }
    }

    /// Fold a newer observation of this job into the mirror
    ///
    /// Terminal jobs never change again; otherwise status only moves forward
    /// and progress never decreases while the job is unfinished.
    fn absorb(&mut self, incoming: ExportJob) {
        if self.status.is_terminal() || incoming.status.rank() < self.status.rank() {
            return;
        }

        let progress = if incoming.status == self.status {
            clamp_progress(incoming.progress).max(self.progress)
        } else {
            clamp_progress(incoming.progress)
        };

        if !incoming.project_name.is_empty() {
            self.project_name = incoming.project_name;
        }
        self.status = incoming.status;
        self.progress = if self.status == JobStatus::Completed { 100.0 } else { progress };
        self.error = incoming.error.or(self.error.take());
        self.output_ref = incoming.output_ref.or(self.output_ref.take());
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_finite() { progress.clamp(0.0, 100.0) } else { 0.0 }
}

/// Batch session state exposed to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBatch {
    pub id: String,
    pub status: BatchStatus,
    pub total_progress: f64,
    pub completed_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
    pub total_count: usize,
    /// Index of the job being worked on, `total_count` once all are done
    pub current_job_index: usize,
    pub jobs: Vec<ExportJob>,
}

impl ExportBatch {
    /// Handle for a freshly created batch, before any snapshot
    pub fn pending(id: impl Into<String>, project_ids: &[String]) -> Self {
        Self {
            id: id.into(),
            status: BatchStatus::Pending,
            total_progress: 0.0,
            completed_count: 0,
            failed_count: 0,
            cancelled_count: 0,
            total_count: project_ids.len(),
            current_job_index: 0,
            jobs: Vec::new(),
        }
    }

    /// Build a batch view directly from a job list
    pub fn from_jobs(id: impl Into<String>, jobs: Vec<ExportJob>) -> Self {
        let mut batch = Self::pending(id, &[]);
        batch.jobs = jobs;
        batch.recompute();
        batch
    }

    /// Merge a service snapshot into this mirror and re-derive the aggregate
    pub fn merge(&mut self, snapshot: BatchSnapshot) {
        for incoming in snapshot.jobs {
            // Blank ids carry no identity; fall back to the project
            let existing = self.jobs.iter_mut().find(|job| {
                if job.id.is_empty() || incoming.id.is_empty() {
                    job.project_id == incoming.project_id
                } else {
                    job.id == incoming.id
                }
            });
            match existing {
                Some(job) => job.absorb(incoming),
                None => {
                    let mut job = incoming;
                    job.progress = clamp_progress(job.progress);
                    if job.status == JobStatus::Completed {
                        job.progress = 100.0;
                    }
                    self.jobs.push(job);
                }
            }
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        let count = |status: JobStatus| self.jobs.iter().filter(|job| job.status == status).count();
        self.completed_count = count(JobStatus::Completed);
        self.failed_count = count(JobStatus::Failed);
        self.cancelled_count = count(JobStatus::Cancelled);
        self.total_count = self.total_count.max(self.jobs.len());

        self.status = if self.jobs.len() < self.total_count && !self.jobs.is_empty() {
            // Some jobs were not reported yet
            BatchStatus::Processing
        } else {
            BatchStatus::aggregate(self.jobs.iter().map(|job| &job.status))
        };

        self.total_progress = if self.total_count == 0 {
            0.0
        } else {
            let sum: f64 = self.jobs.iter().map(ExportJob::effective_progress).sum();
            sum / self.total_count as f64
        };

        self.current_job_index = self
            .jobs
            .iter()
            .position(|job| job.status == JobStatus::Processing)
            .or_else(|| self.jobs.iter().position(|job| job.status == JobStatus::Pending))
            .unwrap_or(self.total_count);
    }

    pub fn job(&self, project_id: &str) -> Option<&ExportJob> {
        self.jobs.iter().find(|job| job.project_id == project_id)
    }

    /// Projects whose job failed or was cancelled
    pub fn retryable_project_ids(&self) -> Vec<String> {
        self.jobs
            .iter()
            .filter(|job| matches!(job.status, JobStatus::Failed | JobStatus::Cancelled))
            .map(|job| job.project_id.clone())
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Batch state as reported by the export service
///
/// Service-side aggregates are deliberately not modelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSnapshot {
    pub id: String,
    #[serde(default)]
    pub jobs: Vec<ExportJob>,
}

/// Output frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "720p")]
    Hd720,
    #[default]
    #[serde(rename = "1080p")]
    Hd1080,
    #[serde(rename = "1440p")]
    Qhd1440,
    #[serde(rename = "4k")]
    Uhd4k,
}

impl std::str::FromStr for Resolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "720p" | "hd" => Ok(Self::Hd720),
            "1080p" | "fullhd" => Ok(Self::Hd1080),
            "1440p" | "qhd" => Ok(Self::Qhd1440),
            "4k" | "2160p" | "uhd" => Ok(Self::Uhd4k),
            _ => Err(anyhow!("Invalid resolution: {}", s)),
        }
    }
}

/// Video codec of the burned output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Vp9,
}

impl std::str::FromStr for VideoCodec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "h264" | "avc" => Ok(Self::H264),
            "h265" | "hevc" => Ok(Self::H265),
            "vp9" => Ok(Self::Vp9),
            _ => Err(anyhow!("Invalid codec: {}", s)),
        }
    }
}

/// Container of the burned output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Webm,
    Mov,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::Mov => "mov",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "webm" => Ok(Self::Webm),
            "mov" => Ok(Self::Mov),
            _ => Err(anyhow!("Invalid output format: {}", s)),
        }
    }
}

/// Output parameters shared by every job of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub codec: VideoCodec,
    /// Target bitrate such as `8M` or `2500k`
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
    #[serde(default)]
    pub fps: Option<u32>,
    #[serde(default)]
    pub format: OutputFormat,
    /// Style override; the service uses each project's saved style otherwise
    #[serde(default)]
    pub style: Option<StyleDescriptor>,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            codec: VideoCodec::default(),
            bitrate: default_bitrate(),
            fps: None,
            format: OutputFormat::default(),
            style: None,
        }
    }
}

fn default_bitrate() -> String {
    "8M".to_string()
}

/// Body of a batch creation request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExportRequest {
    pub project_ids: Vec<String>,
    pub resolution: Resolution,
    pub codec: VideoCodec,
    pub bitrate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    pub format: OutputFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<NativeStyle>,
}

impl BatchExportRequest {
    pub fn new(project_ids: Vec<String>, params: &ExportParams) -> Self {
        Self {
            project_ids,
            resolution: params.resolution,
            codec: params.codec,
            bitrate: params.bitrate.clone(),
            fps: params.fps,
            format: params.format,
            style: params.style.as_ref().map(StyleDescriptor::to_native),
        }
    }
}
