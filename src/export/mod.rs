/*!
 * Server-side batch export.
 *
 * - `models`: jobs, batches and the derived aggregate status
 * - `orchestrator`: batch creation, polling, cancellation, download and retry
 */

pub use self::models::{
    BatchStatus, ExportBatch, ExportJob, ExportParams, JobStatus, OutputFormat, Resolution, VideoCodec,
};
pub use self::orchestrator::{BatchView, ExportOrchestrator, PollHealth};

pub mod models;
pub mod orchestrator;
