/*!
 * Error types for the subburn library.
 *
 * This module contains custom error types for the different layers of the
 * crate, using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

use crate::export::models::JobStatus;

/// Errors that can occur when talking to the render or export service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request was aborted through its cancellation token
    #[error("Request cancelled")]
    Cancelled,
}

impl ServiceError {
    /// Whether this error is a self-inflicted abort rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether retrying the same call later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::RequestFailed(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Self::ParseError(_) | Self::Cancelled => false,
        }
    }
}

/// Errors that can occur while reading caption cues
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptionError {
    /// Cue timing violates `0 <= start < end`
    #[error("Invalid timing for cue {index}: start {start}, end {end}")]
    InvalidTiming {
        /// Position of the cue in its track
        index: usize,
        /// Start time in seconds
        start: f64,
        /// End time in seconds
        end: f64,
    },

    /// The SRT content did not contain a single usable cue
    #[error("No valid caption cues found: {0}")]
    Empty(String),

    /// A timestamp could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Errors surfaced by the batch export orchestrator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    /// Error from the export service
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// No session is tracked for this batch id
    #[error("Unknown batch: {0}")]
    UnknownBatch(String),

    /// The batch does not contain this project
    #[error("Project {project_id} is not part of batch {batch_id}")]
    UnknownProject {
        /// Batch identifier
        batch_id: String,
        /// Project identifier
        project_id: String,
    },

    /// Download requested for a job that has not completed
    #[error("Project {project_id} cannot be downloaded while {status}")]
    NotDownloadable {
        /// Project identifier
        project_id: String,
        /// Current job status
        status: JobStatus,
    },

    /// A batch needs at least one project
    #[error("Cannot create an export batch without projects")]
    EmptyBatch,

    /// A project id was blank
    #[error("Invalid project id: {0:?}")]
    InvalidProjectId(String),

    /// The operation requires a terminal batch
    #[error("Batch {0} is still processing")]
    BatchNotFinished(String),

    /// Retry was requested but every job completed
    #[error("Batch {0} has no failed or cancelled jobs to retry")]
    NothingToRetry(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a remote service
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Error from caption processing
    #[error("Caption error: {0}")]
    Caption(#[from] CaptionError),

    /// Error from the export orchestrator
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
