/*!
 * Remote collaborators of the editor core.
 *
 * This module defines the interfaces of the two services the core talks to,
 * plus their implementations:
 * - `http`: reqwest client for the render/export API
 * - `mock`: scripted in-memory services for tests and demos
 *
 * Every call takes a `CancellationToken`. Implementations must stop the
 * underlying transport when it fires and answer `ServiceError::Cancelled`.
 */

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;

use crate::captions::CaptionCue;
use crate::errors::ServiceError;
use crate::export::models::{BatchExportRequest, BatchSnapshot};
use crate::style::{NativeStyle, StyleDescriptor};

/// Body of a preview render request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub cues: Vec<CaptionCue>,
    pub style: NativeStyle,
}

impl PreviewRequest {
    pub fn new(cues: &[CaptionCue], style: &StyleDescriptor) -> Self {
        Self {
            cues: cues.to_vec(),
            style: style.to_native(),
        }
    }
}

/// Service turning captions and a style into a renderable subtitle track
#[async_trait]
pub trait RenderService: Send + Sync + Debug {
    /// Render the preview artifact for a request
    async fn render_preview(
        &self,
        request: &PreviewRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ServiceError>;
}

/// Service burning captions into videos
#[async_trait]
pub trait ExportService: Send + Sync + Debug {
    /// Create a batch and return its id
    async fn create_batch(
        &self,
        request: &BatchExportRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ServiceError>;

    /// Current state of a batch
    async fn get_batch(
        &self,
        batch_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchSnapshot, ServiceError>;

    /// Ask the service to stop unfinished jobs of a batch
    async fn cancel_batch(
        &self,
        batch_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchSnapshot, ServiceError>;

    /// Fetch the artifact of a completed job
    async fn download(
        &self,
        batch_id: &str,
        project_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ServiceError>;
}

/// Race a service future against its cancellation token
///
/// Dropping the losing future is what aborts the underlying request.
pub async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T, ServiceError>
where
    F: std::future::Future<Output = Result<T, ServiceError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ServiceError::Cancelled),
        result = call => result,
    }
}

pub mod http;
pub mod mock;

pub use self::http::HttpServiceClient;
