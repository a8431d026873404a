use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app_config::ServiceConfig;
use crate::errors::ServiceError;
use crate::export::models::{BatchExportRequest, BatchSnapshot};

use super::{cancellable, ExportService, PreviewRequest, RenderService};

/// HTTP client for the render and export API
#[derive(Debug, Clone)]
pub struct HttpServiceClient {
    /// HTTP client for API requests
    client: Client,
    /// Base URL every route is appended to
    base_url: Url,
    /// Bearer token, empty when unauthenticated
    api_key: String,
}

/// JSON shape of a preview response
#[derive(Debug, Deserialize)]
struct PreviewResponse {
    artifact: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBatchResponse {
    batch_id: String,
}

impl HttpServiceClient {
    /// Create a client for the API rooted at `endpoint`
    pub fn new(endpoint: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let base_url = Url::parse(endpoint)
            .map_err(|e| ServiceError::RequestFailed(format!("Invalid endpoint {}: {}", endpoint, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::RequestFailed(format!("Endpoint cannot be a base URL: {}", endpoint)));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        Self::new(&config.endpoint, config.api_key.clone(), Duration::from_secs(config.timeout_secs))
    }

    /// Build a route URL from path segments, escaping each one
    fn route(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ServiceError::RequestFailed(format!("Invalid base URL: {}", self.base_url)))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }

    /// Send a request and turn non-success statuses into `ApiError`
    async fn send(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let response = self.authorize(request).send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Service API error ({}): {}", status, message);
            return Err(ServiceError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::ParseError(e.to_string()))
    }
}

fn map_transport_error(error: reqwest::Error) -> ServiceError {
    if error.is_connect() || error.is_timeout() {
        ServiceError::ConnectionError(error.to_string())
    } else {
        ServiceError::RequestFailed(error.to_string())
    }
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

#[async_trait]
impl RenderService for HttpServiceClient {
    async fn render_preview(
        &self,
        request: &PreviewRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ServiceError> {
        let url = self.route(&["preview"])?;
        debug!("POST {} ({} cues)", url, request.cues.len());

        cancellable(cancel, async {
            let response = self.send(self.client.post(url).json(request)).await?;
            if is_json(&response) {
                let body: PreviewResponse = response
                    .json()
                    .await
                    .map_err(|e| ServiceError::ParseError(e.to_string()))?;
                Ok(body.artifact)
            } else {
                response.text().await.map_err(map_transport_error)
            }
        })
        .await
    }
}

#[async_trait]
impl ExportService for HttpServiceClient {
    async fn create_batch(
        &self,
        request: &BatchExportRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ServiceError> {
        let url = self.route(&["batch-export"])?;
        debug!("POST {} ({} projects)", url, request.project_ids.len());

        let created: CreateBatchResponse =
            cancellable(cancel, self.send_json(self.client.post(url).json(request))).await?;
        Ok(created.batch_id)
    }

    async fn get_batch(
        &self,
        batch_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchSnapshot, ServiceError> {
        let url = self.route(&["batch-export", batch_id])?;
        cancellable(cancel, self.send_json(self.client.get(url))).await
    }

    async fn cancel_batch(
        &self,
        batch_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchSnapshot, ServiceError> {
        let url = self.route(&["batch-export", batch_id, "cancel"])?;
        debug!("POST {}", url);
        cancellable(cancel, self.send_json(self.client.post(url))).await
    }

    async fn download(
        &self,
        batch_id: &str,
        project_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ServiceError> {
        let url = self.route(&["batch-export", batch_id, "download", project_id])?;
        debug!("GET {}", url);

        cancellable(cancel, async {
            let response = self.send(self.client.get(url)).await?;
            response.bytes().await.map_err(map_transport_error)
        })
        .await
    }
}
