//! REST API client for the VTON processing service.
//!
//! Wraps the ingestion and try-on HTTP endpoints (submission and status
//! queries) using [`reqwest`], and implements [`JobTransport`] on top of
//! them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use vton_core::{JobHandle, JobStatus};

use crate::config::ClientConfig;
use crate::transport::{ImagePayload, JobKind, JobTransport, StatusReport, SubmitReceipt, TransportError};
use crate::tryon::TRY_ON;

/// HTTP client for one VTON API deployment.
pub struct VtonApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response of `POST /ingestion/upload`.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    /// Job handles keyed by logical name (`background_removal`,
    /// `metadata_extraction`).
    pub tasks: BTreeMap<String, String>,
    pub garment_id: Option<String>,
    pub file_id: Option<String>,
    pub raw_path: Option<String>,
    pub message: Option<String>,
}

/// Response of `POST /tryon/`.
#[derive(Debug, Deserialize)]
pub struct TryOnResponse {
    pub task_id: String,
    pub message: Option<String>,
    /// Where the service will write the composited image.
    pub result_path_placeholder: Option<String>,
}

/// Response of `GET /{ingestion,tryon}/status/{task_id}`.
#[derive(Debug, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

impl VtonApi {
    /// Create a new API client.
    ///
    /// * `api_url` - API root including the version prefix, e.g.
    ///   `http://host:8000/api/v1`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    /// Build a client with the request timeout from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config.api_url.clone()))
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Upload a raw garment image.
    ///
    /// Sends `POST /ingestion/upload` with the image as the `file`
    /// multipart field and each attribute as a text field.
    pub async fn upload_garment(&self, image: &ImagePayload) -> Result<UploadResponse, TransportError> {
        let mut form = Form::new().part("file", image_part(image)?);
        for (key, value) in &image.attributes {
            form = form.text(key.clone(), value.clone());
        }

        let response = self
            .client
            .post(format!("{}/ingestion/upload", self.api_url))
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Start a try-on job.
    ///
    /// Sends `POST /tryon/` with the `person_image` file and the
    /// `garment_id` form field.
    pub async fn start_try_on(
        &self,
        person_image: &ImagePayload,
        garment_id: &str,
    ) -> Result<TryOnResponse, TransportError> {
        let mut form = Form::new()
            .part("person_image", image_part(person_image)?)
            .text("garment_id", garment_id.to_string());
        for (key, value) in &person_image.attributes {
            form = form.text(key.clone(), value.clone());
        }

        let response = self
            .client
            .post(format!("{}/tryon/", self.api_url))
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the raw status record of a task.
    pub async fn task_status(
        &self,
        kind: JobKind,
        handle: &JobHandle,
    ) -> Result<TaskStatusResponse, TransportError> {
        let response = self.client.get(self.status_url(kind, handle)?).send().await?;
        Self::parse_response(response).await
    }

    /// `{api_url}/{kind}/status/{handle}`. The handle is opaque and is
    /// pushed as a single percent-encoded path segment.
    pub fn status_url(&self, kind: JobKind, handle: &JobHandle) -> Result<reqwest::Url, TransportError> {
        let mut url =
            reqwest::Url::parse(&self.api_url).map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", self.api_url)))?;
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidUrl(self.api_url.clone()))?
            .pop_if_empty()
            .extend([kind.path_segment(), "status", handle.as_str()]);
        Ok(url)
    }

    /// Non-2xx responses become [`TransportError::Api`] with the body kept.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Api { status, body })
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
        let bytes = Self::ensure_success(response).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl JobTransport for VtonApi {
    async fn submit_garment(&self, image: &ImagePayload) -> Result<SubmitReceipt, TransportError> {
        let response = self.upload_garment(image).await?;
        let handles = response
            .tasks
            .into_iter()
            .map(|(name, id)| (name, JobHandle::new(id)))
            .collect();
        let details = serde_json::json!({
            "garment_id": response.garment_id,
            "file_id": response.file_id,
            "raw_path": response.raw_path,
            "message": response.message,
        });
        Ok(SubmitReceipt { handles, details })
    }

    async fn submit_try_on(
        &self,
        person_image: &ImagePayload,
        garment_id: &str,
    ) -> Result<SubmitReceipt, TransportError> {
        let response = self.start_try_on(person_image, garment_id).await?;
        let mut handles = BTreeMap::new();
        handles.insert(TRY_ON.to_string(), JobHandle::new(response.task_id));
        let details = serde_json::json!({
            "garment_id": garment_id,
            "result_path_placeholder": response.result_path_placeholder,
            "message": response.message,
        });
        Ok(SubmitReceipt { handles, details })
    }

    async fn status(&self, kind: JobKind, handle: &JobHandle) -> Result<StatusReport, TransportError> {
        let raw = self.task_status(kind, handle).await?;
        let status = JobStatus::parse(&raw.status).map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(normalize_report(status, raw.result))
    }
}

/// Reconcile the task-queue status with the worker's own payload.
///
/// Workers catch their exceptions and return `{"status": "failed",
/// "error": ...}`, which the queue reports as `SUCCESS`. Such records
/// are reclassified as `FAILURE` carrying the payload as the error.
/// Non-terminal reports never carry a result.
pub fn normalize_report(status: JobStatus, result: Option<serde_json::Value>) -> StatusReport {
    if !status.is_terminal() {
        return StatusReport::new(status, None);
    }

    let soft_failure = status == JobStatus::Success
        && result
            .as_ref()
            .and_then(|r| r.get("status"))
            .and_then(|s| s.as_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("failed"));

    if soft_failure {
        StatusReport::new(JobStatus::Failure, result)
    } else {
        StatusReport::new(status, result)
    }
}

fn image_part(image: &ImagePayload) -> Result<Part, TransportError> {
    let part = Part::bytes(image.bytes.clone()).file_name(image.file_name.clone());
    match image.resolved_content_type() {
        Some(ct) => Ok(part.mime_str(&ct)?),
        None => Ok(part),
    }
}
