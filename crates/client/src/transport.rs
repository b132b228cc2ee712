//! The network seam between the job core and the remote service.
//!
//! [`JobTransport`] is implemented by [`VtonApi`](crate::api::VtonApi)
//! for real HTTP traffic. Everything above this module (submitter,
//! poller, aggregator) only talks to the trait.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use vton_core::{JobHandle, JobStatus};

/// Content types the processing service accepts for uploaded images.
pub const ACCEPTED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Which family of endpoints a job belongs to. Status queries are routed
/// to the matching `/status/{handle}` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Garment upload: background removal and metadata extraction.
    Ingestion,
    /// Virtual try-on compositing.
    TryOn,
}

impl JobKind {
    /// Path segment of the endpoint family, relative to the API root.
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::TryOn => "tryon",
        }
    }
}

/// An image plus optional key/value attributes, ready to be uploaded.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub file_name: String,
    /// Explicit MIME type. When `None` it is guessed from `file_name`.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
}

impl ImagePayload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
            attributes: BTreeMap::new(),
        }
    }

    /// Read an image from disk. The file name (not the full path) is
    /// sent to the service.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, bytes))
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The explicit content type, or one guessed from the file extension.
    pub fn resolved_content_type(&self) -> Option<String> {
        if let Some(ct) = &self.content_type {
            return Some(ct.trim().to_ascii_lowercase());
        }
        let ext = Path::new(&self.file_name)
            .extension()?
            .to_string_lossy()
            .to_ascii_lowercase();
        let guessed = match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            _ => return None,
        };
        Some(guessed.to_string())
    }
}

/// Successful answer to a submission: every job the service created,
/// keyed by its logical name, plus any extra fields of the response.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReceipt {
    pub handles: BTreeMap<String, JobHandle>,
    pub details: serde_json::Value,
}

/// One observation of a job's status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: JobStatus,
    /// Only present for terminal statuses.
    pub result: Option<serde_json::Value>,
}

impl StatusReport {
    pub fn new(status: JobStatus, result: Option<serde_json::Value>) -> Self {
        Self { status, result }
    }
}

/// Errors from the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("VTON API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The configured API root cannot carry a status path.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    /// The response body did not match the expected contract.
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether retrying the same request later may succeed.
    ///
    /// Connection problems, timeouts, HTTP 408, 429 and 5xx are transient.
    /// Other 4xx responses and contract violations are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => !(e.is_decode() || e.is_builder() || e.is_redirect()),
            Self::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::InvalidUrl(_) | Self::Decode(_) => false,
        }
    }
}

/// Client side of the processing service contract.
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Upload a garment image. A success yields the named background
    /// removal and metadata extraction jobs.
    async fn submit_garment(&self, image: &ImagePayload) -> Result<SubmitReceipt, TransportError>;

    /// Request a try-on of `garment_id` on the given person image.
    async fn submit_try_on(
        &self,
        person_image: &ImagePayload,
        garment_id: &str,
    ) -> Result<SubmitReceipt, TransportError>;

    /// Query the current status of a job. Must be side-effect free.
    async fn status(&self, kind: JobKind, handle: &JobHandle)
        -> Result<StatusReport, TransportError>;
}
