//! Garment ingestion workflow.
//!
//! An upload creates two independent jobs: background removal (writes a
//! processed PNG under `media/processed/`) and metadata extraction (a
//! vision model describes the garment as JSON). Both are tracked by one
//! [`LogicalOperation`]; [`IngestionReport`] decodes their payloads once
//! the operation completes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregator::{JobView, LogicalOperation, OperationError, OperationView};
use crate::media;

/// Logical name of the background removal job.
pub const BACKGROUND_REMOVAL: &str = "background_removal";
/// Logical name of the metadata extraction job.
pub const METADATA_EXTRACTION: &str = "metadata_extraction";

/// A job payload could not be decoded into its typed form.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Result payload has no '{0}' field")]
    MissingField(&'static str),

    #[error("Unexpected result status '{0}'")]
    UnexpectedStatus(String),

    #[error("Invalid result payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Successful background removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundRemovalOutput {
    /// Media path of the processed image.
    pub output_path: String,
}

impl BackgroundRemovalOutput {
    pub fn from_result(result: &serde_json::Value) -> Result<Self, DecodeError> {
        let path = result
            .get("output_path")
            .and_then(serde_json::Value::as_str)
            .ok_or(DecodeError::MissingField("output_path"))?;
        Ok(Self {
            output_path: media::normalize_path(path),
        })
    }

    pub fn url(&self, media_base: &str) -> String {
        media::media_url(media_base, &self.output_path)
    }
}

/// Attributes the vision model extracts from a garment image. Fields the
/// model omits are left empty; unknown fields are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GarmentMetadata {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub sleeve_length: Option<String>,
    #[serde(default)]
    pub neckline: Option<String>,
    #[serde(default)]
    pub style_tags: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Result of the metadata extraction job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MetadataOutcome {
    Extracted(GarmentMetadata),
    /// The worker had no model credentials and did nothing.
    Skipped { reason: String },
}

impl MetadataOutcome {
    pub fn from_result(result: &serde_json::Value) -> Result<Self, DecodeError> {
        match result.get("status").and_then(serde_json::Value::as_str) {
            Some("skipped") => {
                let reason = result
                    .get("reason")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unspecified")
                    .to_string();
                return Ok(Self::Skipped { reason });
            }
            Some("completed") | None => {}
            Some(other) => return Err(DecodeError::UnexpectedStatus(other.to_string())),
        }

        let metadata = result.get("metadata").ok_or(DecodeError::MissingField("metadata"))?;
        let metadata = match metadata {
            // Model output, possibly still wrapped in a markdown code fence.
            serde_json::Value::String(text) => serde_json::from_str(strip_code_fence(text))?,
            other => serde_json::from_value(other.clone())?,
        };
        Ok(Self::Extracted(metadata))
    }
}

/// Remove a surrounding markdown code fence (```` ```json ... ``` ````).
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(body) = text.strip_prefix("```") else {
        return text;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Decoded outcome of a completed ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestionReport {
    pub background_removal: Option<BackgroundRemovalOutput>,
    pub metadata: Option<MetadataOutcome>,
    /// Failure reason per job name, for failed, unreachable, or
    /// undecodable jobs.
    pub errors: BTreeMap<String, String>,
}

impl IngestionReport {
    pub fn from_view(view: &OperationView) -> Self {
        let mut report = Self::default();

        report.background_removal = decode_job(
            view,
            BACKGROUND_REMOVAL,
            BackgroundRemovalOutput::from_result,
            &mut report.errors,
        );
        report.metadata = decode_job(
            view,
            METADATA_EXTRACTION,
            MetadataOutcome::from_result,
            &mut report.errors,
        );

        report
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.background_removal.is_some() && self.metadata.is_some()
    }
}

fn decode_job<T>(
    view: &OperationView,
    name: &str,
    decode: impl FnOnce(&serde_json::Value) -> Result<T, DecodeError>,
    errors: &mut BTreeMap<String, String>,
) -> Option<T> {
    let job = view.job(name)?;
    if let Some(message) = job.error_message() {
        errors.insert(name.to_string(), message);
        return None;
    }

    let JobView::Succeeded { result } = job else {
        return None;
    };
    match decode(result) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(job = name, error = %e, "Could not decode job result");
            errors.insert(name.to_string(), e.to_string());
            None
        }
    }
}

/// A garment upload whose jobs are being polled.
pub struct GarmentUpload {
    operation: LogicalOperation,
}

impl GarmentUpload {
    pub(crate) fn new(operation: LogicalOperation) -> Self {
        Self { operation }
    }

    /// Identifier the service assigned to the garment.
    pub fn garment_id(&self) -> Option<&str> {
        self.operation.details().get("garment_id")?.as_str()
    }

    /// Media path of the uploaded, unprocessed image.
    pub fn raw_path(&self) -> Option<&str> {
        self.operation.details().get("raw_path")?.as_str()
    }

    pub fn operation(&self) -> &LogicalOperation {
        &self.operation
    }

    /// Wait for both jobs to settle and decode their results.
    pub async fn wait(&self) -> Result<IngestionReport, OperationError> {
        let view = self.operation.wait_complete().await?;
        Ok(IngestionReport::from_view(&view))
    }

    pub fn stop(&self) {
        self.operation.stop();
    }
}
