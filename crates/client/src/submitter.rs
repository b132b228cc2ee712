//! Submission of units of work.
//!
//! A submission either yields a complete, non-empty set of named job
//! handles or an error; no handles are ever returned from a failed call.
//! Submitting never starts polling.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use vton_core::JobHandle;

use crate::transport::{ImagePayload, JobKind, JobTransport, SubmitReceipt, TransportError, ACCEPTED_IMAGE_TYPES};

/// Named job handles created by one successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub kind: JobKind,
    pub handles: BTreeMap<String, JobHandle>,
    /// Extra response fields (e.g. `garment_id`, `raw_path`).
    pub details: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Invalid submission: {0}")]
    Validation(String),

    #[error("Submission failed: {0}")]
    Transport(#[from] TransportError),
}

pub struct JobSubmitter {
    transport: Arc<dyn JobTransport>,
}

impl JobSubmitter {
    pub fn new(transport: Arc<dyn JobTransport>) -> Self {
        Self { transport }
    }

    /// Upload a garment image, creating its background removal and
    /// metadata extraction jobs.
    pub async fn submit(&self, image: ImagePayload) -> Result<Submission, SubmissionError> {
        validate_image(&image)?;

        let receipt = self.transport.submit_garment(&image).await.map_err(|e| {
            tracing::warn!(file = %image.file_name, error = %e, "Garment upload rejected");
            e
        })?;
        let submission = accept_receipt(JobKind::Ingestion, receipt)?;

        tracing::info!(
            file = %image.file_name,
            jobs = submission.handles.len(),
            "Garment submitted",
        );
        Ok(submission)
    }

    /// Request a try-on of `garment_id` on a person image.
    pub async fn submit_try_on(
        &self,
        person_image: ImagePayload,
        garment_id: &str,
    ) -> Result<Submission, SubmissionError> {
        validate_image(&person_image)?;
        let garment_id = garment_id.trim();
        if garment_id.is_empty() {
            return Err(SubmissionError::Validation("garment_id must not be empty".into()));
        }

        let receipt = self
            .transport
            .submit_try_on(&person_image, garment_id)
            .await
            .map_err(|e| {
                tracing::warn!(garment_id, error = %e, "Try-on request rejected");
                e
            })?;
        let submission = accept_receipt(JobKind::TryOn, receipt)?;

        tracing::info!(garment_id, "Try-on submitted");
        Ok(submission)
    }
}

fn validate_image(image: &ImagePayload) -> Result<(), SubmissionError> {
    if image.bytes.is_empty() {
        return Err(SubmissionError::Validation(format!(
            "image '{}' is empty",
            image.file_name
        )));
    }

    match image.resolved_content_type() {
        Some(ct) if ACCEPTED_IMAGE_TYPES.contains(&ct.as_str()) => Ok(()),
        Some(ct) => Err(SubmissionError::Validation(format!(
            "unsupported content type '{ct}', expected one of {}",
            ACCEPTED_IMAGE_TYPES.join(", ")
        ))),
        None => Err(SubmissionError::Validation(format!(
            "cannot determine content type of '{}'",
            image.file_name
        ))),
    }
}

/// Turn a transport receipt into a submission, or reject it whole.
fn accept_receipt(kind: JobKind, receipt: SubmitReceipt) -> Result<Submission, SubmissionError> {
    if receipt.handles.is_empty() {
        return Err(SubmissionError::Validation("service returned no job handles".into()));
    }

    let mut seen = HashSet::new();
    for (name, handle) in &receipt.handles {
        if handle.is_empty() {
            return Err(SubmissionError::Validation(format!("job '{name}' has an empty handle")));
        }
        if !seen.insert(handle) {
            return Err(SubmissionError::Validation(format!(
                "handle {handle} was returned for more than one job"
            )));
        }
    }

    Ok(Submission {
        kind,
        handles: receipt.handles,
        details: receipt.details,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::test_support::ScriptedTransport;

    fn png() -> ImagePayload {
        ImagePayload::new("shirt.png", vec![0x89, b'P', b'N', b'G'])
    }

    fn submitter(transport: &Arc<ScriptedTransport>) -> JobSubmitter {
        JobSubmitter::new(Arc::clone(transport) as Arc<dyn JobTransport>)
    }

    #[tokio::test]
    async fn upload_yields_every_named_handle() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.accept_submission(&[("background_removal", "h1"), ("metadata_extraction", "h2")]);

        let submission = submitter(&transport).submit(png()).await.unwrap();

        assert_eq!(submission.kind, JobKind::Ingestion);
        assert_eq!(submission.handles["background_removal"], JobHandle::new("h1"));
        assert_eq!(submission.handles["metadata_extraction"], JobHandle::new("h2"));
        assert_eq!(submission.details["garment_id"], "g1");
    }

    #[tokio::test]
    async fn try_on_yields_single_handle() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.accept_submission(&[("try_on", "t1")]);

        let submission = submitter(&transport)
            .submit_try_on(ImagePayload::new("me.jpg", vec![1]), "g1")
            .await
            .unwrap();

        assert_eq!(submission.kind, JobKind::TryOn);
        assert_eq!(submission.handles.len(), 1);
    }

    #[tokio::test]
    async fn rejected_upload_yields_no_handles() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reject_submission(500);

        let err = submitter(&transport).submit(png()).await.unwrap_err();
        assert_matches!(err, SubmissionError::Transport(TransportError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn invalid_images_never_reach_the_network() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.accept_submission(&[("background_removal", "h1")]);
        let submitter = submitter(&transport);

        let empty = ImagePayload::new("shirt.png", Vec::new());
        assert_matches!(submitter.submit(empty).await, Err(SubmissionError::Validation(_)));

        let gif = ImagePayload::new("shirt.gif", vec![1]);
        assert_matches!(submitter.submit(gif).await, Err(SubmissionError::Validation(_)));

        let unknown = ImagePayload::new("shirt", vec![1]);
        assert_matches!(submitter.submit(unknown).await, Err(SubmissionError::Validation(_)));

        assert_matches!(
            submitter.submit_try_on(png(), "  ").await,
            Err(SubmissionError::Validation(_))
        );

        assert_eq!(transport.submit_calls(), 0);
    }

    #[tokio::test]
    async fn empty_handle_set_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.accept_submission(&[]);

        let err = submitter(&transport).submit(png()).await.unwrap_err();
        assert_matches!(err, SubmissionError::Validation(msg) if msg.contains("no job handles"));
        assert_eq!(transport.submit_calls(), 1);
    }

    #[test]
    fn blank_or_duplicate_handles_reject_the_whole_receipt() {
        let blank = SubmitReceipt {
            handles: BTreeMap::from([
                ("background_removal".to_string(), JobHandle::new("h1")),
                ("metadata_extraction".to_string(), JobHandle::new(" ")),
            ]),
            details: serde_json::Value::Null,
        };
        assert_matches!(
            accept_receipt(JobKind::Ingestion, blank),
            Err(SubmissionError::Validation(_))
        );

        let duplicate = SubmitReceipt {
            handles: BTreeMap::from([
                ("background_removal".to_string(), JobHandle::new("h1")),
                ("metadata_extraction".to_string(), JobHandle::new("h1")),
            ]),
            details: serde_json::Value::Null,
        };
        assert_matches!(
            accept_receipt(JobKind::Ingestion, duplicate),
            Err(SubmissionError::Validation(_))
        );
    }
}
