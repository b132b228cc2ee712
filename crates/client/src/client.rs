//! High-level entry point bundling transport, submitter and aggregator.

use std::sync::Arc;

use vton_core::JobHandle;

use crate::aggregator::JobAggregator;
use crate::api::VtonApi;
use crate::config::ClientConfig;
use crate::ingestion::GarmentUpload;
use crate::media;
use crate::submitter::{JobSubmitter, SubmissionError};
use crate::transport::{ImagePayload, JobKind, JobTransport, StatusReport, TransportError};
use crate::tryon::TryOnJob;

pub struct VtonClient {
    config: ClientConfig,
    transport: Arc<dyn JobTransport>,
    submitter: JobSubmitter,
    aggregator: JobAggregator,
}

impl VtonClient {
    /// Client talking HTTP to the service configured in `config`.
    pub fn from_config(config: ClientConfig) -> Result<Self, TransportError> {
        let api = VtonApi::from_config(&config)?;
        Ok(Self::with_transport(config, Arc::new(api)))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn JobTransport>) -> Self {
        let submitter = JobSubmitter::new(Arc::clone(&transport));
        let aggregator = JobAggregator::new(Arc::clone(&transport), config.poll_config());
        Self {
            config,
            transport,
            submitter,
            aggregator,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Upload a garment and start polling its processing jobs.
    pub async fn upload_garment(&self, image: ImagePayload) -> Result<GarmentUpload, SubmissionError> {
        let submission = self.submitter.submit(image).await?;
        Ok(GarmentUpload::new(self.aggregator.register(submission)))
    }

    /// Request a try-on and start polling its job.
    pub async fn try_on(&self, person_image: ImagePayload, garment_id: &str) -> Result<TryOnJob, SubmissionError> {
        let submission = self.submitter.submit_try_on(person_image, garment_id).await?;
        Ok(TryOnJob::new(self.aggregator.register(submission)))
    }

    /// One-off status query, without polling.
    pub async fn status(&self, kind: JobKind, handle: &JobHandle) -> Result<StatusReport, TransportError> {
        self.transport.status(kind, handle).await
    }

    /// Absolute URL of a media path returned by a job.
    pub fn media_url(&self, path: &str) -> String {
        media::media_url(&self.config.media_url, path)
    }
}
