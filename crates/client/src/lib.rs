//! Job submission and polling client for the VTON processing service.
//!
//! Submits garment uploads and try-on requests over HTTP, polls every
//! resulting job until it settles, and merges the jobs of one logical
//! operation into a single view that is republished on every update.

pub mod aggregator;
pub mod api;
pub mod client;
pub mod config;
pub mod events;
pub mod ingestion;
pub mod media;
pub mod poller;
pub mod retry;
pub mod store;
pub mod submitter;
pub mod transport;
pub mod tryon;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregator::{JobAggregator, JobView, LogicalOperation, OperationError, OperationOutcome, OperationView};
pub use client::VtonClient;
pub use config::ClientConfig;
pub use poller::{JobPoller, PollConfig, PollOutcome};
pub use submitter::{JobSubmitter, Submission, SubmissionError};
pub use transport::{ImagePayload, JobKind, JobTransport, StatusReport, TransportError};
