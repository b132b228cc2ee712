//! Shared domain types for the VTON job client.
//!
//! Holds the vocabulary every other crate speaks: job handles, the
//! forward-only [`JobStatus`] lifecycle, per-job records, and the
//! core error type.

pub mod error;
pub mod job_events;
pub mod status;
pub mod types;

pub use error::CoreError;
pub use status::JobStatus;
pub use types::{JobHandle, JobRecord, Timestamp};
