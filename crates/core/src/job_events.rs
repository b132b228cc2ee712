//! Event type names for job lifecycle notifications.
//!
//! Match the `event_type` tag of the serialized `JobEvent` enum in the
//! client crate.

/// Intermediate status observed for a job (PENDING / RUNNING).
pub const EVENT_JOB_PROGRESS: &str = "job_progress";

/// Job completed successfully.
pub const EVENT_JOB_SUCCEEDED: &str = "job_succeeded";

/// Job reported FAILURE.
pub const EVENT_JOB_FAILED: &str = "job_failed";

/// Polling for a job was abandoned after status queries kept failing.
pub const EVENT_JOB_UNREACHABLE: &str = "job_unreachable";

/// Every job of a logical operation settled.
pub const EVENT_OPERATION_COMPLETED: &str = "operation_completed";
