//! Job lifecycle events broadcast by a logical operation.
//!
//! Every status change the aggregator records is also published as a
//! [`JobEvent`]. Subscribe via
//! [`LogicalOperation::subscribe`](crate::aggregator::LogicalOperation::subscribe).

use serde::Serialize;
use uuid::Uuid;
use vton_core::job_events::{
    EVENT_JOB_FAILED, EVENT_JOB_PROGRESS, EVENT_JOB_SUCCEEDED, EVENT_JOB_UNREACHABLE,
    EVENT_OPERATION_COMPLETED,
};
use vton_core::{JobHandle, JobStatus};

use crate::aggregator::OperationOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job reported an intermediate status.
    JobProgress {
        operation_id: Uuid,
        name: String,
        handle: JobHandle,
        status: JobStatus,
    },

    /// A job completed successfully.
    JobSucceeded {
        operation_id: Uuid,
        name: String,
        handle: JobHandle,
        result: serde_json::Value,
    },

    /// A job reported `FAILURE`.
    JobFailed {
        operation_id: Uuid,
        name: String,
        handle: JobHandle,
        error: serde_json::Value,
    },

    /// Status queries for a job kept failing and polling was abandoned.
    JobUnreachable {
        operation_id: Uuid,
        name: String,
        handle: JobHandle,
        error: String,
    },

    /// Every job of the operation settled.
    OperationCompleted {
        operation_id: Uuid,
        outcome: OperationOutcome,
    },
}

impl JobEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JobProgress { .. } => EVENT_JOB_PROGRESS,
            Self::JobSucceeded { .. } => EVENT_JOB_SUCCEEDED,
            Self::JobFailed { .. } => EVENT_JOB_FAILED,
            Self::JobUnreachable { .. } => EVENT_JOB_UNREACHABLE,
            Self::OperationCompleted { .. } => EVENT_OPERATION_COMPLETED,
        }
    }

    pub fn operation_id(&self) -> Uuid {
        match self {
            Self::JobProgress { operation_id, .. }
            | Self::JobSucceeded { operation_id, .. }
            | Self::JobFailed { operation_id, .. }
            | Self::JobUnreachable { operation_id, .. }
            | Self::OperationCompleted { operation_id, .. } => *operation_id,
        }
    }
}
