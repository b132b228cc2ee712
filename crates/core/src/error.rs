use crate::status::JobStatus;
use crate::types::JobHandle;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    /// The record is terminal (or polling was abandoned) and can no
    /// longer change.
    #[error("Job {handle} is already settled as {current}; update rejected")]
    AlreadySettled { handle: JobHandle, current: JobStatus },

    #[error("Job {handle} cannot move back from {current} to {next}")]
    Regressed {
        handle: JobHandle,
        current: JobStatus,
        next: JobStatus,
    },
}
