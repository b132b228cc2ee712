use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::JobStatus;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque job identifier issued by the remote service at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobHandle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for JobHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Latest known state of one job, as held by the result store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub handle: JobHandle,
    pub status: JobStatus,
    /// Success payload when `status` is `Success`, error payload when
    /// `Failure`. Opaque to the client.
    pub result: Option<serde_json::Value>,
    /// Set when polling was abandoned because status queries kept failing.
    pub poll_error: Option<String>,
    /// Number of status queries that produced this record so far.
    pub polls: u32,
    pub observed_at: Timestamp,
}

impl JobRecord {
    pub fn new(handle: JobHandle, status: JobStatus, result: Option<serde_json::Value>) -> Self {
        Self {
            handle,
            status,
            result,
            poll_error: None,
            polls: 0,
            observed_at: chrono::Utc::now(),
        }
    }

    /// No further status change can happen for this record: either the
    /// job is terminal or polling for it was abandoned.
    pub fn is_settled(&self) -> bool {
        self.status.is_terminal() || self.poll_error.is_some()
    }
}
