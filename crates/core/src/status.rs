//! Job lifecycle status.
//!
//! The remote task queue reports a richer vocabulary than the four
//! states the client cares about; [`JobStatus::parse`] folds it down.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle state of a remote job.
///
/// Transitions only move forward: `Pending` may be followed by any state,
/// `Running` by anything but `Pending`, and `Success` and `Failure` are
/// final. Repeating the current non-terminal state is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl JobStatus {
    /// Map a status string from the wire onto a [`JobStatus`].
    ///
    /// Matching is case-insensitive.
    ///
    /// | Wire value                                        | Status    |
    /// |---------------------------------------------------|-----------|
    /// | `PENDING`                                         | `Pending` |
    /// | `RECEIVED`, `STARTED`, `RETRY`, `RUNNING`, `PROGRESS` | `Running` |
    /// | `SUCCESS`                                         | `Success` |
    /// | `FAILURE`, `REVOKED`                              | `Failure` |
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RECEIVED" | "STARTED" | "RETRY" | "RUNNING" | "PROGRESS" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" | "REVOKED" => Ok(Self::Failure),
            _ => Err(CoreError::UnknownStatus(raw.to_string())),
        }
    }

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    /// `true` for `Success` and `Failure`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Success | Self::Failure => 2,
        }
    }

    /// Whether a record currently in `self` may be replaced by `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JobStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}
