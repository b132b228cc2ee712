//! Latest known record per job handle.
//!
//! Each handle is written only by the poller that owns it; any number
//! of readers take snapshots. Records are monotonic: a status never
//! moves backwards, and once a record is settled (terminal status or
//! abandoned polling) every further write for that handle is rejected
//! and the record stays as it was.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use vton_core::{CoreError, JobHandle, JobRecord, JobStatus};

#[derive(Debug, Default)]
pub struct ResultStore {
    records: RwLock<HashMap<JobHandle, JobRecord>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed status, replacing the previous record wholesale.
    ///
    /// The result is dropped for non-terminal statuses.
    pub fn put(
        &self,
        handle: &JobHandle,
        status: JobStatus,
        result: Option<serde_json::Value>,
    ) -> Result<JobRecord, CoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);

        let polls = match records.get(handle) {
            Some(existing) if existing.is_settled() => {
                return Err(CoreError::AlreadySettled {
                    handle: handle.clone(),
                    current: existing.status,
                });
            }
            Some(existing) if !existing.status.can_transition_to(status) => {
                return Err(CoreError::Regressed {
                    handle: handle.clone(),
                    current: existing.status,
                    next: status,
                });
            }
            Some(existing) => existing.polls + 1,
            None => 1,
        };

        let result = if status.is_terminal() { result } else { None };
        let record = JobRecord {
            polls,
            ..JobRecord::new(handle.clone(), status, result)
        };
        records.insert(handle.clone(), record.clone());
        Ok(record)
    }

    /// Record that polling for `handle` was abandoned. The last observed
    /// status is kept.
    pub fn mark_unreachable(&self, handle: &JobHandle, error: impl Into<String>) -> Result<JobRecord, CoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);

        let record = records
            .entry(handle.clone())
            .or_insert_with(|| JobRecord::new(handle.clone(), JobStatus::Pending, None));
        if record.is_settled() {
            return Err(CoreError::AlreadySettled {
                handle: handle.clone(),
                current: record.status,
            });
        }

        record.poll_error = Some(error.into());
        record.observed_at = chrono::Utc::now();
        Ok(record.clone())
    }

    pub fn get(&self, handle: &JobHandle) -> Option<JobRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned()
    }

    pub fn snapshot(&self) -> HashMap<JobHandle, JobRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
