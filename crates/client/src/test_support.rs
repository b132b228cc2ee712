//! In-memory [`JobTransport`] with scripted responses for unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use vton_core::{JobHandle, JobStatus};

use crate::transport::{ImagePayload, JobKind, JobTransport, StatusReport, SubmitReceipt, TransportError};

/// One scripted answer to a status query. `Transient` answers 503,
/// `Permanent` answers 404.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Status(JobStatus),
    Success(serde_json::Value),
    Failure(serde_json::Value),
    Transient(&'static str),
    Permanent(&'static str),
}

#[derive(Debug, Clone)]
enum SubmitScript {
    Accept(BTreeMap<String, JobHandle>),
    Reject(u16),
}

/// Answers status queries from per-handle scripts. Each query consumes
/// the next step; the last step repeats forever. Unscripted handles get
/// a 404.
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<JobHandle, VecDeque<Step>>>,
    calls: Mutex<HashMap<JobHandle, u32>>,
    submission: Mutex<Option<SubmitScript>>,
    submit_calls: AtomicU32,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            submission: Mutex::new(None),
            submit_calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn script(&self, handle: &str, steps: Vec<Step>) {
        assert!(!steps.is_empty(), "a script needs at least one step");
        self.scripts
            .lock()
            .unwrap()
            .insert(JobHandle::new(handle), steps.into());
    }

    pub(crate) fn calls(&self, handle: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&JobHandle::new(handle))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn accept_submission(&self, handles: &[(&str, &str)]) {
        let handles = handles
            .iter()
            .map(|(name, id)| (name.to_string(), JobHandle::new(*id)))
            .collect();
        *self.submission.lock().unwrap() = Some(SubmitScript::Accept(handles));
    }

    pub(crate) fn reject_submission(&self, status: u16) {
        *self.submission.lock().unwrap() = Some(SubmitScript::Reject(status));
    }

    pub(crate) fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    fn next_receipt(&self) -> Result<SubmitReceipt, TransportError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.submission.lock().unwrap().clone();
        match script {
            Some(SubmitScript::Accept(handles)) => Ok(SubmitReceipt {
                handles,
                details: serde_json::json!({"garment_id": "g1"}),
            }),
            Some(SubmitScript::Reject(status)) => Err(TransportError::Api {
                status,
                body: "rejected".into(),
            }),
            None => Err(TransportError::Api {
                status: 500,
                body: "no submission scripted".into(),
            }),
        }
    }

    fn next_step(&self, handle: &JobHandle) -> Option<Step> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(handle)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl JobTransport for ScriptedTransport {
    async fn submit_garment(&self, _image: &ImagePayload) -> Result<SubmitReceipt, TransportError> {
        self.next_receipt()
    }

    async fn submit_try_on(
        &self,
        _person_image: &ImagePayload,
        _garment_id: &str,
    ) -> Result<SubmitReceipt, TransportError> {
        self.next_receipt()
    }

    async fn status(&self, _kind: JobKind, handle: &JobHandle) -> Result<StatusReport, TransportError> {
        *self.calls.lock().unwrap().entry(handle.clone()).or_default() += 1;

        match self.next_step(handle) {
            Some(Step::Status(status)) => Ok(StatusReport::new(status, None)),
            Some(Step::Success(result)) => Ok(StatusReport::new(JobStatus::Success, Some(result))),
            Some(Step::Failure(error)) => Ok(StatusReport::new(JobStatus::Failure, Some(error))),
            Some(Step::Transient(msg)) => Err(TransportError::Api {
                status: 503,
                body: msg.into(),
            }),
            Some(Step::Permanent(msg)) => Err(TransportError::Api {
                status: 404,
                body: msg.into(),
            }),
            None => Err(TransportError::Api {
                status: 404,
                body: format!("unknown task {handle}"),
            }),
        }
    }
}
