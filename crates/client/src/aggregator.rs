//! Merged view over the jobs of one logical operation.
//!
//! [`JobAggregator::register`] turns a [`Submission`] into a
//! [`LogicalOperation`]: one [`JobPoller`] per named handle, a shared
//! [`ResultStore`], and an [`OperationView`] that is recomputed and
//! republished (via [`tokio::sync::watch`]) after every recorded update.
//!
//! Jobs settle independently and in any order; the view is always
//! rebuilt from the store, so the final view does not depend on the
//! order in which updates arrived. Failures are kept per job and never
//! folded into a single success flag.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vton_core::{CoreError, JobHandle, JobRecord, JobStatus};

use crate::events::JobEvent;
use crate::poller::{JobPoller, PollCallbacks, PollConfig, PollOutcome};
use crate::store::ResultStore;
use crate::submitter::Submission;
use crate::transport::{JobKind, JobTransport};

/// Broadcast channel capacity for job events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Hook invoked once when every job of an operation has settled.
pub type CompletionHook = Box<dyn FnOnce(&OperationView) + Send>;

/// State of one job as seen by consumers of the merged view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobView {
    /// Not settled yet. `status` is the latest observed status.
    Pending { status: JobStatus },
    Succeeded { result: serde_json::Value },
    Failed { error: serde_json::Value },
    /// Polling was abandoned after status queries kept failing.
    Unreachable { last_status: JobStatus, error: String },
}

impl JobView {
    fn from_record(record: Option<&JobRecord>) -> Self {
        let Some(record) = record else {
            return Self::Pending {
                status: JobStatus::Pending,
            };
        };

        if let Some(error) = &record.poll_error {
            return Self::Unreachable {
                last_status: record.status,
                error: error.clone(),
            };
        }

        let payload = || record.result.clone().unwrap_or(serde_json::Value::Null);
        match record.status {
            JobStatus::Success => Self::Succeeded { result: payload() },
            JobStatus::Failure => Self::Failed { error: payload() },
            status => Self::Pending { status },
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }

    /// The success payload, if the job succeeded.
    pub fn result(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Succeeded { result } => Some(result),
            _ => None,
        }
    }

    /// Human-readable reason for a failed or unreachable job.
    ///
    /// Worker error payloads are usually `{"error": "..."}` or a bare
    /// string; anything else is rendered as JSON.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Failed { error } => Some(
                error
                    .get("error")
                    .and_then(serde_json::Value::as_str)
                    .or_else(|| error.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
            ),
            Self::Unreachable { error, .. } => Some(error.clone()),
            _ => None,
        }
    }
}

/// Summary of an operation's merged state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationOutcome {
    InProgress,
    Succeeded,
    /// Some jobs succeeded and some failed or became unreachable.
    PartiallyFailed,
    Failed,
}

/// Snapshot of every job of a logical operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationView {
    pub operation_id: Uuid,
    pub jobs: BTreeMap<String, JobView>,
    /// `true` once every job has settled, whatever the individual outcome.
    pub complete: bool,
}

impl OperationView {
    pub fn job(&self, name: &str) -> Option<&JobView> {
        self.jobs.get(name)
    }

    /// Success payload of the named job, if it succeeded.
    pub fn result(&self, name: &str) -> Option<&serde_json::Value> {
        self.job(name).and_then(JobView::result)
    }

    /// Success payload per job name (`None` while pending or failed).
    pub fn results(&self) -> BTreeMap<&str, Option<&serde_json::Value>> {
        self.jobs
            .iter()
            .map(|(name, view)| (name.as_str(), view.result()))
            .collect()
    }

    pub fn outcome(&self) -> OperationOutcome {
        if !self.complete {
            return OperationOutcome::InProgress;
        }
        let succeeded = self
            .jobs
            .values()
            .filter(|v| matches!(v, JobView::Succeeded { .. }))
            .count();
        if succeeded == self.jobs.len() {
            OperationOutcome::Succeeded
        } else if succeeded == 0 {
            OperationOutcome::Failed
        } else {
            OperationOutcome::PartiallyFailed
        }
    }
}

/// Errors surfaced by a [`LogicalOperation`].
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("Operation {0} was stopped before all jobs settled")]
    Stopped(Uuid),
}

/// Registers submissions and starts polling their jobs.
pub struct JobAggregator {
    transport: Arc<dyn JobTransport>,
    config: PollConfig,
}

impl JobAggregator {
    pub fn new(transport: Arc<dyn JobTransport>, config: PollConfig) -> Self {
        Self { transport, config }
    }

    /// Start polling every job of `submission`. Must be called from within
    /// a tokio runtime.
    pub fn register(&self, submission: Submission) -> LogicalOperation {
        self.register_inner(submission, None)
    }

    /// Like [`register`](Self::register), with a hook that runs once when
    /// the operation completes.
    pub fn register_with_hook(
        &self,
        submission: Submission,
        on_complete: impl FnOnce(&OperationView) + Send + 'static,
    ) -> LogicalOperation {
        self.register_inner(submission, Some(Box::new(on_complete)))
    }

    fn register_inner(&self, submission: Submission, on_complete: Option<CompletionHook>) -> LogicalOperation {
        let Submission {
            kind,
            handles,
            details,
        } = submission;
        let operation_id = Uuid::now_v7();

        let (view_tx, _) = watch::channel(OperationView {
            operation_id,
            jobs: BTreeMap::new(),
            complete: false,
        });
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let state = Arc::new(OperationState {
            operation_id,
            jobs: handles.clone(),
            store: ResultStore::new(),
            view_tx,
            event_tx,
            on_complete: Mutex::new(on_complete),
            completed: AtomicBool::new(false),
        });
        state.republish();

        let cancel = CancellationToken::new();
        let pollers = handles
            .iter()
            .map(|(name, handle)| {
                let update_state = Arc::clone(&state);
                let update_name = name.clone();
                let terminal_state = Arc::clone(&state);
                let terminal_name = name.clone();

                let callbacks = PollCallbacks::new(move |handle, outcome| {
                    terminal_state.record_outcome(&terminal_name, handle, outcome)
                })
                .on_update(move |handle, status| update_state.record_progress(&update_name, handle, status));

                JobPoller::watch_with_token(
                    Arc::clone(&self.transport),
                    kind,
                    handle.clone(),
                    self.config.clone(),
                    callbacks,
                    cancel.child_token(),
                )
            })
            .collect();

        tracing::info!(
            operation_id = %operation_id,
            ?kind,
            jobs = handles.len(),
            "Registered logical operation",
        );

        LogicalOperation {
            operation_id,
            kind,
            handles,
            details,
            state,
            pollers,
            cancel,
        }
    }
}

/// A set of jobs submitted together, polled until each one settles.
///
/// Dropping the operation stops all of its pollers.
pub struct LogicalOperation {
    operation_id: Uuid,
    kind: JobKind,
    handles: BTreeMap<String, JobHandle>,
    details: serde_json::Value,
    state: Arc<OperationState>,
    pollers: Vec<JobPoller>,
    cancel: CancellationToken,
}

impl LogicalOperation {
    pub fn id(&self) -> Uuid {
        self.operation_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn handles(&self) -> &BTreeMap<String, JobHandle> {
        &self.handles
    }

    /// Extra fields returned with the submission (e.g. `garment_id`).
    pub fn details(&self) -> &serde_json::Value {
        &self.details
    }

    /// The most recently published merged view.
    pub fn current_view(&self) -> OperationView {
        self.state.view_tx.borrow().clone()
    }

    pub fn is_complete(&self) -> bool {
        self.state.view_tx.borrow().complete
    }

    /// Latest raw store record of the named job.
    pub fn record(&self, name: &str) -> Option<JobRecord> {
        self.handles.get(name).and_then(|h| self.state.store.get(h))
    }

    /// Receive every republished view.
    pub fn subscribe_view(&self) -> watch::Receiver<OperationView> {
        self.state.view_tx.subscribe()
    }

    /// Receive per-job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.state.event_tx.subscribe()
    }

    /// Wait until every job has settled and return the final view.
    pub async fn wait_complete(&self) -> Result<OperationView, OperationError> {
        let mut rx = self.state.view_tx.subscribe();
        tokio::select! {
            biased;
            result = rx.wait_for(|view| view.complete) => match result {
                Ok(view) => Ok(view.clone()),
                Err(_) => Err(OperationError::Stopped(self.operation_id)),
            },
            _ = self.cancel.cancelled() => Err(OperationError::Stopped(self.operation_id)),
        }
    }

    /// Stop polling every job. Idempotent.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(operation_id = %self.operation_id, "Stopping logical operation");
        }
        self.cancel.cancel();
        for poller in &self.pollers {
            poller.stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for LogicalOperation {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State shared between an operation and its pollers' callbacks.
struct OperationState {
    operation_id: Uuid,
    jobs: BTreeMap<String, JobHandle>,
    store: ResultStore,
    view_tx: watch::Sender<OperationView>,
    event_tx: broadcast::Sender<JobEvent>,
    on_complete: Mutex<Option<CompletionHook>>,
    completed: AtomicBool,
}

impl OperationState {
    fn record_progress(&self, name: &str, handle: &JobHandle, status: JobStatus) {
        match self.store.put(handle, status, None) {
            Ok(_) => {}
            // The queue reports PENDING for results it no longer knows.
            Err(e @ CoreError::Regressed { .. }) => {
                tracing::debug!(operation_id = %self.operation_id, job = name, error = %e, "Ignored stale status");
                return;
            }
            Err(e) => {
                tracing::warn!(operation_id = %self.operation_id, job = name, error = %e, "Dropped status update");
                return;
            }
        }

        let _ = self.event_tx.send(JobEvent::JobProgress {
            operation_id: self.operation_id,
            name: name.to_string(),
            handle: handle.clone(),
            status,
        });
        self.republish();
    }

    fn record_outcome(&self, name: &str, handle: &JobHandle, outcome: PollOutcome) {
        let recorded = match outcome {
            PollOutcome::Completed { status, result } => self
                .store
                .put(handle, status, result.clone())
                .map(|_| {
                    let payload = result.unwrap_or(serde_json::Value::Null);
                    if status == JobStatus::Success {
                        tracing::info!(operation_id = %self.operation_id, job = name, handle = %handle, "Job succeeded");
                        JobEvent::JobSucceeded {
                            operation_id: self.operation_id,
                            name: name.to_string(),
                            handle: handle.clone(),
                            result: payload,
                        }
                    } else {
                        tracing::warn!(operation_id = %self.operation_id, job = name, handle = %handle, error = %payload, "Job failed");
                        JobEvent::JobFailed {
                            operation_id: self.operation_id,
                            name: name.to_string(),
                            handle: handle.clone(),
                            error: payload,
                        }
                    }
                }),
            PollOutcome::Abandoned { error, .. } => self.store.mark_unreachable(handle, error.clone()).map(|_| {
                tracing::warn!(operation_id = %self.operation_id, job = name, handle = %handle, error = %error, "Job unreachable");
                JobEvent::JobUnreachable {
                    operation_id: self.operation_id,
                    name: name.to_string(),
                    handle: handle.clone(),
                    error,
                }
            }),
        };

        match recorded {
            Ok(event) => {
                let _ = self.event_tx.send(event);
                self.republish();
            }
            Err(e) => {
                tracing::warn!(operation_id = %self.operation_id, job = name, error = %e, "Dropped terminal update");
            }
        }
    }

    fn compute_view(&self) -> OperationView {
        let jobs: BTreeMap<String, JobView> = self
            .jobs
            .iter()
            .map(|(name, handle)| {
                let record = self.store.get(handle);
                (name.clone(), JobView::from_record(record.as_ref()))
            })
            .collect();
        let complete = jobs.values().all(JobView::is_settled);

        OperationView {
            operation_id: self.operation_id,
            jobs,
            complete,
        }
    }

    /// Rebuild the view from the store and publish it. The rebuild runs
    /// under the channel's write lock, so the last publish always reflects
    /// the last store write.
    fn republish(&self) {
        let mut completed_now = None;
        self.view_tx.send_modify(|view| {
            *view = self.compute_view();
            if view.complete && !self.completed.swap(true, Ordering::SeqCst) {
                completed_now = Some(view.clone());
            }
        });

        let Some(view) = completed_now else {
            return;
        };

        let outcome = view.outcome();
        tracing::info!(operation_id = %self.operation_id, ?outcome, "Logical operation complete");
        let _ = self.event_tx.send(JobEvent::OperationCompleted {
            operation_id: self.operation_id,
            outcome,
        });

        let hook = self
            .on_complete
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook(&view);
        }
    }
}
