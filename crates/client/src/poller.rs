//! Per-job status polling.
//!
//! [`JobPoller::watch`] spawns one task per job handle. The task queries
//! the job status at a fixed interval, reports intermediate statuses to
//! an update callback, and reports the final outcome to a terminal
//! callback exactly once before exiting. Nothing is polled after a
//! terminal status has been seen.
//!
//! Stopping is idempotent. Once [`JobPoller::stop`] returns, neither
//! callback is invoked again: callbacks run under a per-poller delivery
//! lock that `stop` acquires after cancelling the task. A `stop` issued
//! from inside any poller callback skips that wait (it would otherwise
//! deadlock on its own lock); the cancellation itself still applies.

use std::cell::Cell;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use vton_core::{JobHandle, JobStatus};

use crate::retry::RetryConfig;
use crate::transport::{JobKind, JobTransport, StatusReport, TransportError};

/// Default delay between two status queries of the same job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polling parameters.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between status queries. The first query is issued
    /// immediately.
    pub interval: Duration,
    /// Backoff applied to transient status-query failures.
    pub retry: RetryConfig,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            retry: RetryConfig::default(),
        }
    }
}

/// How polling for a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The service reported `SUCCESS` or `FAILURE`.
    Completed {
        status: JobStatus,
        result: Option<serde_json::Value>,
    },
    /// Status queries failed and polling was given up. The job itself
    /// may still be running remotely.
    Abandoned {
        last_status: Option<JobStatus>,
        error: String,
    },
}

/// Called with every intermediate (`PENDING` / `RUNNING`) status.
pub type UpdateFn = Box<dyn Fn(&JobHandle, JobStatus) + Send + Sync>;

/// Called once with the final outcome.
pub type TerminalFn = Box<dyn FnOnce(&JobHandle, PollOutcome) + Send>;

/// The callbacks a poller reports to.
pub struct PollCallbacks {
    on_update: Option<UpdateFn>,
    on_terminal: TerminalFn,
}

impl PollCallbacks {
    pub fn new(on_terminal: impl FnOnce(&JobHandle, PollOutcome) + Send + 'static) -> Self {
        Self {
            on_update: None,
            on_terminal: Box::new(on_terminal),
        }
    }

    pub fn on_update(mut self, on_update: impl Fn(&JobHandle, JobStatus) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Box::new(on_update));
        self
    }
}

thread_local! {
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// Serializes callback delivery against `stop`.
struct DeliveryGate {
    cancel: CancellationToken,
    lock: Mutex<()>,
}

impl DeliveryGate {
    /// Run `f` unless the poller has been stopped. Returns whether it ran.
    fn deliver(&self, f: impl FnOnce()) -> bool {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.cancel.is_cancelled() {
            return false;
        }
        let _marker = CallbackMarker::enter();
        f();
        true
    }

    fn close(&self) {
        self.cancel.cancel();
        if IN_CALLBACK.with(Cell::get) {
            return;
        }
        // Wait for an in-flight callback; later deliveries see the
        // cancelled token.
        drop(self.lock.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

struct CallbackMarker {
    previous: bool,
}

impl CallbackMarker {
    fn enter() -> Self {
        let previous = IN_CALLBACK.with(|c| c.replace(true));
        Self { previous }
    }
}

impl Drop for CallbackMarker {
    fn drop(&mut self) {
        IN_CALLBACK.with(|c| c.set(self.previous));
    }
}

/// Owned polling task for one job handle.
///
/// Dropping the poller stops it.
pub struct JobPoller {
    handle: JobHandle,
    gate: Arc<DeliveryGate>,
    task: Option<JoinHandle<()>>,
}

impl JobPoller {
    /// Start polling `handle`. Must be called from within a tokio runtime.
    pub fn watch(
        transport: Arc<dyn JobTransport>,
        kind: JobKind,
        handle: JobHandle,
        config: PollConfig,
        callbacks: PollCallbacks,
    ) -> Self {
        Self::watch_with_token(
            transport,
            kind,
            handle,
            config,
            callbacks,
            CancellationToken::new(),
        )
    }

    /// Like [`watch`](Self::watch) but cancelled together with `cancel`
    /// (typically a child of an owner's token).
    pub fn watch_with_token(
        transport: Arc<dyn JobTransport>,
        kind: JobKind,
        handle: JobHandle,
        config: PollConfig,
        callbacks: PollCallbacks,
        cancel: CancellationToken,
    ) -> Self {
        let gate = Arc::new(DeliveryGate {
            cancel,
            lock: Mutex::new(()),
        });

        let task = tokio::spawn(run_poll_loop(PollTask {
            transport,
            kind,
            handle: handle.clone(),
            config,
            gate: Arc::clone(&gate),
            callbacks,
        }));

        Self {
            handle,
            gate,
            task: Some(task),
        }
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    /// Halt polling. Safe to call repeatedly and after the job settled.
    pub fn stop(&self) {
        if !self.gate.cancel.is_cancelled() {
            tracing::debug!(handle = %self.handle, "Stopping poller");
        }
        self.gate.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.gate.cancel.is_cancelled()
    }

    /// Whether the polling task has exited (settled or stopped).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the polling task to exit.
    pub async fn wait(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(handle = %self.handle, "Poller callback panicked");
                }
            }
        }
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.gate.close();
    }
}

struct PollTask {
    transport: Arc<dyn JobTransport>,
    kind: JobKind,
    handle: JobHandle,
    config: PollConfig,
    gate: Arc<DeliveryGate>,
    callbacks: PollCallbacks,
}

async fn run_poll_loop(task: PollTask) {
    let PollTask {
        transport,
        kind,
        handle,
        config,
        gate,
        callbacks,
    } = task;
    let PollCallbacks {
        on_update,
        on_terminal,
    } = callbacks;
    let cancel = gate.cancel.clone();

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_status: Option<JobStatus> = None;
    let mut polls: u32 = 0;

    tracing::debug!(handle = %handle, ?kind, "Polling started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        polls += 1;

        let outcome = match query_status(transport.as_ref(), kind, &handle, &config.retry, &cancel).await {
            Query::Cancelled => break,
            Query::Report(report) if report.status.is_terminal() => {
                tracing::info!(handle = %handle, status = %report.status, polls, "Job reached terminal state");
                PollOutcome::Completed {
                    status: report.status,
                    result: report.result,
                }
            }
            Query::Report(report) => {
                tracing::debug!(handle = %handle, status = %report.status, polls, "Job in progress");
                last_status = Some(report.status);
                if let Some(on_update) = &on_update {
                    gate.deliver(|| on_update(&handle, report.status));
                }
                continue;
            }
            Query::Failed(error) => {
                tracing::error!(handle = %handle, error = %error, polls, "Giving up on job status");
                PollOutcome::Abandoned {
                    last_status,
                    error: error.to_string(),
                }
            }
        };

        gate.deliver(|| on_terminal(&handle, outcome));
        return;
    }

    tracing::debug!(handle = %handle, polls, "Polling stopped");
}

enum Query {
    Report(StatusReport),
    Failed(TransportError),
    Cancelled,
}

/// One status query, with bounded backoff on transient failures.
async fn query_status(
    transport: &dyn JobTransport,
    kind: JobKind,
    handle: &JobHandle,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Query {
    let mut retries = 0u32;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Query::Cancelled,
            result = transport.status(kind, handle) => result,
        };

        match result {
            Ok(report) => return Query::Report(report),
            Err(e) if e.is_transient() && retries < retry.max_retries => {
                retries += 1;
                let delay = retry.delay_for(retries);
                tracing::warn!(
                    handle = %handle,
                    attempt = retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Status query failed, retrying",
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Query::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Query::Failed(e),
        }
    }
}
