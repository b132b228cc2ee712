//! Virtual try-on workflow: one job compositing a processed garment onto
//! a person image.

use serde::{Deserialize, Serialize};

use crate::aggregator::{JobView, LogicalOperation, OperationError, OperationView};
use crate::ingestion::DecodeError;
use crate::media;

/// Logical name of the try-on job.
pub const TRY_ON: &str = "try_on";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryOnOutput {
    /// Media path of the composited image.
    pub result_path: String,
}

impl TryOnOutput {
    pub fn from_result(result: &serde_json::Value) -> Result<Self, DecodeError> {
        let path = result
            .get("result_path")
            .and_then(serde_json::Value::as_str)
            .ok_or(DecodeError::MissingField("result_path"))?;
        Ok(Self {
            result_path: media::normalize_path(path),
        })
    }

    pub fn url(&self, media_base: &str) -> String {
        media::media_url(media_base, &self.result_path)
    }
}

/// Decoded outcome of a settled try-on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TryOnReport {
    Completed { output: TryOnOutput },
    Failed { error: String },
    Pending,
}

impl TryOnReport {
    pub fn from_view(view: &OperationView) -> Self {
        let Some(job) = view.job(TRY_ON) else {
            return Self::Pending;
        };
        if let Some(error) = job.error_message() {
            return Self::Failed { error };
        }
        match job {
            JobView::Succeeded { result } => match TryOnOutput::from_result(result) {
                Ok(output) => Self::Completed { output },
                Err(e) => Self::Failed { error: e.to_string() },
            },
            _ => Self::Pending,
        }
    }
}

/// A try-on request whose job is being polled.
pub struct TryOnJob {
    operation: LogicalOperation,
}

impl TryOnJob {
    pub(crate) fn new(operation: LogicalOperation) -> Self {
        Self { operation }
    }

    /// Where the service announced it will write the result.
    pub fn result_path_placeholder(&self) -> Option<String> {
        self.operation
            .details()
            .get("result_path_placeholder")?
            .as_str()
            .map(media::normalize_path)
    }

    pub fn operation(&self) -> &LogicalOperation {
        &self.operation
    }

    pub async fn wait(&self) -> Result<TryOnReport, OperationError> {
        let view = self.operation.wait_complete().await?;
        Ok(TryOnReport::from_view(&view))
    }

    pub fn stop(&self) {
        self.operation.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;
    use uuid::Uuid;
    use vton_core::JobStatus;

    use super::*;

    fn view(job: JobView) -> OperationView {
        OperationView {
            operation_id: Uuid::nil(),
            complete: job.is_settled(),
            jobs: BTreeMap::from([(TRY_ON.to_string(), job)]),
        }
    }

    #[test]
    fn completed_try_on() {
        let report = TryOnReport::from_view(&view(JobView::Succeeded {
            result: json!({"status": "completed", "result_path": r"media\results\abc_tryon.png"}),
        }));

        let TryOnReport::Completed { output } = report else {
            panic!("expected completed try-on");
        };
        assert_eq!(output.result_path, "media/results/abc_tryon.png");
        assert_eq!(
            output.url("http://localhost:8000"),
            "http://localhost:8000/media/results/abc_tryon.png"
        );
    }

    #[test]
    fn failed_try_on_carries_worker_error() {
        let report = TryOnReport::from_view(&view(JobView::Failed {
            error: json!({"status": "failed", "error": "Garment not found"}),
        }));
        assert_eq!(
            report,
            TryOnReport::Failed {
                error: "Garment not found".into()
            }
        );
    }

    #[test]
    fn missing_result_path_is_a_failure() {
        let report = TryOnReport::from_view(&view(JobView::Succeeded {
            result: json!({"status": "completed"}),
        }));
        assert!(matches!(report, TryOnReport::Failed { error } if error.contains("result_path")));
    }

    #[test]
    fn running_try_on_is_pending() {
        let report = TryOnReport::from_view(&view(JobView::Pending {
            status: JobStatus::Running,
        }));
        assert_eq!(report, TryOnReport::Pending);
    }
}
