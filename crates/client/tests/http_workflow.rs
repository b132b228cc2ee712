//! End-to-end workflows against a mocked HTTP service.

use std::time::Duration;

use assert_matches::assert_matches;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use vton_client::ingestion::{BACKGROUND_REMOVAL, METADATA_EXTRACTION};
use vton_client::tryon::TryOnReport;
use vton_client::{
    ClientConfig, ImagePayload, JobView, OperationOutcome, SubmissionError, TransportError, VtonClient,
};
use vton_core::JobStatus;

const WAIT_LIMIT: Duration = Duration::from_secs(5);

fn client_for(server: &ServerGuard, max_poll_retries: u32) -> VtonClient {
    let config = ClientConfig {
        api_url: format!("{}/api/v1", server.url()),
        media_url: server.url(),
        poll_interval: Duration::from_millis(10),
        max_poll_retries,
        request_timeout: Duration::from_secs(2),
    };
    VtonClient::from_config(config).unwrap()
}

async fn mock_status(server: &mut ServerGuard, path: &str, task_id: &str, status: &str, result: serde_json::Value) -> mockito::Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"task_id": task_id, "status": status, "result": result}).to_string())
        .create_async()
        .await
}

#[tokio::test]
async fn upload_reports_each_job_separately() {
    let mut server = Server::new_async().await;
    let upload = server
        .mock("POST", "/api/v1/ingestion/upload")
        .match_header("content-type", Matcher::Regex("multipart/form-data".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "message": "File uploaded and processing started",
                "file_id": "f1",
                "garment_id": "g1",
                "tasks": {"background_removal": "h1", "metadata_extraction": "h2"},
                "raw_path": "media/raw/f1.png"
            })
            .to_string(),
        )
        .create_async()
        .await;
    let _bg = mock_status(
        &mut server,
        "/api/v1/ingestion/status/h1",
        "h1",
        "SUCCESS",
        json!({"status": "completed", "output_path": r"media\processed\f1.png"}),
    )
    .await;
    // The worker caught its own exception: the queue says SUCCESS.
    let _meta = mock_status(
        &mut server,
        "/api/v1/ingestion/status/h2",
        "h2",
        "SUCCESS",
        json!({"status": "failed", "error": "Gemini quota exceeded"}),
    )
    .await;

    let client = client_for(&server, 3);
    let job = client
        .upload_garment(ImagePayload::new("shirt.png", vec![0x89, b'P', b'N', b'G']))
        .await
        .unwrap();
    assert_eq!(job.garment_id(), Some("g1"));
    assert_eq!(job.raw_path(), Some("media/raw/f1.png"));

    let report = tokio::time::timeout(WAIT_LIMIT, job.wait()).await.unwrap().unwrap();
    let view = job.operation().current_view();

    assert_eq!(view.outcome(), OperationOutcome::PartiallyFailed);
    assert_matches!(view.job(METADATA_EXTRACTION), Some(JobView::Failed { .. }));
    assert_eq!(report.errors[METADATA_EXTRACTION], "Gemini quota exceeded");
    assert!(!report.errors.contains_key(BACKGROUND_REMOVAL));

    let processed = report.background_removal.unwrap();
    assert_eq!(
        processed.url(&client.config().media_url),
        format!("{}/media/processed/f1.png", server.url())
    );
    upload.assert_async().await;
}

#[tokio::test]
async fn try_on_resolves_result_url() {
    let mut server = Server::new_async().await;
    let start = server
        .mock("POST", "/api/v1/tryon/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "task_id": "t1",
                "message": "Try-on started",
                "result_path_placeholder": "media/results/abc_tryon.png"
            })
            .to_string(),
        )
        .create_async()
        .await;
    let _status = mock_status(
        &mut server,
        "/api/v1/tryon/status/t1",
        "t1",
        "SUCCESS",
        json!({"status": "completed", "result_path": r"media\results\abc_tryon.png"}),
    )
    .await;

    let client = client_for(&server, 3);
    let job = client
        .try_on(ImagePayload::new("me.jpg", vec![0xFF, 0xD8]), "g1")
        .await
        .unwrap();
    assert_eq!(
        job.result_path_placeholder().as_deref(),
        Some("media/results/abc_tryon.png")
    );

    let report = tokio::time::timeout(WAIT_LIMIT, job.wait()).await.unwrap().unwrap();
    let TryOnReport::Completed { output } = report else {
        panic!("expected a completed try-on");
    };
    assert_eq!(
        client.media_url(&output.result_path),
        format!("{}/media/results/abc_tryon.png", server.url())
    );
    start.assert_async().await;
}

#[tokio::test]
async fn rejected_upload_starts_no_polling() {
    let mut server = Server::new_async().await;
    let _upload = server
        .mock("POST", "/api/v1/ingestion/upload")
        .with_status(400)
        .with_body(r#"{"detail":"Invalid file type. Only JPEG, PNG, WEBP allowed."}"#)
        .create_async()
        .await;
    let status = server
        .mock("GET", Matcher::Regex("^/api/v1/ingestion/status/.*".into()))
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server, 3);
    let err = client
        .upload_garment(ImagePayload::new("shirt.png", vec![1]))
        .await
        .err()
        .unwrap();

    assert_matches!(err, SubmissionError::Transport(TransportError::Api { status: 400, .. }));
    tokio::time::sleep(Duration::from_millis(50)).await;
    status.assert_async().await;
}

#[tokio::test]
async fn unknown_task_becomes_unreachable() {
    let mut server = Server::new_async().await;
    let _start = server
        .mock("POST", "/api/v1/tryon/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"task_id": "t404", "message": "Try-on started"}).to_string())
        .create_async()
        .await;
    let status = server
        .mock("GET", "/api/v1/tryon/status/t404")
        .with_status(404)
        .with_body(r#"{"detail":"Not Found"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server, 3);
    let job = client
        .try_on(ImagePayload::new("me.png", vec![1]), "g1")
        .await
        .unwrap();

    let view = tokio::time::timeout(WAIT_LIMIT, job.operation().wait_complete())
        .await
        .unwrap()
        .unwrap();
    assert_matches!(
        view.job("try_on"),
        Some(JobView::Unreachable { last_status: JobStatus::Pending, error }) if error.contains("404")
    );
    assert_eq!(view.outcome(), OperationOutcome::Failed);
    status.assert_async().await;
}

#[tokio::test]
async fn bad_gateway_is_retried_until_success() {
    let mut server = Server::new_async().await;
    let _start = server
        .mock("POST", "/api/v1/tryon/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"task_id": "t502", "message": "Try-on started"}).to_string())
        .create_async()
        .await;
    // Mocks answer in creation order until their expected hits are used up.
    let gateway = server
        .mock("GET", "/api/v1/tryon/status/t502")
        .with_status(502)
        .with_body("Bad Gateway")
        .expect(1)
        .create_async()
        .await;
    let status = mock_status(
        &mut server,
        "/api/v1/tryon/status/t502",
        "t502",
        "SUCCESS",
        json!({"status": "completed", "result_path": "media/results/t502_tryon.png"}),
    )
    .await;

    let client = client_for(&server, 3);
    let job = client
        .try_on(ImagePayload::new("me.png", vec![1]), "g1")
        .await
        .unwrap();

    let report = tokio::time::timeout(WAIT_LIMIT, job.wait()).await.unwrap().unwrap();
    assert_matches!(
        report,
        TryOnReport::Completed { ref output } if output.result_path == "media/results/t502_tryon.png"
    );
    let record = job.operation().record("try_on").unwrap();
    assert_eq!(record.status, JobStatus::Success);
    assert!(record.poll_error.is_none());
    gateway.assert_async().await;
    status.assert_async().await;
}

#[tokio::test]
async fn opaque_handle_is_polled_at_its_own_path() {
    let mut server = Server::new_async().await;
    let _start = server
        .mock("POST", "/api/v1/tryon/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"task_id": "t1?x=1", "message": "Try-on started"}).to_string())
        .create_async()
        .await;
    let other_job = server
        .mock("GET", Matcher::Regex("^/api/v1/tryon/status/t1($|[/?])".into()))
        .with_status(200)
        .with_body(json!({"task_id": "t1", "status": "SUCCESS", "result": {"result_path": "other-job.png"}}).to_string())
        .expect(0)
        .create_async()
        .await;
    let own_job = mock_status(
        &mut server,
        "/api/v1/tryon/status/t1%3Fx=1",
        "t1?x=1",
        "SUCCESS",
        json!({"status": "completed", "result_path": "media/results/own_tryon.png"}),
    )
    .await;

    let client = client_for(&server, 3);
    let job = client
        .try_on(ImagePayload::new("me.png", vec![1]), "g1")
        .await
        .unwrap();

    let report = tokio::time::timeout(WAIT_LIMIT, job.wait()).await.unwrap().unwrap();
    assert_matches!(
        report,
        TryOnReport::Completed { ref output } if output.result_path == "media/results/own_tryon.png"
    );
    own_job.assert_async().await;
    other_job.assert_async().await;
}
