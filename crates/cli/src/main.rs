//! `vton` -- command-line client for the VTON processing service.
//!
//! Uploads garments, requests try-ons and follows their jobs until they
//! settle. Progress goes to stderr; the final result is printed to stdout
//! as JSON.
//!
//! # Environment variables
//!
//! | Variable                    | Default                        | Description                        |
//! |-----------------------------|--------------------------------|------------------------------------|
//! | `VTON_API_URL`              | `http://localhost:8000/api/v1` | API root                           |
//! | `VTON_MEDIA_URL`            | `http://localhost:8000`        | Base URL of media paths            |
//! | `VTON_POLL_INTERVAL_MS`     | `2000`                         | Delay between status queries       |
//! | `VTON_POLL_MAX_RETRIES`     | `3`                            | Retries of a failing status query  |
//! | `VTON_REQUEST_TIMEOUT_SECS` | `30`                           | Per-request HTTP timeout           |
//! | `VTON_LOG_JSON`             | unset                          | `1` switches logs to JSON          |
//! | `RUST_LOG`                  | `vton_client=info,vton=info`   | Log filter                         |

mod cli;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vton_client::events::JobEvent;
use vton_client::ingestion::IngestionReport;
use vton_client::tryon::TryOnReport;
use vton_client::{ClientConfig, ImagePayload, JobKind, LogicalOperation, OperationOutcome, OperationView, VtonClient};
use vton_core::JobHandle;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    tracing::debug!(api_url = %config.api_url, "Loaded configuration");
    let client = VtonClient::from_config(config)?;

    match cli.command {
        Command::Upload {
            image,
            attributes,
            no_wait,
        } => upload(&client, &image, attributes, no_wait).await,
        Command::TryOn {
            person_image,
            garment_id,
            no_wait,
        } => try_on(&client, &person_image, &garment_id, no_wait).await,
        Command::Status { handle, try_on } => {
            let kind = if try_on { JobKind::TryOn } else { JobKind::Ingestion };
            status(&client, kind, &handle).await
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vton_client=info,vton=info".into());
    let json_logs = std::env::var("VTON_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn load_image(path: &Path) -> anyhow::Result<ImagePayload> {
    ImagePayload::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn upload(
    client: &VtonClient,
    path: &Path,
    attributes: Vec<(String, String)>,
    no_wait: bool,
) -> anyhow::Result<()> {
    let image = attributes
        .into_iter()
        .fold(load_image(path).await?, |image, (key, value)| image.with_attribute(key, value));

    let upload = client.upload_garment(image).await?;
    let operation = upload.operation();
    if no_wait {
        print_json(&json!({
            "garment_id": upload.garment_id(),
            "raw_path": upload.raw_path(),
            "handles": operation.handles(),
        }))?;
        return Ok(());
    }

    let view = follow(operation).await?;
    let report = IngestionReport::from_view(&view);
    let processed_url = report
        .background_removal
        .as_ref()
        .map(|out| client.media_url(&out.output_path));

    print_json(&json!({
        "garment_id": upload.garment_id(),
        "outcome": view.outcome(),
        "processed_url": processed_url,
        "report": report,
        "jobs": view.jobs,
    }))?;
    ensure_succeeded(&view)
}

async fn try_on(client: &VtonClient, path: &Path, garment_id: &str, no_wait: bool) -> anyhow::Result<()> {
    let person_image = load_image(path).await?;
    let job = client.try_on(person_image, garment_id).await?;
    if no_wait {
        print_json(&json!({
            "handles": job.operation().handles(),
            "result_path_placeholder": job.result_path_placeholder(),
        }))?;
        return Ok(());
    }

    let view = follow(job.operation()).await?;
    let report = TryOnReport::from_view(&view);
    let result_url = match &report {
        TryOnReport::Completed { output } => Some(client.media_url(&output.result_path)),
        _ => None,
    };

    print_json(&json!({
        "outcome": view.outcome(),
        "result_url": result_url,
        "report": report,
    }))?;
    ensure_succeeded(&view)
}

async fn status(client: &VtonClient, kind: JobKind, handle: &str) -> anyhow::Result<()> {
    let handle = JobHandle::new(handle);
    let report = client.status(kind, &handle).await?;
    print_json(&json!({
        "handle": handle,
        "kind": kind,
        "status": report.status,
        "result": report.result,
    }))
}

/// Print job events until the operation completes. Ctrl-C stops polling.
async fn follow(operation: &LogicalOperation) -> anyhow::Result<OperationView> {
    let mut events = operation.subscribe();

    loop {
        if operation.is_complete() {
            return Ok(operation.current_view());
        }

        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Progress output fell behind");
                }
                Err(RecvError::Closed) => anyhow::bail!("Operation {} ended unexpectedly", operation.id()),
            },
            _ = tokio::signal::ctrl_c() => {
                operation.stop();
                anyhow::bail!("Interrupted; stopped polling operation {}", operation.id());
            }
        }
    }
}

fn print_event(event: &JobEvent) {
    match event {
        JobEvent::JobProgress { name, status, .. } => eprintln!("  {name}: {status}"),
        JobEvent::JobSucceeded { name, .. } => eprintln!("  {name}: done"),
        JobEvent::JobFailed { name, error, .. } => eprintln!("  {name}: failed ({error})"),
        JobEvent::JobUnreachable { name, error, .. } => eprintln!("  {name}: unreachable ({error})"),
        JobEvent::OperationCompleted { outcome, .. } => eprintln!("finished: {outcome:?}"),
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ensure_succeeded(view: &OperationView) -> anyhow::Result<()> {
    match view.outcome() {
        OperationOutcome::Succeeded => Ok(()),
        outcome => anyhow::bail!("Operation {} finished as {outcome:?}", view.operation_id),
    }
}
