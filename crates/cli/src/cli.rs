use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "vton")]
#[command(about = "Submit garments and try-on requests to a VTON service and follow their jobs.")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Upload a garment image and wait for background removal and metadata extraction.
    Upload {
        /// JPEG, PNG or WEBP image of the garment.
        image: PathBuf,

        /// Extra form fields sent with the upload, as KEY=VALUE.
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,

        /// Print the submitted handles and exit without polling.
        #[arg(long)]
        no_wait: bool,
    },
    /// Composite a processed garment onto a person image.
    TryOn {
        /// JPEG, PNG or WEBP photo of the person.
        person_image: PathBuf,

        /// Garment id returned by `vton upload`.
        garment_id: String,

        /// Print the submitted handle and exit without polling.
        #[arg(long)]
        no_wait: bool,
    },
    /// Query the status of one job once.
    Status {
        /// Job handle.
        handle: String,

        /// The handle belongs to a try-on job (default: ingestion).
        #[arg(long)]
        try_on: bool,
    },
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("attribute key must not be empty".into());
    }
    Ok((key.to_string(), value.to_string()))
}
