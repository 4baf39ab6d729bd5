//! Ferry Uploadr - large-file uploader for presigned object storage

use anyhow::Context;
use clap::Parser;
use ferry_uploadr::config::{Config, ConfigLoader};
use ferry_uploadr::upload::{UploadResult, Uploader};
use ferry_uploadr::{logging, metrics};
use std::path::{Path, PathBuf};
use tracing::info;

/// Ferry Uploadr - upload a file through presigned requests
#[derive(Parser, Debug)]
#[command(name = "ferry-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File to upload
    file: PathBuf,

    /// Application the upload belongs to
    #[arg(long)]
    app_id: u64,

    /// Environment the upload belongs to
    #[arg(long)]
    env_id: u64,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Signing service URL (overrides the configuration file)
    #[arg(long)]
    endpoint: Option<String>,

    /// Bearer token for the signing service (overrides the configuration file)
    #[arg(long)]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Write Prometheus metrics to this file when done
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match (&args.config, &args.endpoint) {
        (Some(path), _) => ConfigLoader::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        (None, Some(endpoint)) => Config::for_endpoint(endpoint.clone()),
        (None, None) => anyhow::bail!("either --config or --endpoint is required"),
    };

    if let Some(endpoint) = &args.endpoint {
        config.signing.endpoint = endpoint.clone();
    }
    if let Some(token) = &args.token {
        config.signing.token = Some(token.clone());
    }
    if args.no_progress {
        config.upload.show_progress = false;
    }

    config.validate()?;
    Ok(config)
}

fn write_metrics(path: &Path) -> anyhow::Result<()> {
    let text = metrics::gather_text()?;
    std::fs::write(path, text)
        .with_context(|| format!("writing metrics to {}", path.display()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init_subscriber(&args.log_level, args.json_logs)?;

    info!("Starting Ferry Uploadr v{}", ferry_uploadr::VERSION);

    let config = load_config(&args)?;
    info!(endpoint = %config.signing.endpoint, "Loaded configuration");

    let uploader = Uploader::from_config(&config)?;
    let outcome = uploader.upload(&args.file, args.app_id, args.env_id).await;

    if let Some(path) = &args.metrics_out {
        write_metrics(path)?;
    }

    let outcome = outcome.with_context(|| format!("uploading {}", args.file.display()))?;

    println!("basename: {}", outcome.file_meta.basename);
    println!("md5: {}", outcome.file_meta.md5);
    println!("compressed: {}", outcome.file_meta.is_compressed);
    println!("strategy: {}", outcome.strategy.as_str());
    match &outcome.result {
        UploadResult::PutObject(result) => {
            println!("etag: {}", result.etag.as_deref().unwrap_or("-"));
            println!("bytes: {}", result.bytes_written);
        }
        UploadResult::Multipart(result) => {
            println!("etag: {}", result.etag.as_deref().unwrap_or("-"));
            if let Some(location) = &result.location {
                println!("location: {}", location);
            }
        }
    }

    Ok(())
}
