use anyhow::Context;
use colored::Colorize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use verdist_server::{ControlPlane, ControlPlaneConfig, FilesResponse, Role, UploadMetadata, VersionsResponse};
use verdist_service::{FeedFilter, PublishFeed};
use verdist_types::FileName;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Ingest(args) => cmd_ingest(config, args).await,
        Command::Consumer(args) => cmd_consumer(config, args).await,
        Command::Serve(args) => cmd_serve(config, args).await,
        Command::Upload(args) => cmd_upload(config, args, format).await,
        Command::Get(args) => cmd_get(config, args).await,
        Command::Info(args) => cmd_info(config, args, format).await,
        Command::Versions(args) => cmd_versions(config, args, format).await,
        Command::Files => cmd_files(config, format).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ControlPlaneConfig> {
    let config = match &cli.config {
        Some(path) => ControlPlaneConfig::load(path)?,
        None => ControlPlaneConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    Ok(config)
}

async fn cmd_ingest(mut config: ControlPlaneConfig, args: ServeOneArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.listen.ingest_addr = bind;
    }
    let plane = ControlPlane::open_as(config, Role::Ingest).await?;
    plane.serve_ingest().await?;
    Ok(())
}

async fn cmd_consumer(mut config: ControlPlaneConfig, args: ServeOneArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.listen.consumer_addr = bind;
    }
    let plane = ControlPlane::open_as(config, Role::Consumer).await?;
    plane.serve_consumer().await?;
    Ok(())
}

async fn cmd_serve(mut config: ControlPlaneConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.ingest_bind {
        config.listen.ingest_addr = bind;
    }
    if let Some(bind) = args.consumer_bind {
        config.listen.consumer_addr = bind;
    }
    let plane = ControlPlane::open(config).await?;
    tokio::spawn(log_feed(plane.feed().clone()));
    plane.serve_all().await?;
    Ok(())
}

async fn log_feed(feed: PublishFeed) {
    let mut stream = feed.subscribe(FeedFilter::default());
    loop {
        match stream.recv().await {
            Ok(event) => info!(
                sequence = event.sequence,
                filename = %event.info.filename,
                version = %event.info.version,
                checksum = %event.info.checksum.short_hex(),
                "new version available"
            ),
            Err(RecvError::Lagged(missed)) => warn!(missed, "publish feed lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn cmd_upload(config: ControlPlaneConfig, args: UploadArgs, format: OutputFormat) -> anyhow::Result<()> {
    let plane = ControlPlane::open_as(config, Role::Ingest).await?;
    let file = tokio::fs::File::open(&args.path)
        .await
        .with_context(|| format!("opening {}", args.path.display()))?;
    let result = plane.ingest().upload(&args.filename, &args.version, file).await?;
    let duplicate = result.duplicate;
    let metadata = UploadMetadata::from(result.record);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&metadata)?),
        OutputFormat::Text => {
            if duplicate {
                println!("{} {}@{} already published", "=".yellow().bold(), metadata.info.filename, metadata.info.version);
            } else {
                println!("{} Published {}@{}", "✓".green().bold(), metadata.info.filename.as_str().bold(), metadata.info.version.as_str().yellow());
            }
            println!("  Checksum: {}", metadata.info.checksum.to_hex().cyan());
            println!("  Size: {} bytes", metadata.info.size);
            println!("  Stored at: {}", metadata.filepath.as_str().dimmed());
        }
    }
    Ok(())
}

async fn cmd_get(config: ControlPlaneConfig, args: GetArgs) -> anyhow::Result<()> {
    let plane = ControlPlane::open_as(config, Role::Consumer).await?;
    let served = match &args.version {
        Some(version) => {
            if args.wait {
                plane.consumer().wait_for_version(&args.filename, version).await?;
            }
            plane.consumer().get_version(&args.filename, version).await?
        }
        None => plane.consumer().get_latest(&args.filename).await?,
    };

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &served.bytes)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!(
                "{} {}@{} → {} ({} bytes)",
                "✓".green().bold(),
                served.record.filename,
                served.record.version.as_str().yellow(),
                path.display(),
                served.bytes.len()
            );
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&served.bytes).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn cmd_info(config: ControlPlaneConfig, args: FileArgs, format: OutputFormat) -> anyhow::Result<()> {
    let plane = ControlPlane::open_as(config, Role::Consumer).await?;
    let info = plane.consumer().get_info(&args.filename).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Text => {
            println!("{} {}", info.filename.as_str().bold(), info.version.as_str().yellow());
            println!("  Checksum: {}", info.checksum.to_hex().cyan());
            println!("  Size: {} bytes", info.size);
            println!("  Uploaded: {}", info.uploaded_at.to_rfc3339());
        }
    }
    Ok(())
}

async fn cmd_versions(config: ControlPlaneConfig, args: FileArgs, format: OutputFormat) -> anyhow::Result<()> {
    let plane = ControlPlane::open_as(config, Role::Consumer).await?;
    let versions = plane.consumer().list_versions(&args.filename).await?;
    match format {
        OutputFormat::Json => {
            let latest = versions
                .first()
                .cloned()
                .context("version list is empty")?;
            let response = VersionsResponse {
                filename: FileName::new(args.filename)?,
                latest,
                versions,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            for (i, version) in versions.iter().enumerate() {
                if i == 0 {
                    println!("* {} {}", version.as_str().green().bold(), "(latest)".dimmed());
                } else {
                    println!("  {}", version);
                }
            }
        }
    }
    Ok(())
}

async fn cmd_files(config: ControlPlaneConfig, format: OutputFormat) -> anyhow::Result<()> {
    let plane = ControlPlane::open_as(config, Role::Consumer).await?;
    let files = plane.consumer().list_files().await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&FilesResponse { files })?),
        OutputFormat::Text => {
            if files.is_empty() {
                println!("{}", "No files published".dimmed());
            }
            for name in &files {
                println!("{}", name);
            }
        }
    }
    Ok(())
}
