use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use clip_uploader::auth::{ClientSecrets, CredentialStore, GoogleOAuth};
use clip_uploader::config::Config;
use clip_uploader::logging::init_tracing;
use clip_uploader::metadata::MetadataResolver;
use clip_uploader::queue::{QueueEvent, QueueManager, QueueManagerHandle};
use clip_uploader::upload::{TransferStatus, YouTubeClient};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in with the browser and store the credentials
    Login,
    /// Upload video files one after another
    Upload {
        /// Video files, uploaded in the given order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let _log_guard = init_tracing(&config.logging)?;

    let client = reqwest::Client::new();
    let provider = GoogleOAuth::new(client.clone())
        .with_endpoints(&config.endpoints.auth_url, &config.endpoints.token_url);
    let store = Arc::new(CredentialStore::new(&config.token_path, Arc::new(provider)));

    match args.command {
        Commands::Login => {
            let auth = config.interactive_auth(read_secrets(&config)?);
            store.acquire_interactively(&auth).await.context("Sign in failed")?;
            tracing::info!("Signed in");
        }
        Commands::Upload { files } => {
            if store.needs_consent().await {
                let auth = config.interactive_auth(read_secrets(&config)?);
                store.acquire_interactively(&auth).await.context("Sign in failed")?;
            }

            let host = Arc::new(YouTubeClient::with_api_base(client, &config.endpoints.api_base));
            let handle = QueueManager::new(store, host, config.transfer_options());
            upload_files(&handle, &config, files).await?;
            handle.shutdown().await?;
        }
    }

    Ok(())
}

fn read_secrets(config: &Config) -> Result<ClientSecrets> {
    ClientSecrets::from_file(&config.client_secrets)
        .with_context(|| format!("Failed to read client secrets from {}", config.client_secrets.display()))
}

async fn upload_files(handle: &QueueManagerHandle, config: &Config, files: Vec<PathBuf>) -> Result<()> {
    let manager = &handle.manager;
    let resolver = MetadataResolver::new(config.playlists.clone())?;
    let reporter = tokio::spawn(report_progress(manager.subscribe()));

    for file in files {
        let path = config.resolve_path(&file);
        match resolver.describe(&path).await {
            Ok(descriptor) => {
                manager.submit(descriptor).await?;
            }
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "Skipping file"),
        }
    }

    tokio::select! {
        result = manager.wait_idle() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            if manager.has_active_or_pending() {
                tracing::warn!("Interrupted, canceling uploads");
                manager.cancel_all().await?;
            }
            manager.wait_idle().await?;
        }
    }

    reporter.abort();
    Ok(())
}

async fn report_progress(mut events: tokio::sync::broadcast::Receiver<QueueEvent>) {
    loop {
        match events.recv().await {
            Ok(QueueEvent::Progress(progress)) => match progress.status {
                TransferStatus::Transferring => tracing::info!(
                    id = %progress.id,
                    "{:.1}% ({}/{} bytes, {:.0} B/s, eta {:?})",
                    progress.percent,
                    progress.bytes_done,
                    progress.total_bytes,
                    progress.throughput,
                    progress.eta,
                ),
                TransferStatus::Failed => tracing::error!(
                    id = %progress.id,
                    error = progress.error.as_deref().unwrap_or("unknown"),
                    "Upload failed",
                ),
                status => tracing::info!(id = %progress.id, %status, "{:.1}%", progress.percent),
            },
            Ok(QueueEvent::Changed(snapshot)) => {
                tracing::debug!(pending = snapshot.pending.len(), active = ?snapshot.active, "Queue changed");
            }
            Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "Progress reporter lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
