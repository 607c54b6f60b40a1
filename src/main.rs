use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use timeline_media_archiver::archiver::{archive_source, Source, SourceKind};
use timeline_media_archiver::config::{self, Config};
use timeline_media_archiver::download::HttpDownloader;
use timeline_media_archiver::metadata::MetadataStore;
use timeline_media_archiver::twitter::TwitterClient;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting timeline-media-archiver");

    let config_path = config::config_path();
    if !config_path.exists() {
        Config::write_template(&config_path)
            .await
            .context("Failed to write configuration template")?;
        info!(
            path = %config_path.display(),
            "Wrote a configuration template; fill in the auth section and sources, then run again"
        );
        return Ok(());
    }

    let config = Config::load(&config_path)
        .await
        .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        users = config.users.len(),
        lists = config.lists.len(),
        "Configuration loaded"
    );
    if config.users.is_empty() && config.lists.is_empty() {
        warn!("No sources configured, nothing to do");
        return Ok(());
    }

    let metadata_path = config::metadata_path();
    let mut store = MetadataStore::load(&metadata_path)
        .await
        .context("Failed to load metadata store")?;

    let api = Arc::new(
        TwitterClient::new(config.auth.bearer_token.clone())
            .context("Failed to build API client")?,
    );
    let downloader = Arc::new(HttpDownloader::new()?);

    // One task per source; every pipeline runs to completion before any
    // watermark is persisted.
    let mut handles = Vec::new();

    for (screen_name, options) in &config.users {
        let source = Source::user(screen_name.clone(), options.clone());
        let state = store.user_state(screen_name);
        let api = Arc::clone(&api);
        let downloader = Arc::clone(&downloader);
        handles.push(tokio::spawn(async move {
            let outcome = archive_source(api.as_ref(), downloader.as_ref(), &source, state).await;
            (source, outcome)
        }));
    }

    for (list_id, options) in &config.lists {
        let source = Source::list(list_id.clone(), options.clone());
        let state = store.list_state(list_id);
        let api = Arc::clone(&api);
        let downloader = Arc::clone(&downloader);
        handles.push(tokio::spawn(async move {
            let outcome = archive_source(api.as_ref(), downloader.as_ref(), &source, state).await;
            (source, outcome)
        }));
    }

    for handle in handles {
        match handle.await {
            Ok((source, Ok(state))) => match &source.kind {
                SourceKind::User { screen_name } => store.set_user_state(screen_name, state),
                SourceKind::List { list_id } => store.set_list_state(list_id, state),
            },
            Ok((source, Err(e))) => {
                // One failed source keeps its old watermark; the others
                // still get their progress persisted.
                error!(source = %source.describe(), "Source failed: {e:#}");
            }
            Err(e) => {
                error!("Source task panicked: {e}");
            }
        }
    }

    store.save().context("Failed to persist metadata")?;
    info!("Run complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,timeline_media_archiver=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
