//! Streaming media downloads.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Streams a URL to a file path. Failures are reported to the caller, which
/// logs them and moves on to the next attachment.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn stream_to_file(&self, url: &str, dest: &Path) -> Result<()>;
}

/// reqwest-backed downloader writing response bodies chunk by chunk, so
/// large videos never sit in memory whole.
///
/// No request timeout is set: a stalled transfer blocks only the source
/// task that started it.
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build download HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn stream_to_file(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to request {url}"))?
            .error_for_status()
            .with_context(|| format!("Download of {url} returned error"))?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("Stream from {url} failed"))?;
            written += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {}", dest.display()))?;
        }
        file.flush()
            .await
            .with_context(|| format!("Failed to flush {}", dest.display()))?;

        debug!(url, dest = %dest.display(), bytes = written, "Downloaded media");
        Ok(())
    }
}
