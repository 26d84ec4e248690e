//! Hosts source downloads with retry and an on-disk fallback

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::render::parse_hosts_text;

/// Download timeout per attempt
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Attempts per source before falling back to the cache
const FETCH_ATTEMPTS: usize = 3;

/// Downloads hosts sources
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
    cache_dir: Option<PathBuf>,
}

impl Default for SourceFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceFetcher {
    /// Create a fetcher without a cache
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .unwrap_or_default(),
            cache_dir: None,
        }
    }

    /// Keep the last good copy of every source under `dir`
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Cache file of `url`
    pub fn cache_path(&self, url: &str) -> Option<PathBuf> {
        let digest = Sha256::digest(url.as_bytes());
        self.cache_dir
            .as_deref()
            .map(|dir| dir.join(format!("{:x}.cache", digest)))
    }

    async fn download(&self, url: &str) -> Result<String, String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP status {}", response.status()));
        }
        response.text().await.map_err(|e| e.to_string())
    }

    async fn store(&self, path: &Path, text: &str) {
        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            tracing::warn!("Cannot create cache directory {}: {}", parent.display(), e);
            return;
        }
        if let Err(e) = tokio::fs::write(path, text).await {
            tracing::warn!("Cannot write cache {}: {}", path.display(), e);
        }
    }

    /// `(ip, domain)` pairs of one source
    ///
    /// Never fails: after the last failed attempt the cached copy is used,
    /// and without one the source contributes nothing.
    pub async fn fetch(&self, url: &str) -> Vec<(String, String)> {
        let cache = self.cache_path(url);

        for attempt in 1..=FETCH_ATTEMPTS {
            match self.download(url).await {
                Ok(text) => {
                    if let Some(path) = &cache {
                        self.store(path, &text).await;
                    }
                    let entries = parse_hosts_text(&text);
                    tracing::info!("Fetched {} entries from {}", entries.len(), url);
                    return entries;
                }
                Err(e) => {
                    tracing::warn!("Fetching {} failed ({}/{}): {}", url, attempt, FETCH_ATTEMPTS, e);
                }
            }
        }

        if let Some(path) = &cache {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => {
                    tracing::warn!("Using cached copy of {}", url);
                    return parse_hosts_text(&text);
                }
                Err(e) => tracing::debug!("No cached copy of {}: {}", url, e),
            }
        }

        tracing::error!("Hosts source {} unavailable", url);
        Vec::new()
    }
}
