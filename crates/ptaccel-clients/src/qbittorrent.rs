//! qBittorrent Web API v2 tracker source

use async_trait::async_trait;
use ptaccel_core::config::{ClientKind, TorrentClientConfig};
use ptaccel_core::traits::{TrackerSource, TrackerSourceFactory};
use ptaccel_core::{Error, Result};
use serde::Deserialize;

use crate::{CLIENT_TIMEOUT, announce_hosts, status_error};

const PROVIDER: &str = "qbittorrent";

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    #[serde(default)]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct TrackerInfo {
    #[serde(default)]
    url: String,
}

/// qBittorrent client reached through its Web API
pub struct QbittorrentSource {
    id: String,
    name: String,
    api_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for QbittorrentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QbittorrentSource")
            .field("id", &self.id)
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl QbittorrentSource {
    /// Create a source from a client descriptor
    pub fn new(config: &TorrentClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            id: config.id.clone(),
            name: config.display_name().to_string(),
            api_url: format!("{}/api/v2", config.base_url()),
            username: config.username.clone().unwrap_or_default(),
            password: config.password.clone().unwrap_or_default(),
            client,
        })
    }

    async fn login(&self) -> Result<()> {
        let url = format!("{}/auth/login", self.api_url);
        let response = self
            .client
            .post(&url)
            .form(&[("username", &self.username), ("password", &self.password)])
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(status_error(PROVIDER, status, &body));
        }
        if !body.trim().to_ascii_lowercase().starts_with("ok") {
            return Err(Error::provider(PROVIDER, format!("Login rejected: {}", body.trim())));
        }

        tracing::debug!("Logged in to qBittorrent {}", self.id);
        Ok(())
    }

    async fn torrent_hashes(&self) -> Result<Vec<String>> {
        let url = format!("{}/torrents/info", self.api_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER, status, &body));
        }

        let torrents: Vec<TorrentInfo> = response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse response: {}", e)))?;
        Ok(torrents
            .into_iter()
            .map(|t| t.hash)
            .filter(|hash| !hash.is_empty())
            .collect())
    }

    /// Announce URLs of one torrent; a failure skips the torrent
    async fn tracker_urls(&self, hash: &str) -> Vec<String> {
        let url = format!("{}/torrents/trackers", self.api_url);
        let response = match self.client.get(&url).query(&[("hash", hash)]).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!("Trackers of torrent {} unavailable: {}", hash, response.status());
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("Trackers of torrent {} unavailable: {}", hash, e);
                return Vec::new();
            }
        };

        match response.json::<Vec<TrackerInfo>>().await {
            Ok(trackers) => trackers.into_iter().map(|t| t.url).collect(),
            Err(e) => {
                tracing::warn!("Unparseable tracker list for {}: {}", hash, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl TrackerSource for QbittorrentSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClientKind {
        ClientKind::Qbittorrent
    }

    async fn list_tracker_domains(&self) -> Result<Vec<String>> {
        self.login().await?;
        let hashes = self.torrent_hashes().await?;
        tracing::info!("qBittorrent {} reports {} torrents", self.id, hashes.len());

        let mut urls = Vec::new();
        for hash in &hashes {
            urls.extend(self.tracker_urls(hash).await);
        }

        let hosts = announce_hosts(urls.iter().map(String::as_str));
        tracing::info!("qBittorrent {} yielded {} tracker hosts", self.id, hosts.len());
        Ok(hosts)
    }
}

/// Factory for qBittorrent sources
pub struct QbittorrentFactory;

impl TrackerSourceFactory for QbittorrentFactory {
    fn create(&self, config: &TorrentClientConfig) -> Result<Box<dyn TrackerSource>> {
        if config.kind != ClientKind::Qbittorrent {
            return Err(Error::config("Invalid config for qBittorrent client"));
        }
        config.validate()?;
        Ok(Box::new(QbittorrentSource::new(config)?))
    }
}
