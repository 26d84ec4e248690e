//! Transmission RPC tracker source

use async_trait::async_trait;
use ptaccel_core::config::{ClientKind, TorrentClientConfig};
use ptaccel_core::traits::{TrackerSource, TrackerSourceFactory};
use ptaccel_core::{Error, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::{CLIENT_TIMEOUT, announce_hosts, status_error};

const PROVIDER: &str = "transmission";

/// RPC path used when the descriptor has none
pub const DEFAULT_RPC_PATH: &str = "/transmission/rpc";

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Default, Deserialize)]
struct TorrentList {
    #[serde(default)]
    torrents: Vec<Torrent>,
}

#[derive(Debug, Deserialize)]
struct Torrent {
    #[serde(default)]
    trackers: Vec<Tracker>,
}

#[derive(Debug, Deserialize)]
struct Tracker {
    #[serde(default)]
    announce: String,
}

/// Transmission daemon reached through its RPC endpoint
pub struct TransmissionSource {
    id: String,
    name: String,
    rpc_url: String,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
    session_id: Mutex<Option<String>>,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for TransmissionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmissionSource")
            .field("id", &self.id)
            .field("rpc_url", &self.rpc_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl TransmissionSource {
    /// Create a source from a client descriptor
    pub fn new(config: &TorrentClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to build HTTP client: {}", e)))?;

        let path = match config.path.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_RPC_PATH.to_string(),
            Some(path) if path.starts_with('/') => path.to_string(),
            Some(path) => format!("/{}", path),
        };

        Ok(Self {
            id: config.id.clone(),
            name: config.display_name().to_string(),
            rpc_url: format!("{}{}", config.base_url(), path),
            username: config.username.clone().filter(|u| !u.is_empty()),
            password: config.password.clone(),
            client,
            session_id: Mutex::new(None),
        })
    }

    /// Call an RPC method, performing the session-id handshake when asked to
    async fn call(&self, method: &str, arguments: Value) -> Result<Value> {
        let payload = json!({ "method": method, "arguments": arguments });
        let mut session = self.session_id.lock().await;

        // One retry: the first 409 hands out the session id
        for _ in 0..2 {
            let mut request = self.client.post(&self.rpc_url).json(&payload);
            if let Some(user) = &self.username {
                request = request.basic_auth(user, self.password.as_ref());
            }
            if let Some(id) = session.as_deref() {
                request = request.header(SESSION_HEADER, id);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::provider(PROVIDER, format!("HTTP request failed: {}", e)))?;

            if response.status() == StatusCode::CONFLICT {
                let id = response
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| Error::provider(PROVIDER, "409 without a session id"))?;
                tracing::debug!("Transmission {} issued a new session id", self.id);
                *session = Some(id.to_string());
                continue;
            }

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(PROVIDER, status, &body));
            }

            let reply: RpcResponse = response
                .json()
                .await
                .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse response: {}", e)))?;
            if reply.result != "success" {
                return Err(Error::provider(PROVIDER, format!("{} failed: {}", method, reply.result)));
            }
            return Ok(reply.arguments);
        }

        Err(Error::provider(PROVIDER, "Session id rejected twice"))
    }
}

#[async_trait]
impl TrackerSource for TransmissionSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClientKind {
        ClientKind::Transmission
    }

    async fn list_tracker_domains(&self) -> Result<Vec<String>> {
        let arguments = self
            .call("torrent-get", json!({ "fields": ["id", "trackers"] }))
            .await?;
        let list: TorrentList = serde_json::from_value(arguments)
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse torrents: {}", e)))?;
        tracing::info!("Transmission {} reports {} torrents", self.id, list.torrents.len());

        let hosts = announce_hosts(
            list.torrents
                .iter()
                .flat_map(|t| t.trackers.iter())
                .map(|t| t.announce.as_str()),
        );
        tracing::info!("Transmission {} yielded {} tracker hosts", self.id, hosts.len());
        Ok(hosts)
    }
}

/// Factory for Transmission sources
pub struct TransmissionFactory;

impl TrackerSourceFactory for TransmissionFactory {
    fn create(&self, config: &TorrentClientConfig) -> Result<Box<dyn TrackerSource>> {
        if config.kind != ClientKind::Transmission {
            return Err(Error::config("Invalid config for Transmission client"));
        }
        config.validate()?;
        Ok(Box::new(TransmissionSource::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(path: Option<&str>) -> TorrentClientConfig {
        serde_json::from_value(json!({
            "id": "tr1",
            "name": "NAS",
            "type": "transmission",
            "host": "nas.lan",
            "port": 9091,
            "path": path,
        }))
        .unwrap()
    }

    #[test]
    fn test_rpc_url() {
        let default = TransmissionSource::new(&descriptor(None)).unwrap();
        assert_eq!(default.rpc_url, "http://nas.lan:9091/transmission/rpc");

        let custom = TransmissionSource::new(&descriptor(Some("rpc"))).unwrap();
        assert_eq!(custom.rpc_url, "http://nas.lan:9091/rpc");
        assert_eq!(custom.name(), "NAS");
    }

    #[test]
    fn test_factory_validates() {
        let mut config = descriptor(None);
        assert!(TransmissionFactory.create(&config).is_ok());
        config.port = 0;
        assert!(TransmissionFactory.create(&config).is_err());
    }
}
