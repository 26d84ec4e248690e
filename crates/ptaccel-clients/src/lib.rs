// # Download Client Tracker Sources
//
// Tracker sources for the download clients PT-Accelerator imports from.
//
// ## Clients
//
// - **qBittorrent**: Web API v2. Logs in with a form post (session kept in
//   the `SID` cookie), lists torrents, then fetches each torrent's trackers.
// - **Transmission**: JSON-RPC `torrent-get`. The first call is answered with
//   409 and an `X-Transmission-Session-Id` header that every later call
//   must carry.
//
// Both return the distinct `host[:port]` of every http(s) announce URL.
// UDP and WebSocket trackers are ignored.
//
// ## Errors
//
// Every failure is an `Error::Provider` naming the client family. The import
// pipeline records it against the client and carries on with the others.

mod qbittorrent;
mod transmission;

pub use qbittorrent::{QbittorrentFactory, QbittorrentSource};
pub use transmission::{DEFAULT_RPC_PATH, TransmissionFactory, TransmissionSource};

use std::collections::BTreeSet;
use std::time::Duration;

use ptaccel_core::domain::announce_host;
use ptaccel_core::{ClientRegistry, Error};
use reqwest::StatusCode;

/// Per-request timeout against a download client
const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

/// Register both client families with a registry
///
/// # Example
///
/// ```rust
/// use ptaccel_core::ClientRegistry;
///
/// let registry = ClientRegistry::new();
/// ptaccel_clients::register(&registry);
/// assert!(registry.has_client("qbittorrent"));
/// assert!(registry.has_client("transmission"));
/// ```
pub fn register(registry: &ClientRegistry) {
    registry.register_client("qbittorrent", Box::new(QbittorrentFactory));
    registry.register_client("transmission", Box::new(TransmissionFactory));
}

/// Distinct announce hosts, sorted
fn announce_hosts<'a>(urls: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    urls.into_iter()
        .filter_map(announce_host)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Map a non-success status to a provider error
fn status_error(provider: &str, status: StatusCode, body: &str) -> Error {
    let message = match status.as_u16() {
        401 | 403 => format!("Authentication failed. Status: {}", status),
        404 => format!("API endpoint not found. Status: {}", status),
        429 => format!("Rate limit exceeded. Please retry later. Status: {}", status),
        500..=599 => format!("Client server error (transient): {} - {}", status, body),
        _ => format!("Request failed: {} - {}", status, body),
    };
    Error::provider(provider, message)
}
