// # Tracker Source Trait
//
// A download client that can report the tracker domains of its torrents.
//
// ## Implementations
//
// - qBittorrent Web API v2 and Transmission RPC: `ptaccel-clients` crate
//
// Sources are built from `TorrentClientConfig` descriptors through the
// `ClientRegistry`, keyed by client type.

use async_trait::async_trait;

use crate::config::{ClientKind, TorrentClientConfig};

/// Trait for download-client tracker discovery
#[async_trait]
pub trait TrackerSource: Send + Sync {
    /// Client id from the descriptor
    fn id(&self) -> &str;

    /// Human-readable client name
    fn name(&self) -> &str;

    /// Client family
    fn kind(&self) -> ClientKind;

    /// Tracker domains (`host[:port]`) of every torrent in the client
    ///
    /// Duplicates are allowed; the import pipeline de-duplicates.
    async fn list_tracker_domains(&self) -> Result<Vec<String>, crate::Error>;
}

/// Helper trait for constructing tracker sources from descriptors
pub trait TrackerSourceFactory: Send + Sync {
    /// Create a TrackerSource from a download client descriptor
    fn create(&self, config: &TorrentClientConfig) -> Result<Box<dyn TrackerSource>, crate::Error>;
}
