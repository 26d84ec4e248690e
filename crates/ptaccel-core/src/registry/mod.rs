//! Plugin-based download client registry
//!
//! Client crates register a [`TrackerSourceFactory`] per client type, and the
//! binary turns the `torrent_clients` descriptors of the configuration document
//! into tracker sources without a hard-coded match on client type.
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In the ptaccel-clients crate
//! pub fn register(registry: &ClientRegistry) {
//!     registry.register_client("qbittorrent", Box::new(QbittorrentFactory));
//!     registry.register_client("transmission", Box::new(TransmissionFactory));
//! }
//! ```

use crate::config::{ClientKind, ConfigDocument, TorrentClientConfig};
use crate::error::{Error, Result};
use crate::traits::{TrackerSource, TrackerSourceFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// An enabled client whose tracker source could not be constructed
#[derive(Debug)]
pub struct UnbuiltClient {
    /// Client id
    pub id: String,
    /// Display name
    pub name: String,
    /// Client family
    pub kind: ClientKind,
    /// Why construction failed
    pub error: Error,
}

/// Tracker sources for the enabled clients of a document
#[derive(Default)]
pub struct EnabledSources {
    /// Ready-to-query sources
    pub sources: Vec<Box<dyn TrackerSource>>,
    /// Clients that failed validation or construction
    pub unbuilt: Vec<UnbuiltClient>,
}

impl EnabledSources {
    /// Whether no client is enabled at all
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.unbuilt.is_empty()
    }
}

/// Registry of tracker source factories keyed by client type
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Box<dyn TrackerSourceFactory>>>,
}

impl ClientRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tracker source factory
    ///
    /// # Parameters
    ///
    /// - `name`: Client type name (e.g., "qbittorrent", "transmission")
    /// - `factory`: Factory object for creating source instances
    pub fn register_client(&self, name: impl Into<String>, factory: Box<dyn TrackerSourceFactory>) {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        clients.insert(name.into(), factory);
    }

    /// Create a tracker source from a descriptor
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn TrackerSource>)`: Created source
    /// - `Err(Error)`: If the client type is not registered or creation fails
    pub fn create_source(&self, config: &TorrentClientConfig) -> Result<Box<dyn TrackerSource>> {
        let client_type = config.kind.as_str();
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);

        let factory = clients
            .get(client_type)
            .ok_or_else(|| Error::config(format!("Unknown client type: {}", client_type)))?;

        factory.create(config)
    }

    /// Create sources for every enabled client in `doc`
    ///
    /// A client that cannot be constructed is returned in
    /// [`EnabledSources::unbuilt`] so the import can report it per client.
    pub fn create_enabled_sources(&self, doc: &ConfigDocument) -> EnabledSources {
        let mut enabled = EnabledSources::default();
        for client in doc.enabled_clients() {
            match client.validate().and_then(|()| self.create_source(client)) {
                Ok(source) => enabled.sources.push(source),
                Err(error) => {
                    tracing::warn!("Torrent client {} cannot be used: {}", client.id, error);
                    enabled.unbuilt.push(UnbuiltClient {
                        id: client.id.clone(),
                        name: client.display_name().to_string(),
                        kind: client.kind,
                        error,
                    });
                }
            }
        }
        enabled
    }

    /// List all registered client types
    pub fn list_clients(&self) -> Vec<String> {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        clients.keys().cloned().collect()
    }

    /// Check if a client type is registered
    pub fn has_client(&self, name: &str) -> bool {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        clients.contains_key(name)
    }
}
