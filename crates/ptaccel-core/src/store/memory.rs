// # Memory Config Store
//
// In-memory implementation of ConfigStore for tests and embedding.
// Nothing survives a restart.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::config::ConfigDocument;
use crate::traits::ConfigStore;
use crate::Error;

/// In-memory configuration store
///
/// Clones share the same document and save counter.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<RwLock<ConfigDocument>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryConfigStore {
    /// Create a store holding an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `doc`
    pub fn with_document(doc: ConfigDocument) -> Self {
        Self {
            inner: Arc::new(RwLock::new(doc)),
            saves: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<ConfigDocument, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, doc: &ConfigDocument) -> Result<(), Error> {
        *self.inner.write().await = doc.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
