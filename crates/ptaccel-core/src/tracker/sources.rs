//! Hosts source registry
//!
//! Remote hosts files merged into the managed section. URLs are the
//! uniqueness key and are normalized to carry a scheme before comparison.

use std::sync::Arc;

use crate::config::HostsSource;
use crate::domain::normalize_source_url;
use crate::error::{Error, Result};
use crate::traits::ConfigStore;

/// Hosts source list operations on top of a ConfigStore
#[derive(Clone)]
pub struct HostsSourceRegistry {
    store: Arc<dyn ConfigStore>,
}

impl HostsSourceRegistry {
    /// Create a registry over `store`
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Current hosts sources
    pub async fn list(&self) -> Result<Vec<HostsSource>> {
        Ok(self.store.load().await?.hosts_sources().to_vec())
    }

    /// Add an enabled hosts source
    pub async fn add_source(&self, name: &str, url: &str) -> Result<HostsSource> {
        let url = normalize_source_url(url)?;

        let mut doc = self.store.load().await?;
        if doc.hosts_sources().iter().any(|s| s.url == url) {
            return Err(Error::DuplicateHostsSource(url));
        }

        let source = HostsSource {
            name: match name.trim() {
                "" => url.clone(),
                name => name.to_string(),
            },
            url,
            enable: true,
        };
        doc.hosts_sources_mut().push(source.clone());
        self.store.save(&doc).await?;

        tracing::info!("Added hosts source {} ({})", source.name, source.url);
        Ok(source)
    }

    /// Remove sources matching `url`, as given or normalized
    ///
    /// Fails only when the source list is absent from the document.
    pub async fn delete_source(&self, url: &str) -> Result<usize> {
        let raw = url.trim();
        let normalized = normalize_source_url(raw).unwrap_or_else(|_| raw.to_string());

        let mut doc = self.store.load().await?;
        let sources = doc
            .hosts_sources
            .as_mut()
            .ok_or_else(|| Error::HostsSourceNotFound(raw.to_string()))?;
        let before = sources.len();
        sources.retain(|s| s.url != raw && s.url != normalized);
        let removed = before - sources.len();

        self.store.save(&doc).await?;
        tracing::info!("Deleted {} hosts source(s) for {}", removed, raw);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDocument;
    use crate::store::MemoryConfigStore;

    #[tokio::test]
    async fn test_add_normalizes_and_rejects_duplicates() {
        let store = MemoryConfigStore::new();
        let registry = HostsSourceRegistry::new(Arc::new(store.clone()));

        let added = registry.add_source("", "raw.example.com/hosts").await.unwrap();
        assert_eq!(added.url, "https://raw.example.com/hosts");
        assert_eq!(added.name, added.url);

        let err = registry
            .add_source("again", "https://raw.example.com/hosts")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateHostsSource(_)));
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let registry = HostsSourceRegistry::new(Arc::new(MemoryConfigStore::new()));
        assert!(matches!(
            registry.add_source("x", "https://").await,
            Err(Error::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_matches_normalized_url() {
        let store = MemoryConfigStore::with_document(ConfigDocument::new());
        let registry = HostsSourceRegistry::new(Arc::new(store.clone()));

        assert!(matches!(
            registry.delete_source("https://a.example/hosts").await,
            Err(Error::HostsSourceNotFound(_))
        ));

        registry.add_source("a", "a.example/hosts").await.unwrap();
        assert_eq!(registry.delete_source("a.example/hosts").await.unwrap(), 1);
        assert_eq!(store.load().await.unwrap().hosts_sources, Some(Vec::new()));
    }
}
