//! Cloudflare whitelist reconciliation
//!
//! A domain counts as accelerated when its host, or the registrable parent of
//! its host, is on the operator's whitelist. Anything else is left to the
//! injected [`CloudflareClassifier`].

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::{classification_host, normalize_whitelist_domain, registrable_parent};
use crate::error::{Error, Result};
use crate::traits::{CloudflareClassifier, ConfigStore};

/// Pure whitelist update
///
/// Returns `current ∪ add − remove`, with every entry trimmed and lower-cased.
pub fn reconcile_whitelist<A, R>(current: &BTreeSet<String>, add: A, remove: R) -> BTreeSet<String>
where
    A: IntoIterator,
    A::Item: AsRef<str>,
    R: IntoIterator,
    R::Item: AsRef<str>,
{
    let mut next: BTreeSet<String> = current
        .iter()
        .map(|d| normalize_whitelist_domain(d))
        .filter(|d| !d.is_empty())
        .collect();
    next.extend(
        add.into_iter()
            .map(|d| normalize_whitelist_domain(d.as_ref()))
            .filter(|d| !d.is_empty()),
    );
    for domain in remove {
        next.remove(&normalize_whitelist_domain(domain.as_ref()));
    }
    next
}

/// Whitelist-aware classification and whitelist persistence
#[derive(Clone)]
pub struct CloudflareReconciler {
    store: Arc<dyn ConfigStore>,
    classifier: Arc<dyn CloudflareClassifier>,
}

impl CloudflareReconciler {
    /// Create a reconciler
    pub fn new(store: Arc<dyn ConfigStore>, classifier: Arc<dyn CloudflareClassifier>) -> Self {
        Self { store, classifier }
    }

    /// Whether `domain` should be accelerated
    ///
    /// Scheme, path and port are ignored. Never mutates anything.
    pub async fn is_accelerated(&self, domain: &str, whitelist: &BTreeSet<String>) -> bool {
        let host = classification_host(domain);
        if host.is_empty() {
            return false;
        }
        if whitelist.contains(&host) {
            tracing::debug!("{} is whitelisted", host);
            return true;
        }
        if let Some(parent) = registrable_parent(&host)
            && whitelist.contains(parent)
        {
            tracing::debug!("{} is whitelisted via {}", host, parent);
            return true;
        }
        self.classifier.is_accelerated(&host).await
    }

    /// Current whitelist
    pub async fn whitelist(&self) -> Result<BTreeSet<String>> {
        Ok(self.store.load().await?.cloudflare_domains)
    }

    /// Add a domain to the persisted whitelist
    pub async fn add_to_whitelist(&self, domain: &str) -> Result<BTreeSet<String>> {
        let host = normalize_whitelist_domain(domain);
        if host.is_empty() {
            return Err(Error::invalid_input("Whitelist domain cannot be empty"));
        }
        self.update_whitelist([host], std::iter::empty::<String>()).await
    }

    /// Remove a domain from the persisted whitelist
    pub async fn remove_from_whitelist(&self, domain: &str) -> Result<BTreeSet<String>> {
        self.update_whitelist(std::iter::empty::<String>(), [domain.to_string()])
            .await
    }

    async fn update_whitelist<A, R>(&self, add: A, remove: R) -> Result<BTreeSet<String>>
    where
        A: IntoIterator<Item = String>,
        R: IntoIterator<Item = String>,
    {
        let mut doc = self.store.load().await?;
        let next = reconcile_whitelist(&doc.cloudflare_domains, add, remove);
        if next != doc.cloudflare_domains {
            doc.cloudflare_domains = next.clone();
            self.store.save(&doc).await?;
            tracing::info!("Whitelist now holds {} domain(s)", next.len());
        }
        Ok(next)
    }
}
