// # Cloudflare Classifier Trait
//
// Decides whether a host is served through the Cloudflare network.
//
// Classification is a pure query. Implementations may cache and may perform
// network I/O, but they never touch the configuration document. Failures are
// answered with `false`.

use async_trait::async_trait;

/// Trait for CDN membership classification
#[async_trait]
pub trait CloudflareClassifier: Send + Sync {
    /// Whether `host` (lower-cased, no port) is accelerated
    async fn is_accelerated(&self, host: &str) -> bool;
}
