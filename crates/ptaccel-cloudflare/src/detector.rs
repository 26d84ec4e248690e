//! Cloudflare classification by address range and response headers

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ptaccel_core::traits::CloudflareClassifier;
use reqwest::header::{HeaderMap, SERVER};

use crate::ranges::is_cloudflare_ip;

/// How long a classification result is reused
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Timeout of the HTTPS header check
const HEADER_TIMEOUT: Duration = Duration::from_secs(5);

/// Cached results kept before expired entries are purged
const CACHE_PURGE_THRESHOLD: usize = 1000;

/// Whether response headers come from a Cloudflare edge
pub fn headers_indicate_cloudflare(headers: &HeaderMap) -> bool {
    if headers.contains_key("cf-ray") {
        return true;
    }
    headers
        .get(SERVER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|server| server.to_ascii_lowercase().contains("cloudflare"))
}

/// Classifier backed by DNS resolution and an HTTPS header check
pub struct CloudflareDetector {
    client: reqwest::Client,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Instant, bool)>>,
}

impl std::fmt::Debug for CloudflareDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareDetector")
            .field("ttl", &self.ttl)
            .field("cached", &self.lock_cache().len())
            .finish()
    }
}

impl Default for CloudflareDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudflareDetector {
    /// Create a detector with the default one-hour cache
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    /// Create a detector whose results expire after `ttl`
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HEADER_TIMEOUT)
                .build()
                .unwrap_or_default(),
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Instant, bool)>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached(&self, host: &str) -> Option<bool> {
        self.lock_cache()
            .get(host)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, result)| *result)
    }

    fn remember(&self, host: &str, result: bool) {
        let mut cache = self.lock_cache();
        cache.insert(host.to_string(), (Instant::now(), result));
        if cache.len() > CACHE_PURGE_THRESHOLD {
            let ttl = self.ttl;
            cache.retain(|_, (at, _)| at.elapsed() < ttl);
        }
    }

    async fn resolves_to_cloudflare(&self, host: &str) -> bool {
        match tokio::net::lookup_host((host, 443)).await {
            Ok(addrs) => {
                let mut addrs = addrs.map(|addr| addr.ip()).peekable();
                if addrs.peek().is_none() {
                    tracing::debug!("{} resolved to no addresses", host);
                }
                addrs.any(is_cloudflare_ip)
            }
            Err(e) => {
                tracing::debug!("Failed to resolve {}: {}", host, e);
                false
            }
        }
    }

    async fn answers_from_cloudflare(&self, host: &str) -> bool {
        let url = format!("https://{}", host);
        match self.client.head(&url).send().await {
            Ok(response) => headers_indicate_cloudflare(response.headers()),
            Err(e) => {
                tracing::debug!("Header check of {} failed: {}", host, e);
                false
            }
        }
    }
}

#[async_trait]
impl CloudflareClassifier for CloudflareDetector {
    async fn is_accelerated(&self, host: &str) -> bool {
        let host = host.trim().to_ascii_lowercase();
        if host.is_empty() {
            return false;
        }
        if let Some(result) = self.cached(&host) {
            tracing::debug!("{} classification from cache: {}", host, result);
            return result;
        }

        let result = self.resolves_to_cloudflare(&host).await
            || self.answers_from_cloudflare(&host).await;

        tracing::info!("Classified {} as {}", host, if result { "Cloudflare" } else { "not Cloudflare" });
        self.remember(&host, result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_header_detection() {
        let mut headers = HeaderMap::new();
        assert!(!headers_indicate_cloudflare(&headers));

        headers.insert(SERVER, HeaderValue::from_static("nginx"));
        assert!(!headers_indicate_cloudflare(&headers));

        headers.insert(SERVER, HeaderValue::from_static("Cloudflare"));
        assert!(headers_indicate_cloudflare(&headers));

        let mut ray = HeaderMap::new();
        ray.insert("cf-ray", HeaderValue::from_static("8a1b2c3d4e5f-HKG"));
        assert!(headers_indicate_cloudflare(&ray));
    }

    #[tokio::test]
    async fn test_cached_result_is_reused() {
        let detector = CloudflareDetector::new();
        detector.remember("tracker.example.org", true);

        assert!(detector.is_accelerated("Tracker.Example.org").await);
    }

    #[test]
    fn test_expired_entries_are_ignored() {
        let detector = CloudflareDetector::with_ttl(Duration::ZERO);
        detector.remember("tracker.example.org", true);
        assert_eq!(detector.cached("tracker.example.org"), None);
    }

    #[tokio::test]
    async fn test_empty_host_is_not_accelerated() {
        assert!(!CloudflareDetector::new().is_accelerated("  ").await);
    }
}
