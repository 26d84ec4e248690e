// # Tracker Registry
//
// Mutations of the tracker list under two invariants.
//
// ## Invariants
//
// - Domain uniqueness: no two entries share a normalized domain.
// - IP uniformity: among enabled entries, at most one distinct non-empty IP.
//
// `add_tracker` and `batch_add` refuse to break either invariant and leave
// the document untouched when they do. `bulk_set_ip` is the one sanctioned
// way to move every tracker to a new IP at once.
//
// ## Default IP
//
// A new entry takes the shared IP of the enabled trackers. With no enabled
// tracker carrying an IP it falls back to the speed tester's last result,
// then to the bootstrap edge IP.

pub mod sources;

pub use sources::HostsSourceRegistry;

use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{ConfigDocument, TrackerEntry};
use crate::domain::{host_without_port, normalize_domain, normalize_whitelist_domain};
use crate::error::{Error, Result};
use crate::traits::{ConfigStore, SpeedTester};

/// Edge IP used when nothing better is known
pub const BOOTSTRAP_IP: &str = "104.16.91.215";

/// The shared IP of the enabled trackers
///
/// # Returns
///
/// - `Ok(Some(ip))`: every enabled tracker with an IP agrees on `ip`
/// - `Ok(None)`: no enabled tracker carries an IP
/// - `Err(Error::InconsistentTrackerIp)`: enabled trackers disagree
pub fn uniform_tracker_ip(doc: &ConfigDocument) -> Result<Option<String>> {
    let ips = doc.enabled_tracker_ips();
    match ips.len() {
        0 => Ok(None),
        1 => Ok(ips.into_iter().next().map(str::to_string)),
        _ => Err(Error::InconsistentTrackerIp),
    }
}

/// Split raw batch input into candidate domains
///
/// Accepts newline-separated text; blank lines are dropped.
pub fn split_batch(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Outcome of a batch add
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchAddReport {
    /// Domains that were added
    pub added: Vec<String>,
    /// Domains that already existed (or repeated within the batch)
    pub skipped: Vec<String>,
}

impl BatchAddReport {
    /// Human-readable summary
    pub fn message(&self) -> String {
        if self.added.is_empty() && self.skipped.is_empty() {
            return "没有有效的域名".to_string();
        }
        format!(
            "批量添加完成：成功添加 {} 个域名，跳过 {} 个已存在的域名",
            self.added.len(),
            self.skipped.len()
        )
    }
}

/// Tracker list operations on top of a ConfigStore
#[derive(Clone)]
pub struct TrackerRegistry {
    store: Arc<dyn ConfigStore>,
    speed_tester: Option<Arc<dyn SpeedTester>>,
}

impl TrackerRegistry {
    /// Create a registry over `store`
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            speed_tester: None,
        }
    }

    /// Use `tester`'s last result as the default IP for the first tracker
    pub fn with_speed_tester(mut self, tester: Arc<dyn SpeedTester>) -> Self {
        self.speed_tester = Some(tester);
        self
    }

    fn default_ip(&self, doc: &ConfigDocument) -> Result<String> {
        if let Some(ip) = uniform_tracker_ip(doc)? {
            return Ok(ip);
        }
        let best = self
            .speed_tester
            .as_ref()
            .and_then(|tester| tester.best_known_ip())
            .map(|ip| ip.to_string());
        Ok(best.unwrap_or_else(|| BOOTSTRAP_IP.to_string()))
    }

    /// Current tracker entries
    pub async fn list(&self) -> Result<Vec<TrackerEntry>> {
        Ok(self.store.load().await?.trackers().to_vec())
    }

    /// Add a single tracker
    ///
    /// The supplied `ip` is ignored; the entry receives the default IP. An
    /// empty `name` defaults to the normalized domain. With `force_whitelist`
    /// the host is also added to the Cloudflare whitelist.
    pub async fn add_tracker(
        &self,
        entry: TrackerEntry,
        force_whitelist: bool,
    ) -> Result<TrackerEntry> {
        let domain = normalize_domain(&entry.domain);
        if domain.is_empty() {
            return Err(Error::invalid_input("Tracker domain cannot be empty"));
        }

        let mut doc = self.store.load().await?;
        if doc.has_tracker(&domain) {
            return Err(Error::duplicate_tracker(domain));
        }

        let ip = self.default_ip(&doc)?;
        let name = match entry.name.trim() {
            "" => domain.clone(),
            name => name.to_string(),
        };
        let added = TrackerEntry {
            name,
            domain,
            ip,
            enable: entry.enable,
        };

        doc.trackers_mut().push(added.clone());
        if force_whitelist {
            doc.cloudflare_domains
                .insert(normalize_whitelist_domain(host_without_port(&added.domain)));
        }
        self.store.save(&doc).await?;

        tracing::info!("Added tracker {} -> {}", added.domain, added.ip);
        Ok(added)
    }

    /// Remove every entry whose domain matches
    ///
    /// Fails only when the tracker list is absent from the document. Removing
    /// an unknown domain from a present list succeeds with 0 removed.
    pub async fn delete_tracker(&self, domain: &str) -> Result<usize> {
        let mut doc = self.store.load().await?;
        let normalized = normalize_domain(domain);

        let trackers = doc
            .trackers
            .as_mut()
            .ok_or_else(|| Error::tracker_not_found(normalized.clone()))?;
        let before = trackers.len();
        trackers.retain(|t| t.domain != normalized && t.domain != domain);
        let removed = before - trackers.len();

        self.store.save(&doc).await?;
        tracing::info!("Deleted {} tracker(s) for {}", removed, normalized);
        Ok(removed)
    }

    /// Add many domains at once
    ///
    /// All candidates get the same default IP, computed once before any
    /// insertion. Duplicates, including repeats within the batch, are skipped.
    /// An empty batch performs no write.
    pub async fn batch_add<S: AsRef<str>>(&self, domains: &[S]) -> Result<BatchAddReport> {
        let cleaned: Vec<String> = domains
            .iter()
            .flat_map(|raw| split_batch(raw.as_ref()))
            .map(|raw| normalize_domain(&raw))
            .filter(|d| !d.is_empty())
            .collect();

        let mut report = BatchAddReport::default();
        if cleaned.is_empty() {
            tracing::debug!("Batch add called with no usable domains");
            return Ok(report);
        }

        let mut doc = self.store.load().await?;
        let ip = self.default_ip(&doc)?;

        for domain in cleaned {
            if doc.has_tracker(&domain) {
                report.skipped.push(domain);
                continue;
            }
            doc.trackers_mut().push(TrackerEntry::new(domain.clone(), ip.clone()));
            report.added.push(domain);
        }

        if !report.added.is_empty() {
            self.store.save(&doc).await?;
        }
        tracing::info!(
            "Batch add: {} added, {} skipped",
            report.added.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Set every tracker's IP, enabled or not
    ///
    /// Returns the number of entries updated.
    pub async fn bulk_set_ip(&self, ip: &str) -> Result<usize> {
        let ip: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| Error::invalid_input(format!("Invalid IP address: {}", ip.trim())))?;
        let ip = ip.to_string();

        let mut doc = self.store.load().await?;
        let Some(trackers) = doc.trackers.as_mut() else {
            return Ok(0);
        };
        for tracker in trackers.iter_mut() {
            tracker.ip = ip.clone();
        }
        let updated = trackers.len();

        self.store.save(&doc).await?;
        tracing::info!("Set IP {} on {} tracker(s)", ip, updated);
        Ok(updated)
    }

    /// Replace the tracker list with an empty one
    pub async fn clear_all(&self) -> Result<()> {
        let mut doc = self.store.load().await?;
        doc.trackers = Some(Vec::new());
        self.store.save(&doc).await?;
        tracing::info!("Cleared all trackers");
        Ok(())
    }
}
