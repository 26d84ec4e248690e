// # Import Pipeline
//
// Pulls tracker domains from download clients and merges the accelerated
// ones into the tracker list.
//
// ## Flow
//
// 1. Query every tracker source. A failing client is recorded in its
//    `ClientResult` and does not stop the others.
// 2. Normalize and de-duplicate the returned domains.
// 3. Domains already in the tracker list are counted and left alone. The
//    rest are classified: accelerated ones are staged, others filtered.
// 4. If anything is staged, reload the document, drop staged domains that
//    appeared in the meantime, append the rest with the import IP, whitelist
//    their hosts, save once and rewrite the hosts file.
//
// ## Idempotence
//
// Running the import again with no new remote domains performs no save and
// no hosts rewrite.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use crate::config::{ClientKind, TrackerEntry};
use crate::domain::{classification_host, normalize_domain};
use crate::error::{Error, Result};
use crate::reconciler::CloudflareReconciler;
use crate::registry::{EnabledSources, UnbuiltClient};
use crate::tracker::{uniform_tracker_ip, BOOTSTRAP_IP};
use crate::traits::{ConfigStore, HostsWriter, TrackerSource};

/// Per-client import outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientResult {
    /// Client display name
    pub name: String,
    /// Client family
    #[serde(rename = "type")]
    pub kind: ClientKind,
    /// Normalized tracker domains reported by the client
    pub trackers: Vec<String>,
    /// Number of tracker domains reported
    pub count: usize,
    /// Whether the client answered
    pub success: bool,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of an import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Domains appended to the tracker list
    pub imported: Vec<String>,
    /// Domains rejected by classification
    pub filtered: Vec<String>,
    /// Domains that were already in the tracker list
    pub already_present: Vec<String>,
    /// Per-client outcomes keyed by client id
    pub client_results: BTreeMap<String, ClientResult>,
    /// Whether the hosts file was rewritten successfully
    pub hosts_rewritten: bool,
    /// Human-readable summary
    pub message: String,
}

impl ImportReport {
    /// "success" when any client reported a domain, "warning" otherwise
    pub fn status(&self) -> &'static str {
        if self.client_results.values().any(|r| r.count > 0) {
            "success"
        } else {
            "warning"
        }
    }

    /// Per-client summary joined with "；"
    pub fn client_summary(&self) -> String {
        self.client_results
            .values()
            .map(|r| match (&r.error, r.success) {
                (Some(error), false) => format!("{}: 失败({})", r.name, error),
                _ => format!("{}: {}个", r.name, r.count),
            })
            .collect::<Vec<_>>()
            .join("；")
    }

    /// Per-client failures as errors
    pub fn failures(&self) -> Vec<Error> {
        self.client_results
            .values()
            .filter(|r| !r.success)
            .map(|r| Error::client_import(&r.name, r.error.clone().unwrap_or_default()))
            .collect()
    }

    fn compose_message(&mut self) {
        self.message = if !self.imported.is_empty() {
            let mut msg = format!("成功导入 {} 个Cloudflare站点", self.imported.len());
            if !self.filtered.is_empty() {
                msg.push_str(&format!("，已过滤 {} 个非Cloudflare站点", self.filtered.len()));
            }
            msg.push_str(if self.hosts_rewritten {
                "，Hosts已更新"
            } else {
                "，Hosts更新失败"
            });
            msg
        } else if !self.already_present.is_empty() {
            format!(
                "未发现新的Cloudflare站点，已有站点 {} 个，过滤非Cloudflare站点 {} 个",
                self.already_present.len(),
                self.filtered.len()
            )
        } else {
            format!(
                "未找到任何Cloudflare站点，已过滤非Cloudflare站点 {} 个",
                self.filtered.len()
            )
        };
    }
}

/// Merges download-client trackers into the configuration
#[derive(Clone)]
pub struct ImportPipeline {
    store: Arc<dyn ConfigStore>,
    reconciler: CloudflareReconciler,
    hosts: Arc<dyn HostsWriter>,
}

impl ImportPipeline {
    /// Create a pipeline
    pub fn new(
        store: Arc<dyn ConfigStore>,
        reconciler: CloudflareReconciler,
        hosts: Arc<dyn HostsWriter>,
    ) -> Self {
        Self {
            store,
            reconciler,
            hosts,
        }
    }

    /// Import from `sources`
    ///
    /// # Errors
    ///
    /// - `ConfigUnreadable` / save failures from the store
    /// - `InconsistentTrackerIp` when new domains are staged but the existing
    ///   enabled trackers disagree on their IP; nothing is written
    pub async fn import_from_clients(&self, sources: &[Box<dyn TrackerSource>]) -> Result<ImportReport> {
        self.run(sources, &[]).await
    }

    /// Import from the enabled clients of a document
    ///
    /// Clients that could not be constructed get a failed [`ClientResult`]
    /// alongside the queried ones.
    pub async fn import_enabled(&self, enabled: &EnabledSources) -> Result<ImportReport> {
        self.run(&enabled.sources, &enabled.unbuilt).await
    }

    async fn run(
        &self,
        sources: &[Box<dyn TrackerSource>],
        unbuilt: &[UnbuiltClient],
    ) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let mut all_domains = BTreeSet::new();

        for client in unbuilt {
            report.client_results.insert(
                client.id.clone(),
                ClientResult {
                    name: client.name.clone(),
                    kind: client.kind,
                    trackers: Vec::new(),
                    count: 0,
                    success: false,
                    error: Some(client.error.to_string()),
                },
            );
        }

        for source in sources {
            let result = match source.list_tracker_domains().await {
                Ok(raw) => {
                    let trackers: BTreeSet<String> = raw
                        .iter()
                        .map(|d| normalize_domain(d))
                        .filter(|d| !d.is_empty())
                        .collect();
                    tracing::info!("Client {} reported {} tracker(s)", source.name(), trackers.len());
                    all_domains.extend(trackers.iter().cloned());
                    ClientResult {
                        name: source.name().to_string(),
                        kind: source.kind(),
                        count: trackers.len(),
                        trackers: trackers.into_iter().collect(),
                        success: true,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::warn!("Client {} failed: {}", source.name(), e);
                    ClientResult {
                        name: source.name().to_string(),
                        kind: source.kind(),
                        trackers: Vec::new(),
                        count: 0,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.client_results.insert(source.id().to_string(), result);
        }

        let doc = self.store.load().await?;
        let mut staged = Vec::new();
        for domain in all_domains {
            if doc.has_tracker(&domain) {
                report.already_present.push(domain);
            } else if self.reconciler.is_accelerated(&domain, &doc.cloudflare_domains).await {
                tracing::debug!("Staging accelerated tracker {}", domain);
                staged.push(domain);
            } else {
                tracing::debug!("Filtering non-accelerated tracker {}", domain);
                report.filtered.push(domain);
            }
        }

        if !staged.is_empty() {
            // classification may have taken a while; merge against the latest document
            let mut doc = self.store.load().await?;
            staged.retain(|d| {
                if doc.has_tracker(d) {
                    report.already_present.push(d.clone());
                    false
                } else {
                    true
                }
            });

            if !staged.is_empty() {
                let ip = uniform_tracker_ip(&doc)?.unwrap_or_else(|| BOOTSTRAP_IP.to_string());
                for domain in &staged {
                    doc.trackers_mut().push(TrackerEntry::new(domain.clone(), ip.clone()));
                    doc.cloudflare_domains.insert(classification_host(domain));
                }
                self.store.save(&doc).await?;
                tracing::info!("Imported {} tracker(s) with IP {}", staged.len(), ip);

                match self.hosts.rewrite(&doc).await {
                    Ok(entries) => {
                        tracing::info!("Hosts rewritten after import: {} entries", entries);
                        report.hosts_rewritten = true;
                    }
                    Err(e) => tracing::warn!("Hosts rewrite after import failed: {}", e),
                }
                report.imported = staged;
            }
        }

        report.compose_message();
        Ok(report)
    }
}
