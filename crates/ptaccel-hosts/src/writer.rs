//! File-backed `HostsWriter`

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ptaccel_core::config::ConfigDocument;
use ptaccel_core::domain::host_without_port;
use ptaccel_core::traits::HostsWriter;
use ptaccel_core::{BOOTSTRAP_IP, Result};

use crate::render::{render_block, strip_managed_blocks};
use crate::sources::SourceFetcher;

/// Hosts file of the current platform
pub fn default_hosts_path() -> &'static str {
    if cfg!(windows) {
        r"c:\windows\system32\drivers\etc\hosts"
    } else {
        "/etc/hosts"
    }
}

/// Writes the managed block into a hosts file
///
/// The file is rewritten in place rather than replaced, since `/etc/hosts`
/// is commonly a bind mount inside containers.
#[derive(Debug, Clone)]
pub struct HostsFileWriter {
    path: PathBuf,
    fetcher: SourceFetcher,
}

impl HostsFileWriter {
    /// Create a writer for the hosts file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fetcher: SourceFetcher::new(),
        }
    }

    /// Use `fetcher` for hosts sources
    pub fn with_fetcher(mut self, fetcher: SourceFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Path of the hosts file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `ip<TAB>host` lines of enabled trackers, in document order
    ///
    /// Hosts files cannot carry a port, so each tracker contributes its host
    /// only. Trackers sharing a host are written once; the first one wins.
    pub fn tracker_entries(doc: &ConfigDocument) -> Vec<String> {
        let mut seen = HashSet::new();
        doc.trackers()
            .iter()
            .filter(|t| t.enable)
            .filter_map(|t| {
                let host = host_without_port(t.domain.trim());
                if host.is_empty() || !seen.insert(host.to_ascii_lowercase()) {
                    return None;
                }
                let ip = if t.ip.trim().is_empty() { BOOTSTRAP_IP } else { t.ip.trim() };
                Some(format!("{}\t{}", ip, host))
            })
            .collect()
    }

    /// `ip<TAB>domain` lines of enabled sources, sorted by domain
    ///
    /// Hosts that any tracker maps are left to the tracker entries.
    pub async fn source_entries(&self, doc: &ConfigDocument) -> Vec<String> {
        let tracker_hosts: HashSet<String> = doc
            .trackers()
            .iter()
            .map(|t| host_without_port(t.domain.trim()).to_ascii_lowercase())
            .collect();

        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        for source in doc.hosts_sources().iter().filter(|s| s.enable && !s.url.trim().is_empty()) {
            let entries = self.fetcher.fetch(source.url.trim()).await;
            tracing::debug!("Source {} contributed {} entries", source.name, entries.len());
            for (ip, domain) in entries {
                if tracker_hosts.contains(&domain.to_ascii_lowercase()) {
                    continue;
                }
                merged.entry(domain).or_insert(ip);
            }
        }

        merged
            .into_iter()
            .map(|(domain, ip)| format!("{}\t{}", ip, domain))
            .collect()
    }

    async fn read_or_empty(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl HostsWriter for HostsFileWriter {
    async fn rewrite(&self, doc: &ConfigDocument) -> Result<usize> {
        let trackers = Self::tracker_entries(doc);
        let sources = self.source_entries(doc).await;

        let current = self.read_or_empty().await?;
        let preserved = strip_managed_blocks(&current);
        let content = format!(
            "{}\n\n{}",
            preserved.trim_end(),
            render_block(&trackers, &sources)
        );
        tokio::fs::write(&self.path, content).await?;

        let total = trackers.len() + sources.len();
        tracing::info!(
            "Hosts file {} updated: {} tracker and {} source entries",
            self.path.display(),
            trackers.len(),
            sources.len()
        );
        Ok(total)
    }

    async fn read_current_hosts(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    async fn clear_managed_sections(&self) -> Result<()> {
        let current = self.read_or_empty().await?;
        let preserved = strip_managed_blocks(&current);
        if preserved == current {
            tracing::debug!("No managed block in {}", self.path.display());
            return Ok(());
        }
        tokio::fs::write(&self.path, format!("{}\n", preserved.trim_end())).await?;
        tracing::info!("Cleared managed block from {}", self.path.display());
        Ok(())
    }
}
