//! Test doubles and common utilities for contract tests
//!
//! Every double counts its calls through shared `Arc` counters so a test can
//! keep a handle after moving the double into the engine.

#![allow(dead_code)]

use async_trait::async_trait;
use ptaccel_core::config::{ClientKind, ConfigDocument};
use ptaccel_core::error::{Error, Result};
use ptaccel_core::traits::{
    ChannelPayload, CloudflareClassifier, HostsWriter, NotifyTransport, SpeedTester, TrackerSource,
};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A speed tester returning a fixed IP (or failing) after an optional delay
pub struct MockSpeedTester {
    ip: Option<IpAddr>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl MockSpeedTester {
    pub fn returning(ip: IpAddr) -> Self {
        Self {
            ip: Some(ip),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            ip: None,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeedTester for MockSpeedTester {
    async fn select_best_ip(&self) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.ip
            .ok_or_else(|| Error::Other("优选失败: 未能提取到最优IP".to_string()))
    }

    fn best_known_ip(&self) -> Option<IpAddr> {
        None
    }
}

/// A hosts writer that records calls instead of touching a file
pub struct MockHostsWriter {
    rewrite_calls: Arc<AtomicUsize>,
    clear_calls: Arc<AtomicUsize>,
    /// Order of calls ("clear"/"rewrite")
    calls: Arc<Mutex<Vec<&'static str>>>,
    last_doc: Arc<Mutex<Option<ConfigDocument>>>,
    fail_rewrite: bool,
}

impl MockHostsWriter {
    pub fn new() -> Self {
        Self {
            rewrite_calls: Arc::new(AtomicUsize::new(0)),
            clear_calls: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            last_doc: Arc::new(Mutex::new(None)),
            fail_rewrite: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_rewrite: true,
            ..Self::new()
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            rewrite_calls: Arc::clone(&other.rewrite_calls),
            clear_calls: Arc::clone(&other.clear_calls),
            calls: Arc::clone(&other.calls),
            last_doc: Arc::clone(&other.last_doc),
            fail_rewrite: other.fail_rewrite,
        }
    }

    pub fn rewrite_count(&self) -> usize {
        self.rewrite_calls.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }

    pub fn call_order(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_doc(&self) -> Option<ConfigDocument> {
        self.last_doc.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostsWriter for MockHostsWriter {
    async fn rewrite(&self, doc: &ConfigDocument) -> Result<usize> {
        self.rewrite_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push("rewrite");
        if self.fail_rewrite {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "hosts file is read-only",
            )));
        }
        *self.last_doc.lock().unwrap() = Some(doc.clone());
        Ok(doc.trackers().iter().filter(|t| t.enable).count())
    }

    async fn read_current_hosts(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn clear_managed_sections(&self) -> Result<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push("clear");
        Ok(())
    }
}

/// A classifier that accepts a fixed set of hosts
pub struct MockClassifier {
    accelerated: BTreeSet<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockClassifier {
    pub fn accepting(hosts: &[&str]) -> Self {
        Self {
            accelerated: hosts.iter().map(|h| h.to_string()).collect(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            accelerated: other.accelerated.clone(),
            calls: Arc::clone(&other.calls),
        }
    }

    pub fn classified(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudflareClassifier for MockClassifier {
    async fn is_accelerated(&self, host: &str) -> bool {
        self.calls.lock().unwrap().push(host.to_string());
        self.accelerated.contains(host)
    }
}

/// A download client reporting fixed tracker domains
pub struct MockTrackerSource {
    id: String,
    name: String,
    result: std::result::Result<Vec<String>, String>,
}

impl MockTrackerSource {
    pub fn reporting(id: &str, domains: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: format!("client-{}", id),
            result: Ok(domains.iter().map(|d| d.to_string()).collect()),
        }
    }

    pub fn failing(id: &str, message: &str) -> Self {
        Self {
            id: id.to_string(),
            name: format!("client-{}", id),
            result: Err(message.to_string()),
        }
    }

    pub fn boxed(self) -> Box<dyn TrackerSource> {
        Box::new(self)
    }
}

#[async_trait]
impl TrackerSource for MockTrackerSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClientKind {
        ClientKind::Qbittorrent
    }

    async fn list_tracker_domains(&self) -> Result<Vec<String>> {
        self.result
            .clone()
            .map_err(|message| Error::provider("mock", message))
    }
}

/// A transport that records every message, failing for selected channels
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<(String, String, ChannelPayload)>>>,
    failing_channels: BTreeSet<String>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failing_channels: BTreeSet::new(),
        }
    }

    pub fn failing_for(channels: &[&str]) -> Self {
        Self {
            failing_channels: channels.iter().map(|c| c.to_string()).collect(),
            ..Self::new()
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            sent: Arc::clone(&other.sent),
            failing_channels: other.failing_channels.clone(),
        }
    }

    pub fn sent(&self) -> Vec<(String, String, ChannelPayload)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotifyTransport for RecordingTransport {
    async fn send(&self, title: &str, content: &str, payload: &ChannelPayload) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), content.to_string(), payload.clone()));
        if self.failing_channels.contains(&payload.channel) {
            return Err(Error::http(format!("{} unreachable", payload.channel)));
        }
        Ok(())
    }
}

/// A notify config with one enabled, valid Bark channel named `bark`
pub fn notify_with_bark() -> ptaccel_core::config::NotifyConfig {
    use ptaccel_core::config::{ChannelKind, NotifyChannel, NotifyConfig};

    let mut notify = NotifyConfig::default();
    notify.channels.insert(
        "bark".to_string(),
        NotifyChannel::enabled(ChannelKind::Bark {
            push: Some("https://api.day.app/key".to_string()),
            sound: None,
            group: None,
        }),
    );
    notify
}

pub fn ip(raw: &str) -> IpAddr {
    raw.parse().expect("valid ip literal")
}
