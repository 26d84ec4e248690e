//! Contract Test: Import Idempotency & Isolation
//!
//! Constraints verified:
//! - A second import with no new remote domains writes nothing and does not
//!   rewrite the hosts file
//! - One failing client does not stop the others
//! - A client that cannot be constructed is reported, not dropped
//! - Whitelisted domains bypass the classifier
//! - Stored domains keep their port; classification sees only the host
//!
//! If this test fails, imports churn the hosts file or drop clients.

mod common;

use common::*;
use ptaccel_core::config::{ClientKind, ConfigDocument, TrackerEntry};
use ptaccel_core::traits::ConfigStore;
use ptaccel_core::{
    CloudflareReconciler, EnabledSources, Error, ImportPipeline, MemoryConfigStore, UnbuiltClient,
    BOOTSTRAP_IP,
};
use std::sync::Arc;

struct Fixture {
    store: MemoryConfigStore,
    hosts: Arc<MockHostsWriter>,
    classifier: Arc<MockClassifier>,
    pipeline: ImportPipeline,
}

fn fixture(doc: ConfigDocument, accelerated: &[&str]) -> Fixture {
    fixture_with_hosts(doc, accelerated, MockHostsWriter::new())
}

fn fixture_with_hosts(doc: ConfigDocument, accelerated: &[&str], hosts: MockHostsWriter) -> Fixture {
    let store = MemoryConfigStore::with_document(doc);
    let hosts = Arc::new(hosts);
    let classifier = Arc::new(MockClassifier::accepting(accelerated));
    let reconciler = CloudflareReconciler::new(Arc::new(store.clone()), classifier.clone());
    let pipeline = ImportPipeline::new(Arc::new(store.clone()), reconciler, hosts.clone());
    Fixture {
        store,
        hosts,
        classifier,
        pipeline,
    }
}

#[tokio::test]
async fn rerun_without_new_domains_is_a_no_op() {
    let f = fixture(ConfigDocument::new(), &["t1.example", "t2.example"]);
    let sources = vec![
        MockTrackerSource::reporting("qb", &["t1.example", "http://t2.example/announce", "t1.example"]).boxed(),
    ];

    let first = f.pipeline.import_from_clients(&sources).await.unwrap();
    assert_eq!(first.imported, vec!["t1.example", "t2.example"]);
    assert!(first.hosts_rewritten);
    assert_eq!(f.store.save_count(), 1);
    assert_eq!(f.hosts.rewrite_count(), 1);

    let second = f.pipeline.import_from_clients(&sources).await.unwrap();
    assert!(second.imported.is_empty());
    assert_eq!(second.already_present.len(), 2);
    assert_eq!(f.store.save_count(), 1, "second import must not write");
    assert_eq!(f.hosts.rewrite_count(), 1, "second import must not rewrite hosts");
    assert!(second.message.starts_with("未发现新的Cloudflare站点"));
}

#[tokio::test]
async fn failing_client_is_reported_not_raised() {
    let f = fixture(ConfigDocument::new(), &["t1.example"]);
    let sources = vec![
        MockTrackerSource::failing("tr", "connection refused").boxed(),
        MockTrackerSource::reporting("qb", &["t1.example"]).boxed(),
    ];

    let report = f.pipeline.import_from_clients(&sources).await.unwrap();
    assert_eq!(report.imported, vec!["t1.example"]);
    assert!(!report.client_results["tr"].success);
    assert!(report.client_results["qb"].success);
    assert!(matches!(report.failures()[0], Error::ClientImport { .. }));
    assert!(report.client_summary().contains("失败("));
}

#[tokio::test]
async fn non_accelerated_domains_are_filtered() {
    let f = fixture(ConfigDocument::new(), &["cf.example"]);
    let sources = vec![MockTrackerSource::reporting("qb", &["cf.example", "plain.example"]).boxed()];

    let report = f.pipeline.import_from_clients(&sources).await.unwrap();
    assert_eq!(report.imported, vec!["cf.example"]);
    assert_eq!(report.filtered, vec!["plain.example"]);
    assert_eq!(
        report.message,
        "成功导入 1 个Cloudflare站点，已过滤 1 个非Cloudflare站点，Hosts已更新"
    );

    let doc = f.store.load().await.unwrap();
    assert!(doc.has_tracker("cf.example"));
    assert!(!doc.has_tracker("plain.example"));
    assert!(doc.cloudflare_domains.contains("cf.example"));
}

#[tokio::test]
async fn whitelist_bypasses_classifier() {
    let mut doc = ConfigDocument::new();
    doc.cloudflare_domains.insert("example.org".to_string());
    let f = fixture(doc, &[]);
    let sources = vec![MockTrackerSource::reporting("qb", &["tracker.example.org"]).boxed()];

    let report = f.pipeline.import_from_clients(&sources).await.unwrap();
    assert_eq!(report.imported, vec!["tracker.example.org"]);
    assert!(f.classifier.classified().is_empty());
}

#[tokio::test]
async fn port_is_kept_in_storage_but_not_in_classification() {
    let f = fixture(ConfigDocument::new(), &["pt.example"]);
    let sources = vec![MockTrackerSource::reporting("qb", &["pt.example:2710"]).boxed()];

    let report = f.pipeline.import_from_clients(&sources).await.unwrap();
    assert_eq!(report.imported, vec!["pt.example:2710"]);
    assert_eq!(f.classifier.classified(), vec!["pt.example"]);
}

#[tokio::test]
async fn imports_follow_shared_ip_or_bootstrap() {
    let f = fixture(ConfigDocument::new(), &["a.example"]);
    let sources = vec![MockTrackerSource::reporting("qb", &["a.example"]).boxed()];
    f.pipeline.import_from_clients(&sources).await.unwrap();
    assert_eq!(f.store.load().await.unwrap().trackers()[0].ip, BOOTSTRAP_IP);

    let mut doc = ConfigDocument::new();
    doc.trackers_mut().push(TrackerEntry::new("old.example", "104.16.9.9"));
    let f = fixture(doc, &["a.example"]);
    f.pipeline.import_from_clients(&sources).await.unwrap();
    let doc = f.store.load().await.unwrap();
    assert!(doc.trackers().iter().all(|t| t.ip == "104.16.9.9"));
}

#[tokio::test]
async fn inconsistent_ips_abort_import_without_write() {
    let mut doc = ConfigDocument::new();
    doc.trackers_mut().push(TrackerEntry::new("x.example", "1.1.1.1"));
    doc.trackers_mut().push(TrackerEntry::new("y.example", "2.2.2.2"));
    let f = fixture(doc, &["a.example"]);
    let sources = vec![MockTrackerSource::reporting("qb", &["a.example"]).boxed()];

    let err = f.pipeline.import_from_clients(&sources).await.unwrap_err();
    assert!(matches!(err, Error::InconsistentTrackerIp));
    assert_eq!(f.store.save_count(), 0);
    assert_eq!(f.hosts.rewrite_count(), 0);
}

#[tokio::test]
async fn hosts_failure_is_reported_after_save() {
    let f = fixture_with_hosts(ConfigDocument::new(), &["a.example"], MockHostsWriter::failing());
    let sources = vec![MockTrackerSource::reporting("qb", &["a.example"]).boxed()];

    let report = f.pipeline.import_from_clients(&sources).await.unwrap();
    assert!(!report.hosts_rewritten);
    assert!(report.message.ends_with("Hosts更新失败"));
    assert_eq!(f.store.save_count(), 1);
}

#[tokio::test]
async fn unbuilt_clients_appear_in_client_results() {
    let f = fixture(ConfigDocument::new(), &["a.example"]);
    let enabled = EnabledSources {
        sources: vec![MockTrackerSource::reporting("qb", &["a.example"]).boxed()],
        unbuilt: vec![UnbuiltClient {
            id: "tr".to_string(),
            name: "NAS".to_string(),
            kind: ClientKind::Transmission,
            error: Error::config("Invalid host for torrent client tr: nas box"),
        }],
    };

    let report = f.pipeline.import_enabled(&enabled).await.unwrap();
    assert_eq!(report.imported, vec!["a.example"]);

    let failed = &report.client_results["tr"];
    assert!(!failed.success);
    assert_eq!(failed.kind, ClientKind::Transmission);
    assert!(failed.error.as_deref().unwrap().contains("nas box"));
    assert!(report.client_results["qb"].success);
    assert_eq!(report.failures().len(), 1);
    assert!(report.client_summary().contains("NAS: 失败("));
}
