// # ptaccel-core
//
// Configuration reconciliation and task-dispatch engine for PT tracker
// acceleration.
//
// ## Architecture Overview
//
// - **ConfigStore**: Load/save of the single configuration document
// - **TrackerRegistry**: Tracker list under domain-uniqueness and IP-uniformity invariants
// - **HostsSourceRegistry**: Remote hosts files merged into the managed section
// - **CloudflareReconciler**: Whitelist-aware acceleration check and whitelist edits
// - **ImportPipeline**: Tracker discovery from download clients
// - **TaskOrchestrator**: One heavy task at a time, observable status
// - **HeavyTasks**: Speed test, tracker IP sync and hosts rewrite bodies
// - **NotificationDispatcher**: Per-channel fan-out of task outcomes
// - **ClientRegistry**: Plugin-based registry of download client factories
// - **SettingsRegistry**: Download clients, notify settings and the schedule
//
// ## Design Principles
//
// 1. **Library-First**: Every operation is usable without the binary
// 2. **Plugin-Based**: Speed test, hosts file, classifier, clients and
//    notification delivery are traits implemented in separate crates
// 3. **Whole-Document Writes**: Operations load a fresh snapshot and save the
//    whole document back; invariant violations leave it untouched

pub mod traits;
pub mod store;
pub mod registry;
pub mod config;
pub mod domain;
pub mod error;
pub mod tracker;
pub mod reconciler;
pub mod import;
pub mod task;
pub mod heavy;
pub mod notify;
pub mod settings;

// Re-export core types for convenience
pub use traits::{
    ChannelPayload, CloudflareClassifier, ConfigStore, HostsWriter, NotifyTransport, SpeedTester,
    TrackerSource, TrackerSourceFactory,
};
pub use config::{
    ChannelKind, ClientKind, CloudflareSettings, ConfigDocument, HostsSource, NotifyChannel,
    NotifyConfig, TorrentClientConfig, TrackerEntry,
};
pub use error::{Error, Result};
pub use store::{FileConfigStore, MemoryConfigStore};
pub use registry::{ClientRegistry, EnabledSources, UnbuiltClient};
pub use tracker::{BatchAddReport, HostsSourceRegistry, TrackerRegistry, BOOTSTRAP_IP};
pub use reconciler::CloudflareReconciler;
pub use import::{ClientResult, ImportPipeline, ImportReport};
pub use task::{TaskKind, TaskOrchestrator, TaskProgress, TaskState, TaskStatus};
pub use heavy::HeavyTasks;
pub use notify::{DispatchReport, NotificationDispatcher};
pub use settings::{NotifyUpdate, SettingsRegistry};
