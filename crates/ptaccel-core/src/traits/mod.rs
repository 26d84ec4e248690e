//! Collaborator traits for the engine
//!
//! - [`ConfigStore`]: Load/save of the configuration document
//! - [`SpeedTester`]: Edge IP selection
//! - [`HostsWriter`]: Managed hosts file section
//! - [`CloudflareClassifier`]: CDN membership check
//! - [`TrackerSource`]: Download client tracker discovery
//! - [`NotifyTransport`]: Per-channel notification delivery

pub mod config_store;
pub mod speed_tester;
pub mod hosts_writer;
pub mod classifier;
pub mod tracker_source;
pub mod notify_transport;

pub use config_store::ConfigStore;
pub use speed_tester::SpeedTester;
pub use hosts_writer::HostsWriter;
pub use classifier::CloudflareClassifier;
pub use tracker_source::{TrackerSource, TrackerSourceFactory};
pub use notify_transport::{ChannelPayload, NotifyTransport};
