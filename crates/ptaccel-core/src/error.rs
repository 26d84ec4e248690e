//! Error types for the PT-Accelerator engine
//!
//! Invariant violations abort the triggering operation and leave the
//! configuration document untouched. Per-client and per-channel failures are
//! carried inside reports instead of being raised.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// A tracker with the same normalized domain already exists
    #[error("Tracker已存在: {0}")]
    DuplicateTracker(String),

    /// Enabled trackers disagree on their IP
    #[error("检测到现有Tracker的IP不一致，请先统一所有Tracker的IP后再添加。")]
    InconsistentTrackerIp,

    /// The tracker list is absent from the document
    #[error("Tracker不存在: {0}")]
    TrackerNotFound(String),

    /// The configuration document could not be read or parsed
    #[error("配置文件无法读取: {0}")]
    ConfigUnreadable(String),

    /// A heavy task is already running
    #[error("已有任务正在运行: {0}")]
    TaskAlreadyRunning(String),

    /// A URL could not be normalized into scheme + host
    #[error("Hosts源URL无效: {0}")]
    InvalidUrl(String),

    /// A download client failed during import
    #[error("客户端导入失败 ({client}): {message}")]
    ClientImport {
        /// Client name
        client: String,
        /// Error message
        message: String,
    },

    /// A hosts source with the same URL already exists
    #[error("hosts源已存在: {0}")]
    DuplicateHostsSource(String),

    /// The hosts source list is absent from the document
    #[error("Hosts源不存在: {0}")]
    HostsSourceNotFound(String),

    /// No download client with this id is configured
    #[error("未找到客户端: {0}")]
    ClientNotFound(String),

    /// A download client with the same id already exists
    #[error("客户端ID不能重复: {0}")]
    DuplicateClient(String),

    /// Notifications are globally disabled
    #[error("通知功能未启用")]
    NotificationsDisabled,

    /// No configured channel passed validation
    #[error("未检测到可用的通知渠道，请检查通知配置")]
    NoDispatchableChannel,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Collaborator-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a duplicate tracker error
    pub fn duplicate_tracker(domain: impl Into<String>) -> Self {
        Self::DuplicateTracker(domain.into())
    }

    /// Create a tracker not found error
    pub fn tracker_not_found(domain: impl Into<String>) -> Self {
        Self::TrackerNotFound(domain.into())
    }

    /// Create a config unreadable error
    pub fn config_unreadable(msg: impl Into<String>) -> Self {
        Self::ConfigUnreadable(msg.into())
    }

    /// Create an invalid URL error
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl(url.into())
    }

    /// Create a per-client import error
    pub fn client_import(client: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ClientImport {
            client: client.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error is an invariant violation that left the document untouched
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTracker(_)
                | Self::InconsistentTrackerIp
                | Self::TaskAlreadyRunning(_)
                | Self::InvalidUrl(_)
                | Self::DuplicateHostsSource(_)
                | Self::DuplicateClient(_)
                | Self::InvalidInput(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
