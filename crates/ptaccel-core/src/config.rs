//! Configuration document model
//!
//! A single JSON document is the sole source of truth for trackers, hosts
//! sources, the Cloudflare whitelist, download clients and notification
//! channels. Keys this crate does not understand are carried through
//! load/save untouched.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::Ipv6Addr;
use std::str::FromStr;

/// Default cron expression for the scheduled speed test
pub const DEFAULT_CRON: &str = "0 0 * * *";

fn default_true() -> bool {
    true
}

fn default_cron() -> String {
    DEFAULT_CRON.to_string()
}

/// The persisted configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Tracker entries; `None` when the field is absent from the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trackers: Option<Vec<TrackerEntry>>,

    /// Hosts sources; `None` when the field is absent from the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts_sources: Option<Vec<HostsSource>>,

    /// Must-accelerate whitelist (lower-cased)
    #[serde(default)]
    pub cloudflare_domains: BTreeSet<String>,

    /// Download clients queried by the import pipeline
    #[serde(default)]
    pub torrent_clients: Vec<TorrentClientConfig>,

    /// Notification settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Scheduled speed-test settings
    #[serde(default)]
    pub cloudflare: CloudflareSettings,

    /// Authentication settings, kept verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<serde_json::Value>,

    /// Unknown top-level keys
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConfigDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker entries, empty when the field is absent
    pub fn trackers(&self) -> &[TrackerEntry] {
        self.trackers.as_deref().unwrap_or_default()
    }

    /// Mutable tracker list, creating the field when absent
    pub fn trackers_mut(&mut self) -> &mut Vec<TrackerEntry> {
        self.trackers.get_or_insert_with(Vec::new)
    }

    /// Hosts sources, empty when the field is absent
    pub fn hosts_sources(&self) -> &[HostsSource] {
        self.hosts_sources.as_deref().unwrap_or_default()
    }

    /// Mutable hosts source list, creating the field when absent
    pub fn hosts_sources_mut(&mut self) -> &mut Vec<HostsSource> {
        self.hosts_sources.get_or_insert_with(Vec::new)
    }

    /// Whether a tracker with exactly this domain exists
    pub fn has_tracker(&self, domain: &str) -> bool {
        self.trackers().iter().any(|t| t.domain == domain)
    }

    /// Distinct non-empty IPs among enabled trackers
    pub fn enabled_tracker_ips(&self) -> BTreeSet<&str> {
        self.trackers()
            .iter()
            .filter(|t| t.enable && !t.ip.trim().is_empty())
            .map(|t| t.ip.trim())
            .collect()
    }

    /// Enabled download clients
    pub fn enabled_clients(&self) -> impl Iterator<Item = &TorrentClientConfig> {
        self.torrent_clients.iter().filter(|c| c.enable)
    }

    /// Validate the download client list
    ///
    /// Checks every descriptor and rejects duplicate client ids.
    pub fn validate_clients(&self) -> Result<(), crate::Error> {
        let mut seen = HashSet::new();
        for client in &self.torrent_clients {
            client.validate()?;
            if !seen.insert(client.id.as_str()) {
                return Err(crate::Error::DuplicateClient(client.id.clone()));
            }
        }
        Ok(())
    }
}

/// A tracker domain pinned to an IP in the hosts file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerEntry {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Normalized domain, optionally with a port
    pub domain: String,
    /// Pinned IP (may be empty)
    #[serde(default)]
    pub ip: String,
    /// Whether the entry is written to the hosts file
    #[serde(default = "default_true")]
    pub enable: bool,
}

impl TrackerEntry {
    /// Create an enabled entry named after its domain
    pub fn new(domain: impl Into<String>, ip: impl Into<String>) -> Self {
        let domain = domain.into();
        Self {
            name: domain.clone(),
            domain,
            ip: ip.into(),
            enable: true,
        }
    }
}

/// A remote hosts file merged into the managed section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostsSource {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Normalized URL (always carries a scheme)
    pub url: String,
    /// Whether the source is fetched
    #[serde(default = "default_true")]
    pub enable: bool,
}

/// Scheduled speed-test settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudflareSettings {
    /// Whether the scheduled run is enabled
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Cron expression consumed by the external scheduler
    #[serde(default = "default_cron")]
    pub cron: String,
}

impl Default for CloudflareSettings {
    fn default() -> Self {
        Self {
            enable: true,
            cron: default_cron(),
        }
    }
}

/// Check a five-field cron expression (`min hour dom month dow`)
///
/// Day-of-week numbers follow the usual 0-7 convention with Sunday as 0 or 7.
pub fn validate_cron(expr: &str) -> Result<(), crate::Error> {
    let invalid = || crate::Error::invalid_input(format!("CRON表达式无效，请检查格式: {}", expr));

    let fields: Vec<&str> = expr.split_whitespace().collect();
    let [minute, hour, dom, month, dow] = fields.as_slice() else {
        return Err(invalid());
    };
    // the cron crate wants a seconds field and counts weekdays from 1
    let with_seconds = format!(
        "0 {} {} {} {} {}",
        minute,
        hour,
        dom,
        month,
        shift_weekdays(dow)
    );
    cron::Schedule::from_str(&with_seconds).map_err(|_| invalid())?;
    Ok(())
}

/// Map 0-7 weekday numbers onto 1-7, leaving step values alone
fn shift_weekdays(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut digits = String::new();
    let mut after_slash = false;
    for c in field.chars().map(Some).chain(std::iter::once(None)) {
        if let Some(d) = c.filter(char::is_ascii_digit) {
            digits.push(d);
            continue;
        }
        if !digits.is_empty() {
            match digits.parse::<u32>() {
                Ok(n) if !after_slash && n <= 7 => out.push_str(&(n % 7 + 1).to_string()),
                _ => out.push_str(&digits),
            }
            digits.clear();
        }
        if let Some(c) = c {
            after_slash = c == '/';
            out.push(c);
        }
    }
    out
}

/// Download client family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// qBittorrent Web API v2
    Qbittorrent,
    /// Transmission RPC
    Transmission,
}

impl ClientKind {
    /// Registry key for this client family
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::Qbittorrent => "qbittorrent",
            ClientKind::Transmission => "transmission",
        }
    }
}

impl FromStr for ClientKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qbittorrent" => Ok(ClientKind::Qbittorrent),
            "transmission" => Ok(ClientKind::Transmission),
            other => Err(crate::Error::invalid_input(format!("不支持的客户端类型: {}", other))),
        }
    }
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Download client descriptor
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentClientConfig {
    /// Unique id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Client family
    #[serde(rename = "type")]
    pub kind: ClientKind,
    /// Hostname or IPv4 address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Login user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Login password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Use https instead of http
    #[serde(default)]
    pub use_https: bool,
    /// RPC path (Transmission)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Whether the client is queried on import
    #[serde(default = "default_true")]
    pub enable: bool,
}

// Passwords stay out of logs
impl std::fmt::Debug for TorrentClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorrentClientConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("use_https", &self.use_https)
            .field("path", &self.path)
            .field("enable", &self.enable)
            .finish()
    }
}

impl TorrentClientConfig {
    /// Validate a single descriptor
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.id.trim().is_empty() {
            return Err(crate::Error::config("Torrent client id cannot be empty"));
        }
        let host_ok = !self.host.trim().is_empty()
            && (self.host.parse::<Ipv6Addr>().is_ok() || url::Host::parse(&self.host).is_ok());
        if !host_ok {
            return Err(crate::Error::config(format!(
                "Invalid host for torrent client {}: {}",
                self.id, self.host
            )));
        }
        if self.port == 0 {
            return Err(crate::Error::config(format!(
                "Port must be between 1 and 65535 for torrent client {}",
                self.id
            )));
        }
        Ok(())
    }

    /// Base URL of the client's web interface
    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}", scheme, self.host, self.port)
        }
    }

    /// Name used in reports, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

/// Notification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Global switch
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Global hitokoto default for channels that don't set `HITOKOTO`
    #[serde(default = "default_true")]
    pub hitokoto: bool,
    /// Titles the test path refuses to send
    #[serde(default)]
    pub skip_titles: Vec<String>,
    /// Saved channels keyed by name
    #[serde(default)]
    pub channels: BTreeMap<String, NotifyChannel>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enable: true,
            hitokoto: true,
            skip_titles: Vec::new(),
            channels: BTreeMap::new(),
        }
    }
}

/// Per-channel `HITOKOTO` value, persisted as bool, string or number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HitokotoSetting {
    /// Boolean form
    Flag(bool),
    /// String form ("true"/"false"/...)
    Text(String),
    /// Anything else, kept as written
    Other(serde_json::Value),
}

impl HitokotoSetting {
    /// Interpret the setting as a switch
    pub fn is_on(&self) -> bool {
        match self {
            HitokotoSetting::Flag(b) => *b,
            HitokotoSetting::Text(s) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
            }
            HitokotoSetting::Other(value) => value.as_f64().is_some_and(|n| n != 0.0),
        }
    }
}

/// Scalar field as text; `null`, arrays and objects have none
fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Lenient readers for hand-edited channel entries
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(super::scalar_text))
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(opt_string(d)?.unwrap_or_default())
    }

    pub fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Bool(b)) => Some(b),
            Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" | "" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }
}

/// A configured notification channel
///
/// Persisted as a flat key/value object: the reserved keys `name`, `type`,
/// `enable` and `HITOKOTO`, plus whatever fields the channel family uses.
/// Every field is kept across load/save, including ones no family reads.
/// Use [`NotifyChannel::kind`] for the typed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyChannel {
    /// Display name (not forwarded to the transport)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub name: Option<String>,
    /// Enable flag; the default depends on where the channel came from
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_bool"
    )]
    pub enable: Option<bool>,
    /// Per-channel hitokoto override
    #[serde(rename = "HITOKOTO", default, skip_serializing_if = "Option::is_none")]
    pub hitokoto: Option<HitokotoSetting>,
    /// Family name as written (`bark`, `dingding`, `wxpusher`, ...)
    #[serde(rename = "type", default, deserialize_with = "lenient::string")]
    pub family: String,
    /// Family-specific fields, verbatim
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl NotifyChannel {
    /// Create an enabled channel of the given family
    pub fn enabled(kind: ChannelKind) -> Self {
        Self {
            name: None,
            enable: Some(true),
            hitokoto: None,
            family: kind.family().to_string(),
            fields: kind.to_fields(),
        }
    }

    /// A family field as text, numbers and booleans included
    pub fn field(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(scalar_text)
    }

    /// Typed view of the family and its fields
    ///
    /// Unknown families become [`ChannelKind::Unsupported`], which is never
    /// dispatchable.
    pub fn kind(&self) -> ChannelKind {
        let f = |key: &str| self.field(key);
        match self.family.trim().to_ascii_lowercase().as_str() {
            "webhook" => ChannelKind::Webhook {
                url: f("WEBHOOK_URL"),
                method: f("WEBHOOK_METHOD"),
                body: f("WEBHOOK_BODY"),
                headers: f("WEBHOOK_HEADERS"),
                content_type: f("WEBHOOK_CONTENT_TYPE"),
            },
            "wecom_bot" => ChannelKind::WecomBot {
                key: f("QYWX_KEY"),
                origin: f("QYWX_ORIGIN"),
            },
            "wecom_app" => ChannelKind::WecomApp { am: f("QYWX_AM") },
            "telegram" => ChannelKind::Telegram {
                bot_token: f("TG_BOT_TOKEN"),
                user_id: f("TG_USER_ID"),
                api_host: f("TG_API_HOST"),
            },
            "smtp" => ChannelKind::Smtp {
                server: f("SMTP_SERVER"),
                email: f("SMTP_EMAIL"),
                password: f("SMTP_PASSWORD"),
                ssl: f("SMTP_SSL"),
                sender_name: f("SMTP_NAME"),
            },
            "bark" => ChannelKind::Bark {
                push: f("BARK_PUSH"),
                sound: f("BARK_SOUND"),
                group: f("BARK_GROUP"),
            },
            "serverchan" | "serverj" => ChannelKind::Serverchan {
                push_key: f("PUSH_KEY"),
            },
            "igot" => ChannelKind::Igot {
                push_key: f("IGOT_PUSH_KEY"),
            },
            "feishu" => ChannelKind::Feishu { key: f("FSKEY") },
            "dingtalk" | "dingding" => ChannelKind::Dingtalk {
                token: f("DD_BOT_TOKEN"),
                secret: f("DD_BOT_SECRET"),
            },
            "chat" => ChannelKind::Chat {
                url: f("CHAT_URL"),
                token: f("CHAT_TOKEN"),
            },
            _ => ChannelKind::Unsupported {
                family: self.family.clone(),
            },
        }
    }
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Channel family with the fields delivery needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    /// Generic webhook
    Webhook {
        url: Option<String>,
        method: Option<String>,
        body: Option<String>,
        headers: Option<String>,
        content_type: Option<String>,
    },
    /// WeCom group bot
    WecomBot {
        key: Option<String>,
        origin: Option<String>,
    },
    /// WeCom application message
    WecomApp { am: Option<String> },
    /// Telegram bot
    Telegram {
        bot_token: Option<String>,
        user_id: Option<String>,
        api_host: Option<String>,
    },
    /// SMTP mail
    Smtp {
        server: Option<String>,
        email: Option<String>,
        password: Option<String>,
        ssl: Option<String>,
        sender_name: Option<String>,
    },
    /// Bark push
    Bark {
        push: Option<String>,
        sound: Option<String>,
        group: Option<String>,
    },
    /// ServerChan
    Serverchan { push_key: Option<String> },
    /// iGot
    Igot { push_key: Option<String> },
    /// Feishu bot
    Feishu { key: Option<String> },
    /// DingTalk bot with signed requests
    Dingtalk {
        token: Option<String>,
        secret: Option<String>,
    },
    /// Synology Chat
    Chat {
        url: Option<String>,
        token: Option<String>,
    },
    /// A family this crate cannot deliver to
    Unsupported { family: String },
}

impl ChannelKind {
    /// Canonical family name
    pub fn family(&self) -> &str {
        match self {
            ChannelKind::Webhook { .. } => "webhook",
            ChannelKind::WecomBot { .. } => "wecom_bot",
            ChannelKind::WecomApp { .. } => "wecom_app",
            ChannelKind::Telegram { .. } => "telegram",
            ChannelKind::Smtp { .. } => "smtp",
            ChannelKind::Bark { .. } => "bark",
            ChannelKind::Serverchan { .. } => "serverchan",
            ChannelKind::Igot { .. } => "igot",
            ChannelKind::Feishu { .. } => "feishu",
            ChannelKind::Dingtalk { .. } => "dingtalk",
            ChannelKind::Chat { .. } => "chat",
            ChannelKind::Unsupported { family } => family,
        }
    }

    /// Persisted keys and values of the fields that are set
    fn persisted(&self) -> Vec<(&'static str, &Option<String>)> {
        match self {
            ChannelKind::Webhook {
                url,
                method,
                body,
                headers,
                content_type,
            } => vec![
                ("WEBHOOK_URL", url),
                ("WEBHOOK_METHOD", method),
                ("WEBHOOK_BODY", body),
                ("WEBHOOK_HEADERS", headers),
                ("WEBHOOK_CONTENT_TYPE", content_type),
            ],
            ChannelKind::WecomBot { key, origin } => vec![("QYWX_KEY", key), ("QYWX_ORIGIN", origin)],
            ChannelKind::WecomApp { am } => vec![("QYWX_AM", am)],
            ChannelKind::Telegram {
                bot_token,
                user_id,
                api_host,
            } => vec![
                ("TG_BOT_TOKEN", bot_token),
                ("TG_USER_ID", user_id),
                ("TG_API_HOST", api_host),
            ],
            ChannelKind::Smtp {
                server,
                email,
                password,
                ssl,
                sender_name,
            } => vec![
                ("SMTP_SERVER", server),
                ("SMTP_EMAIL", email),
                ("SMTP_PASSWORD", password),
                ("SMTP_SSL", ssl),
                ("SMTP_NAME", sender_name),
            ],
            ChannelKind::Bark { push, sound, group } => vec![
                ("BARK_PUSH", push),
                ("BARK_SOUND", sound),
                ("BARK_GROUP", group),
            ],
            ChannelKind::Serverchan { push_key } => vec![("PUSH_KEY", push_key)],
            ChannelKind::Igot { push_key } => vec![("IGOT_PUSH_KEY", push_key)],
            ChannelKind::Feishu { key } => vec![("FSKEY", key)],
            ChannelKind::Dingtalk { token, secret } => {
                vec![("DD_BOT_TOKEN", token), ("DD_BOT_SECRET", secret)]
            }
            ChannelKind::Chat { url, token } => vec![("CHAT_URL", url), ("CHAT_TOKEN", token)],
            ChannelKind::Unsupported { .. } => Vec::new(),
        }
    }

    fn to_fields(&self) -> BTreeMap<String, serde_json::Value> {
        self.persisted()
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_ref()
                    .map(|v| (key.to_string(), serde_json::Value::String(v.clone())))
            })
            .collect()
    }

    /// Required persisted keys that are missing or blank
    ///
    /// An unsupported family always reports `type`.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let required: &[&str] = match self {
            ChannelKind::Webhook { .. } => &["WEBHOOK_URL", "WEBHOOK_METHOD"],
            ChannelKind::WecomBot { .. } => &["QYWX_KEY"],
            ChannelKind::WecomApp { .. } => &["QYWX_AM"],
            ChannelKind::Telegram { .. } => &["TG_BOT_TOKEN", "TG_USER_ID"],
            ChannelKind::Smtp { .. } => &["SMTP_SERVER", "SMTP_EMAIL", "SMTP_PASSWORD"],
            ChannelKind::Bark { .. } => &["BARK_PUSH"],
            ChannelKind::Serverchan { .. } => &["PUSH_KEY"],
            ChannelKind::Igot { .. } => &["IGOT_PUSH_KEY"],
            ChannelKind::Feishu { .. } => &["FSKEY"],
            ChannelKind::Dingtalk { .. } => &["DD_BOT_TOKEN", "DD_BOT_SECRET"],
            ChannelKind::Chat { .. } => &["CHAT_URL", "CHAT_TOKEN"],
            ChannelKind::Unsupported { .. } => return vec!["type"],
        };

        let present = self.persisted();
        required
            .iter()
            .copied()
            .filter(|key| {
                !present
                    .iter()
                    .any(|(name, value)| name == key && filled(value))
            })
            .collect()
    }

    /// Whether every required field is present and non-empty
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}
