// # Notification Dispatcher
//
// Expands the notify configuration into per-channel payloads and hands each
// valid one to the transport.
//
// ## Channel Selection
//
// - Saved channels are used only when `enable` is explicitly true.
// - An override map replaces the saved channels entirely; its channels are
//   enabled unless they say otherwise.
// - A channel is dropped silently when a required field of its family is
//   missing or blank.
//
// ## Delivery
//
// Channels are sent one after the other. A transport error is logged and
// counted; it never stops the remaining channels and never reaches the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;

use crate::config::{NotifyChannel, NotifyConfig};
use crate::error::{Error, Result};
use crate::traits::{ChannelPayload, NotifyTransport};

/// Default title of the test message
pub const TEST_TITLE: &str = "通知测试";

/// Default content of the test message
pub const TEST_CONTENT: &str = "这是一条测试消息";

/// Report message when a test title is in `skip_titles`
pub const SKIPPED_TITLE_MESSAGE: &str = "标题在跳过列表中，未发送";

const SUCCESS_MARKERS: &[&str] = &["完成", "success", "已更新", "已完成", "成功"];
const FAILURE_MARKERS: &[&str] = &["失败", "error", "异常"];

/// Outcome class inferred from a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Message contains a success marker and no failure marker
    Success,
    /// Message contains a failure marker
    Failure,
    /// Neither
    Neutral,
}

impl Outcome {
    /// Classify free-form task output
    ///
    /// Failure markers win over success markers.
    pub fn classify(content: &str) -> Self {
        if FAILURE_MARKERS.iter().any(|m| content.contains(m)) {
            Outcome::Failure
        } else if SUCCESS_MARKERS.iter().any(|m| content.contains(m)) {
            Outcome::Success
        } else {
            Outcome::Neutral
        }
    }

    /// Status emoji
    pub fn emoji(&self) -> &'static str {
        match self {
            Outcome::Success => "✅",
            Outcome::Failure => "❌",
            Outcome::Neutral => "ℹ️",
        }
    }
}

/// Decorate a task title
pub fn decorate_title(title: &str) -> String {
    match title {
        "IP优选与Hosts更新" => "🚀 IP优选与Hosts更新".to_string(),
        "仅更新Hosts" => "🛠️ 仅更新Hosts".to_string(),
        "清空并更新Hosts" => "🧹 清空并更新Hosts".to_string(),
        other => format!("📣 {}", other),
    }
}

/// Decorate task output with a status emoji and a timestamp footer
pub fn decorate_content(content: &str, timestamp: &str) -> String {
    format!("{} {}\n\n🕒 {}", Outcome::classify(content).emoji(), content, timestamp)
}

/// Flatten the channels that should receive a message
///
/// Returns the valid payloads and the names of dropped channels.
pub fn expand_channels(
    notify: &NotifyConfig,
    override_channels: Option<&BTreeMap<String, NotifyChannel>>,
) -> (Vec<ChannelPayload>, Vec<String>) {
    let (channels, enable_default) = match override_channels {
        Some(channels) => (channels, true),
        None => (&notify.channels, false),
    };

    let mut payloads = Vec::new();
    let mut dropped = Vec::new();
    for (name, channel) in channels {
        if !channel.enable.unwrap_or(enable_default) {
            continue;
        }
        let kind = channel.kind();
        let missing = kind.missing_fields();
        if !missing.is_empty() {
            tracing::debug!("Channel {} missing {:?}, skipped", name, missing);
            dropped.push(name.clone());
            continue;
        }
        payloads.push(ChannelPayload {
            channel: name.clone(),
            kind,
            hitokoto: channel
                .hitokoto
                .as_ref()
                .map_or(notify.hitokoto, |setting| setting.is_on()),
        });
    }
    (payloads, dropped)
}

/// Outcome of a dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Channels handed to the transport
    pub delivered: Vec<String>,
    /// Channels whose transport call failed, with the error text
    pub failed: Vec<(String, String)>,
    /// Enabled channels dropped by validation
    pub invalid: Vec<String>,
    /// Set when nothing was sent on purpose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl DispatchReport {
    /// Number of channels attempted
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Fans a message out to configured channels
#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn NotifyTransport>,
}

impl NotificationDispatcher {
    /// Create a dispatcher over `transport`
    pub fn new(transport: Arc<dyn NotifyTransport>) -> Self {
        Self { transport }
    }

    /// Send a decorated task notification
    ///
    /// Never fails; per-channel errors are in the report.
    pub async fn dispatch(
        &self,
        notify: &NotifyConfig,
        title: &str,
        content: &str,
        override_channels: Option<&BTreeMap<String, NotifyChannel>>,
    ) -> DispatchReport {
        let title = decorate_title(title);
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let content = decorate_content(content, &timestamp);

        let (payloads, invalid) = expand_channels(notify, override_channels);
        let mut report = self.deliver(&title, &content, payloads).await;
        report.invalid = invalid;
        report
    }

    /// Send an undecorated test message
    ///
    /// # Errors
    ///
    /// - `NotificationsDisabled` when `notify.enable` is false
    /// - `NoDispatchableChannel` when no channel passes validation
    ///
    /// A title listed in `skip_titles` is not an error: nothing is sent and
    /// the report carries [`SKIPPED_TITLE_MESSAGE`].
    pub async fn send_test(
        &self,
        notify: &NotifyConfig,
        title: Option<&str>,
        content: Option<&str>,
        override_channels: Option<&BTreeMap<String, NotifyChannel>>,
    ) -> Result<DispatchReport> {
        if !notify.enable {
            return Err(Error::NotificationsDisabled);
        }

        let title = title.filter(|t| !t.trim().is_empty()).unwrap_or(TEST_TITLE);
        let content = content.filter(|c| !c.trim().is_empty()).unwrap_or(TEST_CONTENT);

        let (payloads, invalid) = expand_channels(notify, override_channels);
        if payloads.is_empty() {
            return Err(Error::NoDispatchableChannel);
        }

        if notify.skip_titles.iter().any(|skip| skip == title) {
            tracing::info!("Title {} is in skip_titles, nothing sent", title);
            return Ok(DispatchReport {
                invalid,
                skipped: Some(SKIPPED_TITLE_MESSAGE.to_string()),
                ..Default::default()
            });
        }

        let mut report = self.deliver(title, content, payloads).await;
        report.invalid = invalid;
        Ok(report)
    }

    async fn deliver(&self, title: &str, content: &str, payloads: Vec<ChannelPayload>) -> DispatchReport {
        let mut report = DispatchReport::default();
        for payload in payloads {
            match self.transport.send(title, content, &payload).await {
                Ok(()) => {
                    tracing::info!("Notification sent via {} ({})", payload.channel, payload.kind.family());
                    report.delivered.push(payload.channel);
                }
                Err(e) => {
                    tracing::error!("Notification via {} failed: {}", payload.channel, e);
                    report.failed.push((payload.channel, e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelKind, HitokotoSetting};

    fn bark(push: &str) -> ChannelKind {
        ChannelKind::Bark {
            push: Some(push.to_string()),
            sound: None,
            group: None,
        }
    }

    #[test]
    fn test_title_decoration() {
        assert_eq!(decorate_title("仅更新Hosts"), "🛠️ 仅更新Hosts");
        assert_eq!(decorate_title("导入"), "📣 导入");
    }

    #[test]
    fn test_failure_marker_wins() {
        assert_eq!(Outcome::classify("已完成hosts更新"), Outcome::Success);
        assert_eq!(Outcome::classify("优选完成但写入失败"), Outcome::Failure);
        assert_eq!(Outcome::classify("无任务"), Outcome::Neutral);
        assert_eq!(
            decorate_content("优选失败", "2024-01-01 00:00:00"),
            "❌ 优选失败\n\n🕒 2024-01-01 00:00:00"
        );
    }

    #[test]
    fn test_saved_channels_need_explicit_enable() {
        let mut notify = NotifyConfig::default();
        let mut implicit = NotifyChannel::enabled(bark("k1"));
        implicit.enable = None;
        notify.channels.insert("implicit".into(), implicit);
        notify.channels.insert("explicit".into(), NotifyChannel::enabled(bark("k2")));
        notify.channels.insert("broken".into(), NotifyChannel::enabled(bark(" ")));

        let (payloads, dropped) = expand_channels(&notify, None);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].channel, "explicit");
        assert_eq!(dropped, vec!["broken".to_string()]);
    }

    #[test]
    fn test_override_replaces_saved_and_defaults_enabled() {
        let mut notify = NotifyConfig::default();
        notify.channels.insert("saved".into(), NotifyChannel::enabled(bark("k1")));

        let mut over = BTreeMap::new();
        let mut channel = NotifyChannel::enabled(bark("k9"));
        channel.enable = None;
        over.insert("adhoc".into(), channel);

        let (payloads, _) = expand_channels(&notify, Some(&over));
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].channel, "adhoc");
    }

    #[test]
    fn test_hitokoto_resolution() {
        let mut notify = NotifyConfig {
            hitokoto: false,
            ..Default::default()
        };
        let mut own = NotifyChannel::enabled(bark("k1"));
        own.hitokoto = Some(HitokotoSetting::Flag(true));
        notify.channels.insert("own".into(), own);
        notify.channels.insert("global".into(), NotifyChannel::enabled(bark("k2")));

        let (payloads, _) = expand_channels(&notify, None);
        let by_name: BTreeMap<_, _> = payloads.iter().map(|p| (p.channel.as_str(), p.hitokoto)).collect();
        assert_eq!(by_name["own"], true);
        assert_eq!(by_name["global"], false);
    }
}
