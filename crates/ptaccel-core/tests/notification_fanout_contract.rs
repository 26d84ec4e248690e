//! Contract Test: Notification Fan-out
//!
//! Constraints verified:
//! - A failing channel never prevents delivery to the others
//! - Invalid channels are dropped, not sent
//! - Task notifications are decorated; test sends are not
//! - The test path refuses when disabled or when nothing is dispatchable
//! - A skipped test title succeeds without sending anything
//! - Channels of unknown families load but are never sent
//!
//! If this test fails, one broken webhook silences every channel.

mod common;

use common::*;
use ptaccel_core::config::{ChannelKind, HitokotoSetting, NotifyChannel, NotifyConfig};
use ptaccel_core::notify::SKIPPED_TITLE_MESSAGE;
use ptaccel_core::{Error, NotificationDispatcher};
use std::collections::BTreeMap;
use std::sync::Arc;

fn telegram(token: &str, user: &str) -> NotifyChannel {
    NotifyChannel::enabled(ChannelKind::Telegram {
        bot_token: Some(token.to_string()),
        user_id: Some(user.to_string()),
        api_host: None,
    })
}

fn webhook(url: &str) -> NotifyChannel {
    NotifyChannel::enabled(ChannelKind::Webhook {
        url: Some(url.to_string()),
        method: Some("POST".to_string()),
        body: None,
        headers: None,
        content_type: None,
    })
}

fn three_channels() -> NotifyConfig {
    let mut notify = notify_with_bark();
    notify.channels.insert("hook".to_string(), webhook("https://hooks.example/x"));
    notify.channels.insert("tg".to_string(), telegram("123:abc", ""));
    notify
}

#[tokio::test]
async fn failing_channel_does_not_block_others() {
    let transport = Arc::new(RecordingTransport::failing_for(&["bark"]));
    let dispatcher = NotificationDispatcher::new(transport.clone());

    let report = dispatcher
        .dispatch(&three_channels(), "仅更新Hosts", "已完成hosts更新，添加了2条记录", None)
        .await;

    assert_eq!(report.delivered, vec!["hook".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "bark");
    assert_eq!(report.invalid, vec!["tg".to_string()]);
    assert_eq!(report.attempted(), 2);
    assert_eq!(transport.send_count(), 2);
}

#[tokio::test]
async fn task_notifications_are_decorated() {
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = NotificationDispatcher::new(transport.clone());

    dispatcher
        .dispatch(&notify_with_bark(), "导入完成", "成功导入 1 个Cloudflare站点", None)
        .await;

    let (title, content, payload) = transport.sent().remove(0);
    assert_eq!(title, "📣 导入完成");
    assert!(content.starts_with("✅ 成功导入 1 个Cloudflare站点\n\n🕒 "));
    assert!(payload.hitokoto, "global hitokoto defaults to on");
}

#[tokio::test]
async fn dispatch_ignores_global_enable() {
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = NotificationDispatcher::new(transport.clone());
    let mut notify = notify_with_bark();
    notify.enable = false;

    dispatcher.dispatch(&notify, "仅更新Hosts", "x", None).await;
    assert_eq!(transport.send_count(), 1);

    let err = dispatcher.send_test(&notify, None, None, None).await.unwrap_err();
    assert!(matches!(err, Error::NotificationsDisabled));
}

#[tokio::test]
async fn test_send_is_raw_and_validated() {
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = NotificationDispatcher::new(transport.clone());

    let report = dispatcher
        .send_test(&notify_with_bark(), None, None, None)
        .await
        .unwrap();
    assert_eq!(report.delivered.len(), 1);
    let (title, content, _) = transport.sent().remove(0);
    assert_eq!(title, "通知测试");
    assert_eq!(content, "这是一条测试消息");

    let empty = NotifyConfig::default();
    assert!(matches!(
        dispatcher.send_test(&empty, None, None, None).await,
        Err(Error::NoDispatchableChannel)
    ));

}

#[tokio::test]
async fn skipped_title_succeeds_without_sending() {
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = NotificationDispatcher::new(transport.clone());

    let mut skipping = notify_with_bark();
    skipping.skip_titles.push("通知测试".to_string());
    let report = dispatcher
        .send_test(&skipping, None, None, None)
        .await
        .unwrap();
    assert_eq!(report.skipped.as_deref(), Some(SKIPPED_TITLE_MESSAGE));
    assert!(report.delivered.is_empty());
    assert_eq!(transport.send_count(), 0);

    // channel validation still comes first
    let mut nothing_valid = NotifyConfig::default();
    nothing_valid.skip_titles.push("通知测试".to_string());
    assert!(matches!(
        dispatcher.send_test(&nothing_valid, None, None, None).await,
        Err(Error::NoDispatchableChannel)
    ));
}

#[tokio::test]
async fn unknown_family_channels_are_not_dispatched() {
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = NotificationDispatcher::new(transport.clone());

    let mut notify = notify_with_bark();
    let wx: NotifyChannel = serde_json::from_value(serde_json::json!({
        "type": "wxpusher", "enable": true, "WXPUSHER_APP_TOKEN": "AT_x"
    }))
    .unwrap();
    notify.channels.insert("wx".to_string(), wx);

    let report = dispatcher.dispatch(&notify, "仅更新Hosts", "完成", None).await;
    assert_eq!(report.delivered.len(), 1);
    assert_eq!(report.invalid, vec!["wx".to_string()]);
}

#[tokio::test]
async fn override_channels_replace_saved_ones() {
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = NotificationDispatcher::new(transport.clone());

    let mut adhoc = webhook("https://hooks.example/adhoc");
    adhoc.enable = None;
    adhoc.hitokoto = Some(HitokotoSetting::Text("false".to_string()));
    let overrides: BTreeMap<String, NotifyChannel> = [("adhoc".to_string(), adhoc)].into();

    dispatcher
        .send_test(&notify_with_bark(), Some("hi"), Some("there"), Some(&overrides))
        .await
        .unwrap();

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].2.channel, "adhoc");
    assert!(!sent[0].2.hitokoto);
}
