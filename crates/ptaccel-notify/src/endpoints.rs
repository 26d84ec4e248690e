//! Service base URLs

/// Base URLs of the hosted push services
///
/// Only tests and self-hosted deployments need anything but the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Bark server used when `BARK_PUSH` is a bare key
    pub bark: String,
    /// ServerChan API
    pub serverchan: String,
    /// iGot API
    pub igot: String,
    /// Feishu bot hooks
    pub feishu: String,
    /// DingTalk robot send endpoint
    pub dingtalk: String,
    /// WeCom origin used when `QYWX_ORIGIN` is unset
    pub wecom: String,
    /// Telegram API host used when `TG_API_HOST` is unset
    pub telegram: String,
    /// Hitokoto sentence service
    pub hitokoto: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            bark: "https://api.day.app".to_string(),
            serverchan: "https://sctapi.ftqq.com".to_string(),
            igot: "https://push.hellyw.com".to_string(),
            feishu: "https://open.feishu.cn/open-apis/bot/v2/hook".to_string(),
            dingtalk: "https://oapi.dingtalk.com/robot/send".to_string(),
            wecom: "https://qyapi.weixin.qq.com".to_string(),
            telegram: "https://api.telegram.org".to_string(),
            hitokoto: "https://v1.hitokoto.cn".to_string(),
        }
    }
}

impl Endpoints {
    /// Every service served from one base URL
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            bark: base.to_string(),
            serverchan: base.to_string(),
            igot: base.to_string(),
            feishu: format!("{}/feishu", base),
            dingtalk: format!("{}/robot/send", base),
            wecom: base.to_string(),
            telegram: base.to_string(),
            hitokoto: format!("{}/hitokoto", base),
        }
    }
}
