// # HTTP Notification Transport
//
// `NotifyTransport` implementation that delivers one message to one channel
// over HTTP.
//
// ## Supported Families
//
// | Family       | Endpoint                                               |
// |--------------|--------------------------------------------------------|
// | `webhook`    | Operator URL, method, body template and headers        |
// | `wecom_bot`  | `{origin}/cgi-bin/webhook/send?key=`                   |
// | `telegram`   | `https://{api host}/bot{token}/sendMessage`            |
// | `bark`       | `BARK_PUSH` URL, or the public server plus the key     |
// | `serverchan` | `https://sctapi.ftqq.com/{key}.send`                   |
// | `igot`       | `https://push.hellyw.com/{key}`                        |
// | `feishu`     | `https://open.feishu.cn/open-apis/bot/v2/hook/{key}`   |
// | `dingtalk`   | `https://oapi.dingtalk.com/robot/send`, HMAC-signed    |
// | `chat`       | `CHAT_URL` + `CHAT_TOKEN`                              |
//
// `smtp` and `wecom_app` are modelled in the configuration but not delivered
// here; sending to them returns a provider error.
//
// ## Hitokoto
//
// When the payload asks for it, a line from the hitokoto service is appended
// to the content. A failed lookup leaves the content unchanged.

mod channels;
mod endpoints;
mod sign;
mod webhook;

pub use endpoints::Endpoints;
pub use sign::dingtalk_signature;
pub use webhook::{parse_headers, render_template};

use std::time::Duration;

use async_trait::async_trait;
use ptaccel_core::config::ChannelKind;
use ptaccel_core::traits::{ChannelPayload, NotifyTransport};
use ptaccel_core::{Error, Result};
use serde::Deserialize;

/// Timeout of a single delivery
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout of the hitokoto lookup
const HITOKOTO_TIMEOUT: Duration = Duration::from_secs(5);

const PROVIDER: &str = "notify";

#[derive(Debug, Deserialize)]
struct Hitokoto {
    hitokoto: String,
    #[serde(default)]
    from: String,
}

/// Delivers notifications over HTTP
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl Default for HttpNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpNotifier {
    /// Create a notifier using the public service endpoints
    pub fn new() -> Self {
        Self::with_endpoints(Endpoints::default())
    }

    /// Create a notifier with custom service endpoints
    pub fn with_endpoints(endpoints: Endpoints) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            endpoints,
        }
    }

    /// `content` with a hitokoto line appended, if one can be fetched
    async fn with_hitokoto(&self, content: &str) -> String {
        let lookup = async {
            self.client
                .get(&self.endpoints.hitokoto)
                .timeout(HITOKOTO_TIMEOUT)
                .send()
                .await?
                .error_for_status()?
                .json::<Hitokoto>()
                .await
        };
        match lookup.await {
            Ok(line) if line.from.is_empty() => format!("{}\n\n{}", content, line.hitokoto),
            Ok(line) => format!("{}\n\n{}    ----{}", content, line.hitokoto, line.from),
            Err(e) => {
                tracing::debug!("Hitokoto unavailable: {}", e);
                content.to_string()
            }
        }
    }
}

#[async_trait]
impl NotifyTransport for HttpNotifier {
    async fn send(&self, title: &str, content: &str, payload: &ChannelPayload) -> Result<()> {
        let content = if payload.hitokoto {
            self.with_hitokoto(content).await
        } else {
            content.to_string()
        };

        tracing::debug!("Sending to {} via {}", payload.channel, payload.kind.family());
        match &payload.kind {
            ChannelKind::Webhook {
                url,
                method,
                body,
                headers,
                content_type,
            } => {
                self.send_webhook(
                    title,
                    &content,
                    url.as_deref().unwrap_or_default(),
                    method.as_deref(),
                    body.as_deref(),
                    headers.as_deref(),
                    content_type.as_deref(),
                )
                .await
            }
            ChannelKind::WecomBot { key, origin } => {
                self.send_wecom_bot(title, &content, key.as_deref().unwrap_or_default(), origin.as_deref())
                    .await
            }
            ChannelKind::Telegram {
                bot_token,
                user_id,
                api_host,
            } => {
                self.send_telegram(
                    title,
                    &content,
                    bot_token.as_deref().unwrap_or_default(),
                    user_id.as_deref().unwrap_or_default(),
                    api_host.as_deref(),
                )
                .await
            }
            ChannelKind::Bark { push, sound, group } => {
                self.send_bark(
                    title,
                    &content,
                    push.as_deref().unwrap_or_default(),
                    sound.as_deref(),
                    group.as_deref(),
                )
                .await
            }
            ChannelKind::Serverchan { push_key } => {
                self.send_serverchan(title, &content, push_key.as_deref().unwrap_or_default())
                    .await
            }
            ChannelKind::Igot { push_key } => {
                self.send_igot(title, &content, push_key.as_deref().unwrap_or_default())
                    .await
            }
            ChannelKind::Feishu { key } => {
                self.send_feishu(title, &content, key.as_deref().unwrap_or_default())
                    .await
            }
            ChannelKind::Dingtalk { token, secret } => {
                self.send_dingtalk(
                    title,
                    &content,
                    token.as_deref().unwrap_or_default(),
                    secret.as_deref().unwrap_or_default(),
                )
                .await
            }
            ChannelKind::Chat { url, token } => {
                self.send_chat(
                    title,
                    &content,
                    url.as_deref().unwrap_or_default(),
                    token.as_deref().unwrap_or_default(),
                )
                .await
            }
            ChannelKind::Smtp { .. }
            | ChannelKind::WecomApp { .. }
            | ChannelKind::Unsupported { .. } => Err(Error::provider(
                PROVIDER,
                format!("{} delivery is not supported", payload.kind.family()),
            )),
        }
    }
}
