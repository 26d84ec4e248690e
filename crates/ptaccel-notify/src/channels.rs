//! Per-family delivery

use ptaccel_core::{Error, Result};
use reqwest::{Method, RequestBuilder};
use serde_json::{Value, json};

use crate::sign::dingtalk_signature;
use crate::webhook::{parse_headers, render_template};
use crate::{HttpNotifier, PROVIDER};

fn text_message(title: &str, content: &str) -> String {
    format!("{}\n\n{}", title, content)
}

fn https_base(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

impl HttpNotifier {
    async fn execute(&self, family: &str, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: {}", family, e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                PROVIDER,
                format!("{} returned {} - {}", family, status, body),
            ));
        }
        Ok(response)
    }

    /// Execute and require a JSON body whose `field` equals `expected`
    async fn execute_checked(
        &self,
        family: &str,
        request: RequestBuilder,
        field: &str,
        expected: Value,
    ) -> Result<()> {
        let reply: Value = self
            .execute(family, request)
            .await?
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("{}: unparseable reply: {}", family, e)))?;
        if reply.get(field) == Some(&expected) {
            Ok(())
        } else {
            Err(Error::provider(PROVIDER, format!("{} rejected the message: {}", family, reply)))
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn send_webhook(
        &self,
        title: &str,
        content: &str,
        url: &str,
        method: Option<&str>,
        body: Option<&str>,
        headers: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<()> {
        let method = method
            .map(|m| m.trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "POST".to_string());
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| Error::provider(PROVIDER, format!("Invalid webhook method: {}", method)))?;
        let content_type = content_type
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("application/json");

        let url = url
            .replace("$title", &urlencoding::encode(title))
            .replace("$content", &urlencoding::encode(content));
        let mut request = self.client.request(method.clone(), &url);
        for (name, value) in parse_headers(headers.unwrap_or_default()) {
            request = request.header(name, value);
        }

        if method != Method::GET {
            let is_json = content_type.contains("json");
            let body = match body.map(str::trim).filter(|b| !b.is_empty()) {
                Some(template) => render_template(template, title, content, is_json),
                None if is_json => json!({ "title": title, "content": content }).to_string(),
                None => format!(
                    "title={}&content={}",
                    urlencoding::encode(title),
                    urlencoding::encode(content)
                ),
            };
            request = request.header(reqwest::header::CONTENT_TYPE, content_type).body(body);
        }

        self.execute("webhook", request).await.map(|_| ())
    }

    pub(crate) async fn send_wecom_bot(
        &self,
        title: &str,
        content: &str,
        key: &str,
        origin: Option<&str>,
    ) -> Result<()> {
        let origin = origin
            .filter(|o| !o.trim().is_empty())
            .map(https_base)
            .unwrap_or_else(|| self.endpoints.wecom.clone());
        let request = self
            .client
            .post(format!("{}/cgi-bin/webhook/send", origin))
            .query(&[("key", key)])
            .json(&json!({ "msgtype": "text", "text": { "content": text_message(title, content) } }));
        self.execute_checked("wecom_bot", request, "errcode", json!(0)).await
    }

    pub(crate) async fn send_telegram(
        &self,
        title: &str,
        content: &str,
        bot_token: &str,
        user_id: &str,
        api_host: Option<&str>,
    ) -> Result<()> {
        let base = api_host
            .filter(|h| !h.trim().is_empty())
            .map(https_base)
            .unwrap_or_else(|| self.endpoints.telegram.clone());
        let request = self
            .client
            .post(format!("{}/bot{}/sendMessage", base, bot_token))
            .json(&json!({
                "chat_id": user_id,
                "text": text_message(title, content),
                "disable_web_page_preview": true,
            }));
        self.execute_checked("telegram", request, "ok", json!(true)).await
    }

    pub(crate) async fn send_bark(
        &self,
        title: &str,
        content: &str,
        push: &str,
        sound: Option<&str>,
        group: Option<&str>,
    ) -> Result<()> {
        let push = push.trim().trim_end_matches('/');
        let url = if push.starts_with("http://") || push.starts_with("https://") {
            push.to_string()
        } else {
            format!("{}/{}", self.endpoints.bark, push)
        };

        let mut body = json!({ "title": title, "body": content });
        if let Some(sound) = sound.filter(|s| !s.trim().is_empty()) {
            body["sound"] = json!(sound);
        }
        if let Some(group) = group.filter(|g| !g.trim().is_empty()) {
            body["group"] = json!(group);
        }
        self.execute("bark", self.client.post(url).json(&body)).await.map(|_| ())
    }

    pub(crate) async fn send_serverchan(&self, title: &str, content: &str, key: &str) -> Result<()> {
        let desp = content.replace('\n', "\n\n");
        let request = self
            .client
            .post(format!("{}/{}.send", self.endpoints.serverchan, key.trim()))
            .form(&[("title", title), ("desp", desp.as_str())]);
        self.execute("serverchan", request).await.map(|_| ())
    }

    pub(crate) async fn send_igot(&self, title: &str, content: &str, key: &str) -> Result<()> {
        let request = self
            .client
            .post(format!("{}/{}", self.endpoints.igot, key.trim()))
            .form(&[("title", title), ("content", content)]);
        self.execute_checked("igot", request, "ret", json!(0)).await
    }

    pub(crate) async fn send_feishu(&self, title: &str, content: &str, key: &str) -> Result<()> {
        let request = self
            .client
            .post(format!("{}/{}", self.endpoints.feishu, key.trim()))
            .json(&json!({ "msg_type": "text", "content": { "text": text_message(title, content) } }));
        self.execute("feishu", request).await.map(|_| ())
    }

    pub(crate) async fn send_dingtalk(
        &self,
        title: &str,
        content: &str,
        token: &str,
        secret: &str,
    ) -> Result<()> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        // The signature is already percent-encoded
        let url = format!(
            "{}?access_token={}&timestamp={}&sign={}",
            self.endpoints.dingtalk,
            urlencoding::encode(token.trim()),
            timestamp,
            dingtalk_signature(timestamp, secret.trim())
        );
        let request = self
            .client
            .post(url)
            .json(&json!({ "msgtype": "text", "text": { "content": text_message(title, content) } }));
        self.execute_checked("dingtalk", request, "errcode", json!(0)).await
    }

    pub(crate) async fn send_chat(&self, title: &str, content: &str, url: &str, token: &str) -> Result<()> {
        let payload = json!({ "text": format!("{}\n{}", title, content) }).to_string();
        let request = self
            .client
            .post(format!("{}{}", url.trim(), token.trim()))
            .form(&[("payload", payload.as_str())]);
        self.execute("chat", request).await.map(|_| ())
    }
}
