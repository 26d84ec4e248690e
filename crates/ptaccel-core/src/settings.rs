//! Download client, notification and schedule settings
//!
//! Lightweight mutations of the configuration document that carry no
//! cross-entry invariants beyond client id uniqueness. Each call loads a
//! fresh snapshot, edits one section and saves the whole document.

use std::sync::Arc;

use crate::config::{
    CloudflareSettings, HitokotoSetting, NotifyChannel, NotifyConfig, TorrentClientConfig,
    validate_cron,
};
use crate::error::{Error, Result};
use crate::traits::ConfigStore;

/// Partial update of the global notify switches
///
/// `None` leaves a setting as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyUpdate {
    /// Global switch
    pub enable: Option<bool>,
    /// Global hitokoto default
    pub hitokoto: Option<bool>,
    /// Replacement skip-title list
    pub skip_titles: Option<Vec<String>>,
}

/// Settings operations on top of a ConfigStore
#[derive(Clone)]
pub struct SettingsRegistry {
    store: Arc<dyn ConfigStore>,
}

impl SettingsRegistry {
    /// Create a registry over `store`
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Configured download clients, enabled or not
    pub async fn clients(&self) -> Result<Vec<TorrentClientConfig>> {
        Ok(self.store.load().await?.torrent_clients)
    }

    /// A configured client by id
    pub async fn client(&self, id: &str) -> Result<TorrentClientConfig> {
        self.store
            .load()
            .await?
            .torrent_clients
            .into_iter()
            .find(|c| c.id == id.trim())
            .ok_or_else(|| Error::ClientNotFound(id.trim().to_string()))
    }

    /// Add a download client
    ///
    /// # Errors
    ///
    /// - `Config` when the descriptor fails validation
    /// - `DuplicateClient` when the id is taken
    pub async fn add_client(&self, mut client: TorrentClientConfig) -> Result<TorrentClientConfig> {
        client.id = client.id.trim().to_string();
        client.name = client.name.trim().to_string();
        client.host = client.host.trim().to_string();
        client.validate()?;

        let mut doc = self.store.load().await?;
        doc.torrent_clients.push(client.clone());
        doc.validate_clients()?;
        self.store.save(&doc).await?;

        tracing::info!("Added torrent client {} ({})", client.id, client.kind);
        Ok(client)
    }

    /// Remove a download client by id
    pub async fn delete_client(&self, id: &str) -> Result<TorrentClientConfig> {
        let id = id.trim();
        let mut doc = self.store.load().await?;
        let index = doc
            .torrent_clients
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::ClientNotFound(id.to_string()))?;
        let removed = doc.torrent_clients.remove(index);
        self.store.save(&doc).await?;

        tracing::info!("Deleted torrent client {}", removed.id);
        Ok(removed)
    }

    /// Enable or disable a download client
    pub async fn set_client_enabled(&self, id: &str, enable: bool) -> Result<TorrentClientConfig> {
        let id = id.trim();
        let mut doc = self.store.load().await?;
        let client = doc
            .torrent_clients
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::ClientNotFound(id.to_string()))?;
        client.enable = enable;
        let updated = client.clone();
        self.store.save(&doc).await?;
        Ok(updated)
    }

    /// Scheduled speed-test settings
    pub async fn cloudflare(&self) -> Result<CloudflareSettings> {
        Ok(self.store.load().await?.cloudflare)
    }

    /// Update the scheduled speed-test settings
    ///
    /// A new cron expression must have five fields; an invalid one leaves the
    /// document untouched.
    pub async fn set_cloudflare(
        &self,
        enable: Option<bool>,
        cron: Option<&str>,
    ) -> Result<CloudflareSettings> {
        let cron = cron.map(str::trim);
        if let Some(expr) = cron {
            validate_cron(expr)?;
        }

        let mut doc = self.store.load().await?;
        if let Some(enable) = enable {
            doc.cloudflare.enable = enable;
        }
        if let Some(expr) = cron {
            doc.cloudflare.cron = expr.to_string();
        }
        self.store.save(&doc).await?;

        tracing::info!(
            "Cloudflare schedule: enable={} cron={}",
            doc.cloudflare.enable,
            doc.cloudflare.cron
        );
        Ok(doc.cloudflare)
    }

    /// Current notify settings
    pub async fn notify(&self) -> Result<NotifyConfig> {
        Ok(self.store.load().await?.notify)
    }

    /// Replace the notify section
    pub async fn save_notify(&self, notify: NotifyConfig) -> Result<NotifyConfig> {
        let mut doc = self.store.load().await?;
        doc.notify = notify;
        self.store.save(&doc).await?;

        tracing::info!("Notify settings saved with {} channel(s)", doc.notify.channels.len());
        Ok(doc.notify)
    }

    /// Apply a partial update to the global notify switches
    pub async fn update_notify(&self, update: NotifyUpdate) -> Result<NotifyConfig> {
        let mut notify = self.notify().await?;
        if let Some(enable) = update.enable {
            notify.enable = enable;
        }
        if let Some(hitokoto) = update.hitokoto {
            notify.hitokoto = hitokoto;
        }
        if let Some(titles) = update.skip_titles {
            notify.skip_titles = titles
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        self.save_notify(notify).await
    }

    /// Create or merge a channel
    ///
    /// `fields` are merged into an existing channel of the same name; an
    /// empty value removes the field. `family` replaces the channel type when
    /// given and is required for a new channel.
    pub async fn put_channel(
        &self,
        name: &str,
        family: Option<&str>,
        fields: &[(String, String)],
        enable: Option<bool>,
        hitokoto: Option<bool>,
    ) -> Result<NotifyChannel> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_input("Channel name cannot be empty"));
        }

        let mut notify = self.notify().await?;
        let mut channel = match (notify.channels.remove(name), family) {
            (Some(existing), _) => existing,
            (None, Some(_)) => NotifyChannel {
                name: Some(name.to_string()),
                enable: Some(true),
                hitokoto: None,
                family: String::new(),
                fields: Default::default(),
            },
            (None, None) => {
                return Err(Error::invalid_input(format!(
                    "New channel {} needs a type",
                    name
                )));
            }
        };

        if let Some(family) = family.map(str::trim).filter(|f| !f.is_empty()) {
            channel.family = family.to_string();
        }
        for (key, value) in fields {
            let key = key.trim();
            if value.trim().is_empty() {
                channel.fields.remove(key);
            } else {
                channel
                    .fields
                    .insert(key.to_string(), serde_json::Value::String(value.trim().to_string()));
            }
        }
        if enable.is_some() {
            channel.enable = enable;
        }
        if let Some(on) = hitokoto {
            channel.hitokoto = Some(HitokotoSetting::Flag(on));
        }

        let missing = channel.kind().missing_fields();
        if !missing.is_empty() {
            tracing::warn!("Channel {} is incomplete, missing {:?}", name, missing);
        }

        notify.channels.insert(name.to_string(), channel.clone());
        self.save_notify(notify).await?;
        Ok(channel)
    }

    /// Remove a channel; returns whether it existed
    pub async fn remove_channel(&self, name: &str) -> Result<bool> {
        let mut notify = self.notify().await?;
        if notify.channels.remove(name.trim()).is_none() {
            return Ok(false);
        }
        self.save_notify(notify).await?;
        Ok(true)
    }
}
