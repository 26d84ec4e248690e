// # File Config Store
//
// File-based implementation of ConfigStore.
//
// ## Purpose
//
// Persists the configuration document as pretty-printed JSON. Every `load`
// reads the file again so external edits are picked up immediately.
//
// ## Write Path
//
// - New document written to `<path>.tmp` and flushed
// - Previous document copied to `<path>.backup`
// - `<path>.tmp` renamed over `<path>`
//
// ## Read Path
//
// - Missing file: empty document
// - Unreadable or unparsable file: `Error::ConfigUnreadable`. The file is
//   never rewritten behind the operator's back; restore from `.backup` by hand.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::ConfigDocument;
use crate::traits::ConfigStore;
use crate::Error;

/// File-based configuration store
///
/// # Example
///
/// ```rust,no_run
/// use ptaccel_core::store::FileConfigStore;
/// use ptaccel_core::traits::ConfigStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileConfigStore::open("config/config.json").await?;
///
///     let mut doc = store.load().await?;
///     doc.cloudflare_domains.insert("tracker.example.org".into());
///     store.save(&doc).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Open a store at `path`, creating parent directories if needed
    ///
    /// The file itself is not created until the first save.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self { path })
    }

    /// Path of the configuration file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<ConfigDocument, Error> {
        if !self.path.exists() {
            tracing::debug!("Config file does not exist: {}", self.path.display());
            return Ok(ConfigDocument::default());
        }

        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            Error::config_unreadable(format!("{}: {}", self.path.display(), e))
        })?;

        if content.trim().is_empty() {
            return Ok(ConfigDocument::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            tracing::error!("Config file {} failed to parse: {}", self.path.display(), e);
            Error::config_unreadable(format!("{}: {}", self.path.display(), e))
        })
    }

    async fn save(&self, doc: &ConfigDocument) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(doc)?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create config backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::config(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Config written to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerEntry;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_loads_empty_document() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::open(dir.path().join("nested/config.json"))
            .await
            .unwrap();

        let doc = store.load().await.unwrap();
        assert_eq!(doc, ConfigDocument::default());
        assert!(dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::open(&path).await.unwrap();

        let mut doc = ConfigDocument::default();
        doc.trackers_mut().push(TrackerEntry::new("tracker.example.org", "104.16.91.215"));
        store.save(&doc).await.unwrap();

        let reopened = FileConfigStore::open(&path).await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), doc);
        assert!(!dir.path().join("config.tmp").exists());
    }

    #[tokio::test]
    async fn test_second_save_keeps_backup_of_previous_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::open(&path).await.unwrap();

        let mut doc = ConfigDocument::default();
        doc.trackers_mut().push(TrackerEntry::new("a.example", "1.1.1.1"));
        store.save(&doc).await.unwrap();
        doc.trackers_mut().push(TrackerEntry::new("b.example", "1.1.1.1"));
        store.save(&doc).await.unwrap();

        let backup = fs::read_to_string(FileConfigStore::backup_path(&path))
            .await
            .unwrap();
        let previous: ConfigDocument = serde_json::from_str(&backup).unwrap();
        assert_eq!(previous.trackers().len(), 1);
    }

    #[tokio::test]
    async fn test_garbage_is_unreadable_and_left_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, b"{ not json").await.unwrap();

        let store = FileConfigStore::open(&path).await.unwrap();
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::ConfigUnreadable(_)));

        let still = fs::read_to_string(&path).await.unwrap();
        assert_eq!(still, "{ not json");
    }
}
