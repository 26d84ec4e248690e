// # Config Store Trait
//
// Defines load/save of the single configuration document.
//
// ## Purpose
//
// Every registry loads a fresh snapshot at the start of an operation and
// writes the whole document back before returning. There is no merge and no
// locking between callers: concurrent read-modify-write cycles are
// last-write-wins.
//
// ## Implementations
//
// - File-based: pretty-printed JSON with atomic replace
// - In-memory: tests and embedding
//
// ## Usage
//
// ```rust,ignore
// use ptaccel_core::ConfigStore;
//
// let mut doc = store.load().await?;
// doc.cloudflare_domains.insert("tracker.example.org".into());
// store.save(&doc).await?;
// ```

use async_trait::async_trait;

use crate::config::ConfigDocument;

/// Trait for configuration document storage
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the current document
    ///
    /// # Returns
    ///
    /// - `Ok(ConfigDocument)`: the stored document, or an empty one if nothing
    ///   has been stored yet
    /// - `Err(Error::ConfigUnreadable)`: the stored document exists but cannot
    ///   be read or parsed
    async fn load(&self) -> Result<ConfigDocument, crate::Error>;

    /// Replace the stored document
    async fn save(&self, doc: &ConfigDocument) -> Result<(), crate::Error>;
}
