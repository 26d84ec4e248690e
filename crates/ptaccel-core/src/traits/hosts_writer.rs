// # Hosts Writer Trait
//
// Renders the managed section of the local hosts file.
//
// ## Contract
//
// - `rewrite` regenerates the managed section from the given document and
//   returns the number of entries written. Lines outside the managed section
//   are preserved. An `Err` means nothing usable was written.
// - `clear_managed_sections` removes every managed section and leaves the
//   rest of the file intact.
//
// ## Implementations
//
// - Marker-delimited file writer: `ptaccel-hosts` crate

use async_trait::async_trait;

use crate::config::ConfigDocument;

/// Trait for hosts file rendering
#[async_trait]
pub trait HostsWriter: Send + Sync {
    /// Regenerate the managed section from `doc`
    async fn rewrite(&self, doc: &ConfigDocument) -> Result<usize, crate::Error>;

    /// Current hosts file content
    async fn read_current_hosts(&self) -> Result<String, crate::Error>;

    /// Remove every managed section
    async fn clear_managed_sections(&self) -> Result<(), crate::Error>;
}
