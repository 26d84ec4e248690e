//! Configuration store implementations
//!
//! - [`FileConfigStore`]: JSON file with atomic replace and `.backup` copy
//! - [`MemoryConfigStore`]: In-memory, for tests and embedding

pub mod file;
pub mod memory;

pub use file::FileConfigStore;
pub use memory::MemoryConfigStore;
