// # Hosts File Writer
//
// `HostsWriter` implementation that owns one marked block of the system
// hosts file and never touches anything outside it.
//
// ## Layout
//
// ```text
// <operator content, preserved>
//
// # == PT-Accelerator START ==
// # ===== PT站点加速开始 ===== #
// 104.16.91.215	tracker.example.org
// # ===== PT站点加速结束 (1 条记录) ===== #
// # ===== MergedHosts开始 ===== #
// 140.82.112.3	github.com
// # ===== MergedHosts结束 (1 条记录) ===== #
// # == PT-Accelerator END ==
// ```
//
// Empty sections are omitted; the outer markers are always written.
//
// ## Sources
//
// Enabled hosts sources are downloaded in document order. A domain keeps the
// address from the first source listing it. Domains of configured trackers,
// enabled or not, are never taken from a source. A source that cannot be
// downloaded falls back to its last cached copy, if a cache directory is set.

mod render;
mod sources;
mod writer;

pub use render::{
    END_MARKER, START_MARKER, is_blacklisted, parse_hosts_text, render_block, strip_managed_blocks,
};
pub use sources::SourceFetcher;
pub use writer::{HostsFileWriter, default_hosts_path};
