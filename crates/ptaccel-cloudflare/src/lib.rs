// # Cloudflare Collaborators
//
// Cloudflare-specific implementations of two core collaborator traits.
//
// ## Contents
//
// - [`CloudflareDetector`]: `CloudflareClassifier` that resolves a host and
//   matches its addresses against the published Cloudflare ranges, falling
//   back to an HTTPS request checking `cf-ray` / `server: cloudflare` headers.
//   Results are cached for an hour.
// - [`ScriptSpeedTester`]: `SpeedTester` that runs the CloudflareSpeedTest
//   helper script and extracts the selected IP from its output.
//
// ## Whitelist
//
// The whitelist is not consulted here. `CloudflareReconciler` checks it
// before asking the classifier.

mod detector;
mod ranges;

pub use detector::{CloudflareDetector, headers_indicate_cloudflare};
pub use ranges::is_cloudflare_ip;
pub use speed_test::{DEFAULT_SCRIPT_PATH, ScriptSpeedTester, parse_best_ip};
