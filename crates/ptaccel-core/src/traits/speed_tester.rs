// # Speed Tester Trait
//
// Selects the fastest reachable CDN edge IP.
//
// ## Implementations
//
// - Script-driven CloudflareSpeedTest: `ptaccel-cloudflare` crate

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for edge IP selection
#[async_trait]
pub trait SpeedTester: Send + Sync {
    /// Run a full selection and return the best IP
    ///
    /// This may take minutes. It is only called from inside a heavy task.
    async fn select_best_ip(&self) -> Result<IpAddr, crate::Error>;

    /// The most recently selected IP, if any, without running a selection
    fn best_known_ip(&self) -> Option<IpAddr>;
}
