// # Download Client Check
//
// Connects to a real qBittorrent or Transmission instance, lists the tracker
// hosts of its torrents and classifies each one the way `ptaccel import`
// would. Nothing is written.
//
// ## Usage
//
// ```bash
// PTACCEL_CLIENT_TYPE=qbittorrent \
// PTACCEL_CLIENT_HOST=192.168.1.10 \
// PTACCEL_CLIENT_PORT=8080 \
// PTACCEL_CLIENT_USERNAME=admin \
// PTACCEL_CLIENT_PASSWORD=secret \
// cargo run -p ptaccel-demos --bin client_check
// ```
//
// ## Environment Variables
//
// Required:
// - `PTACCEL_CLIENT_HOST`: Client hostname or IPv4 address
// - `PTACCEL_CLIENT_PORT`: Web UI / RPC port
//
// Optional:
// - `PTACCEL_CLIENT_TYPE`: "qbittorrent" or "transmission" (default: qbittorrent)
// - `PTACCEL_CLIENT_USERNAME` / `PTACCEL_CLIENT_PASSWORD`: Credentials
// - `PTACCEL_CLIENT_HTTPS`: "true" to use https

use ptaccel_cloudflare::CloudflareDetector;
use ptaccel_core::config::{ClientKind, TorrentClientConfig};
use ptaccel_core::domain::classification_host;
use ptaccel_core::traits::CloudflareClassifier;
use ptaccel_core::ClientRegistry;
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("=== Download Client Check ===");

    let kind = match env::var("PTACCEL_CLIENT_TYPE").as_deref() {
        Ok("transmission") => ClientKind::Transmission,
        Ok("qbittorrent") | Err(_) => ClientKind::Qbittorrent,
        Ok(other) => {
            tracing::error!("Unsupported PTACCEL_CLIENT_TYPE: {}", other);
            std::process::exit(1);
        }
    };
    let host = env::var("PTACCEL_CLIENT_HOST").unwrap_or_else(|_| {
        tracing::error!("PTACCEL_CLIENT_HOST environment variable is required");
        std::process::exit(1);
    });
    let port: u16 = env::var("PTACCEL_CLIENT_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or_else(|| {
            tracing::error!("PTACCEL_CLIENT_PORT must be a port number");
            std::process::exit(1);
        });

    let config = TorrentClientConfig {
        id: "check".to_string(),
        name: format!("{} check", kind),
        kind,
        host,
        port,
        username: env::var("PTACCEL_CLIENT_USERNAME").ok(),
        password: env::var("PTACCEL_CLIENT_PASSWORD").ok(),
        use_https: env::var("PTACCEL_CLIENT_HTTPS").is_ok_and(|v| v == "true"),
        path: None,
        enable: true,
    };
    tracing::info!("Client: {:?}", config);

    let registry = ClientRegistry::new();
    ptaccel_clients::register(&registry);
    let source = registry.create_source(&config)?;

    tracing::info!("Listing tracker hosts...");
    let domains = source.list_tracker_domains().await?;
    tracing::info!("{} tracker host(s) reported", domains.len());

    let detector = CloudflareDetector::new();
    let mut accelerated = 0;
    for domain in &domains {
        let host = classification_host(domain);
        let is_cf = detector.is_accelerated(&host).await;
        if is_cf {
            accelerated += 1;
        }
        println!("{}\t{}", if is_cf { "cloudflare" } else { "direct" }, domain);
    }

    tracing::info!(
        "=== Check complete: {} of {} tracker host(s) behind Cloudflare ===",
        accelerated,
        domains.len()
    );
    Ok(())
}
