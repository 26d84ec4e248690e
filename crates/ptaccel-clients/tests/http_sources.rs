//! Contract Test: Download Client Sources
//!
//! Constraints verified:
//! - qBittorrent logs in before listing and reports distinct http(s) hosts
//! - A rejected login is an error, not an empty list
//! - Transmission completes the session-id handshake transparently
//!
//! If this test fails, imports silently find no trackers.

use ptaccel_clients::{QbittorrentSource, TransmissionSource};
use ptaccel_core::config::TorrentClientConfig;
use ptaccel_core::traits::TrackerSource;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn descriptor(server: &MockServer, kind: &str) -> TorrentClientConfig {
    let addr = server.address();
    serde_json::from_value(json!({
        "id": "c1",
        "type": kind,
        "host": addr.ip().to_string(),
        "port": addr.port(),
        "username": "admin",
        "password": "adminadmin",
    }))
    .unwrap()
}

#[tokio::test]
async fn qbittorrent_lists_announce_hosts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/auth/login"))
        .and(body_string_contains("username=admin"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "SID=abc123; path=/")
                .set_body_string("Ok."),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/torrents/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "hash": "aaa", "name": "one" },
            { "hash": "bbb", "name": "two" },
            { "name": "no hash" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/torrents/trackers"))
        .and(query_param("hash", "aaa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "url": "** [DHT] **" },
            { "url": "https://tracker.example.org/announce.php?passkey=1" },
            { "url": "udp://open.example.com:6969" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/torrents/trackers"))
        .and(query_param("hash", "bbb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "url": "https://tracker.example.org/announce.php?passkey=2" },
            { "url": "http://pt.example.net:2710/announce" }
        ])))
        .mount(&server)
        .await;

    let source = QbittorrentSource::new(&descriptor(&server, "qbittorrent")).unwrap();
    let hosts = source.list_tracker_domains().await.unwrap();

    assert_eq!(hosts, vec!["pt.example.net:2710", "tracker.example.org"]);
}

#[tokio::test]
async fn qbittorrent_rejected_login_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Fails."))
        .mount(&server)
        .await;

    let source = QbittorrentSource::new(&descriptor(&server, "qbittorrent")).unwrap();
    let err = source.list_tracker_domains().await.unwrap_err();
    assert!(err.to_string().contains("Login rejected"));
}

#[tokio::test]
async fn transmission_retries_with_session_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/transmission/rpc"))
        .and(header("X-Transmission-Session-Id", "sess-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "success",
            "arguments": { "torrents": [
                { "id": 1, "trackers": [ { "announce": "https://tracker.example.org/a" } ] },
                { "id": 2, "trackers": [
                    { "announce": "https://tracker.example.org/b" },
                    { "announce": "wss://tracker.example.com" }
                ] }
            ] }
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/transmission/rpc"))
        .respond_with(ResponseTemplate::new(409).insert_header("X-Transmission-Session-Id", "sess-1"))
        .expect(1)
        .mount(&server)
        .await;

    let source = TransmissionSource::new(&descriptor(&server, "transmission")).unwrap();
    let hosts = source.list_tracker_domains().await.unwrap();

    assert_eq!(hosts, vec!["tracker.example.org"]);
}

#[tokio::test]
async fn transmission_rpc_failure_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/transmission/rpc"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let source = TransmissionSource::new(&descriptor(&server, "transmission")).unwrap();
    let err = source.list_tracker_domains().await.unwrap_err();
    assert!(err.to_string().contains("Authentication failed"));
}
