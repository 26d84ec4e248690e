//! DingTalk request signing

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// URL-encoded signature for a DingTalk robot request
///
/// `base64(hmac_sha256(secret, "{timestamp}\n{secret}"))`, percent-encoded.
pub fn dingtalk_signature(timestamp_ms: i64, secret: &str) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        // HMAC accepts keys of any length
        return String::new();
    };
    mac.update(format!("{}\n{}", timestamp_ms, secret).as_bytes());
    let digest = mac.finalize().into_bytes();
    urlencoding::encode(&STANDARD.encode(digest)).into_owned()
}
