//! Domain and URL normalization helpers
//!
//! Stored tracker domains keep their case and any port; classification and
//! whitelist lookups work on the lower-cased host without a port.

use url::Url;

use crate::error::{Error, Result};

fn strip_scheme(raw: &str) -> &str {
    for scheme in ["https://", "http://"] {
        if raw
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        {
            return &raw[scheme.len()..];
        }
    }
    raw
}

/// Normalize a user- or client-supplied tracker domain
///
/// Strips a leading `http://` or `https://` (any case) and everything from
/// the first `/`. Case and port are preserved.
///
/// ```
/// use ptaccel_core::domain::normalize_domain;
///
/// assert_eq!(normalize_domain(" HTTPS://Tracker.Example.org:8443/announce "), "Tracker.Example.org:8443");
/// ```
pub fn normalize_domain(raw: &str) -> String {
    let stripped = strip_scheme(raw.trim());
    stripped.split('/').next().unwrap_or_default().trim().to_string()
}

/// Host part of a normalized domain, without the port
///
/// Bracketed IPv6 literals lose their brackets; a bare IPv6 literal is
/// returned unchanged.
pub fn host_without_port(domain: &str) -> &str {
    if let Some(rest) = domain.strip_prefix('[') {
        return rest.split(']').next().unwrap_or_default();
    }
    match domain.split_once(':') {
        Some((host, port)) if !port.contains(':') => host,
        Some(_) => domain,
        None => domain,
    }
}

/// Lower-cased host used for classification and whitelist lookups
pub fn classification_host(domain: &str) -> String {
    host_without_port(&normalize_domain(domain)).to_ascii_lowercase()
}

/// Normalize a whitelist entry
pub fn normalize_whitelist_domain(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// The last two labels of a host, if it has more than two
pub fn registrable_parent(host: &str) -> Option<&str> {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return None;
    }
    let keep = labels[labels.len() - 2..].iter().map(|l| l.len()).sum::<usize>() + 1;
    Some(&host[host.len() - keep..])
}

/// Normalize a hosts-source URL
///
/// Adds `https://` when no http(s) scheme is present. The result must parse
/// as a URL with a non-empty host; it is returned as written otherwise.
pub fn normalize_source_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let candidate = if strip_scheme(trimmed).len() == trimmed.len() {
        format!("https://{}", trimmed)
    } else {
        trimmed.to_string()
    };

    // `https:///x` parses with host `x`; require the authority to be written out
    let authority_written = strip_scheme(&candidate)
        .split(['/', '?', '#'])
        .next()
        .is_some_and(|authority| !authority.is_empty());
    let parsed = Url::parse(&candidate).map_err(|_| Error::invalid_url(trimmed))?;
    if !authority_written || parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::invalid_url(trimmed));
    }
    Ok(candidate)
}

/// Extract `host[:port]` from an http(s) announce URL
///
/// The host comes back lower-cased, IPv6 literals stay bracketed and a
/// scheme-default port is omitted. Credentials are never included.
/// Returns `None` for other schemes (udp, wss, ...) and for URLs with no host.
pub fn announce_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str().filter(|h| !h.is_empty())?;
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
