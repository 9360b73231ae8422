//! Domain normalization for site lookup and dedup.
//!
//! Two urls name the same site when their hosts match ignoring scheme, case,
//! a leading `www.` and anything after the host.

use url::Url;

fn parse_lenient(input: &str) -> Option<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains("://") {
        Url::parse(trimmed).ok()
    } else {
        Url::parse(&format!("https://{}", trimmed)).ok()
    }
}

/// Normalized lookup key for a site url, e.g. `kp.m-team.cc`.
///
/// Non-default ports are kept so `host:8443` and `host` stay distinct.
pub fn normalize_domain(input: &str) -> Option<String> {
    let url = parse_lenient(input)?;
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        return None;
    }
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Scheme- and case-insensitive site equality.
pub fn url_equal(a: &str, b: &str) -> bool {
    match (normalize_domain(a), normalize_domain(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// `scheme://host[:port]/` for any url on a site. Defaults the scheme to https.
pub fn base_url(input: &str) -> Option<String> {
    let url = parse_lenient(input)?;
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}://{}:{}/", url.scheme(), host, port)),
        None => Some(format!("{}://{}/", url.scheme(), host)),
    }
}

/// Resolve a possibly relative link against the site's base url.
pub fn join_url(base: &str, link: &str) -> String {
    let link = link.trim();
    if link.is_empty() {
        return String::new();
    }
    match parse_lenient(base).and_then(|b| b.join(link).ok()) {
        Some(joined) => joined.to_string(),
        None => link.to_string(),
    }
}
