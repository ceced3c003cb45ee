//! URL normalization and domain classification helpers.

use std::net::IpAddr;
use url::Url;

/// Query parameters that never change page content.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
    "ref",
];

/// Second-level labels under which registrations happen one level deeper
/// (`example.co.uk`, `example.com.au`).
const SECOND_LEVEL_SUFFIXES: &[&str] = &[
    "ac", "co", "com", "edu", "gov", "ltd", "net", "nhs", "org", "plc", "sch",
];

/// Lower-cased host without a leading `www.`.
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Registrable domain of a host, e.g. `news.bbc.co.uk` -> `bbc.co.uk`.
///
/// IP literals and single-label hosts are their own registered domain.
pub fn registered_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.parse::<IpAddr>().is_ok() || host.starts_with('[') {
        return host.to_string();
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host.to_string();
    }

    let n = labels.len();
    let keep = if labels[n - 1].len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&labels[n - 2]) {
        3
    } else {
        2
    };
    labels[n - keep..].join(".")
}

/// Registered domain of a URL's host.
pub fn registered_domain_of(url: &Url) -> Option<String> {
    url.host_str().map(registered_domain)
}

/// True when `host` is a proper subdomain of `domain` (not `domain` itself,
/// and not its `www.` alias).
pub fn is_strict_subdomain(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    host != domain && host.ends_with(&format!(".{domain}"))
}

/// True when `host` is `domain` or any of its subdomains.
pub fn within_domain(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Canonical form used for per-pass visited sets.
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();

    normalized.set_fragment(None);

    if let Some(host) = normalized.host_str().map(|h| h.to_ascii_lowercase())
        && let Some(stripped) = host.strip_prefix("www.")
        && let Err(e) = normalized.set_host(Some(stripped))
    {
        tracing::warn!("Failed to strip www. from {}: {}", host, e);
    }

    // Remove trailing slash from non-root paths
    let path = normalized.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        normalized.set_path(&path[..path.len() - 1]);
    }

    // Filter out tracking parameters and sort remaining ones
    if let Some(query) = normalized.query().map(str::to_string) {
        let mut params: Vec<&str> = query
            .split('&')
            .filter(|p| !p.is_empty())
            .filter(|p| {
                let key = p.split('=').next().unwrap_or("").to_ascii_lowercase();
                !TRACKING_PARAMS.contains(&key.as_str())
            })
            .collect();

        if params.is_empty() {
            normalized.set_query(None);
        } else {
            params.sort_unstable();
            normalized.set_query(Some(&params.join("&")));
        }
    }

    normalized.to_string()
}

/// `scheme://host[:port]/` of a URL, used as the root of a discovered subdomain.
pub fn origin_root(url: &Url) -> Option<Url> {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root.host_str()?;
    Some(root)
}
