//! Address and identifier utilities.

/// Canonical length at which a member identifier counts as full
/// (a UUID with hyphens stripped).
pub const FULL_ID_CANONICAL_LEN: usize = 32;

/// Extracts the bare host from a transport address.
///
/// Handles scheme prefixes (`ssl:10.0.0.1:6643`), bracketed IPv6
/// (`tcp:[fd00::1]:6643`) and plain `host:port` or `host` forms.
#[must_use]
pub fn bare_host(addr: &str) -> String {
    let addr = addr.trim();

    let rest = match addr.split_once(':') {
        Some((scheme, rest))
            if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphabetic()) =>
        {
            rest
        }
        _ => addr,
    };

    if let Some(inner) = rest.strip_prefix('[') {
        if let Some((host, _)) = inner.split_once(']') {
            return host.to_string();
        }
    }

    match rest.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty()
                && !host.contains(':')
                && !port.is_empty()
                && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            host.to_string()
        }
        _ => rest.to_string(),
    }
}

/// Canonical form of a member identifier: lowercase, hyphens removed.
#[must_use]
pub fn canonical_id(id: &str) -> String {
    id.chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Whether an identifier already looks like a full member id.
#[must_use]
pub fn is_full_id(id: &str) -> bool {
    canonical_id(id).len() >= FULL_ID_CANONICAL_LEN
}
