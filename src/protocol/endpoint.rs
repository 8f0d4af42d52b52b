//! Endpoint URL construction.
//!
//! | Function | Produces |
//! |----------|----------|
//! | [`resolve_url`] | Absolute hub URL, relative paths joined to a base |
//! | [`negotiate_url`] | `{url}/negotiate` with exactly one separating slash |
//! | [`connect_url`] | `{url}?id={connectionId}` (or `&id=`) |
//! | [`to_socket_scheme`] | `http(s)` rewritten to `ws(s)` |
//! | [`with_access_token`] | `access_token={encoded}` appended |
//!
//! Query parameters are appended verbatim after any existing query,
//! joined with `&`.

// ============================================================================
// Imports
// ============================================================================

use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

// ============================================================================
// Functions
// ============================================================================

/// Parses `url`, joining it onto `base` if it is relative.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if `url` is relative and no base is
/// given, or if it cannot be parsed.
pub fn resolve_url(url: &str, base: Option<&Url>) -> Result<Url> {
    match Url::parse(url) {
        Ok(parsed) => Ok(parsed),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = base.ok_or_else(|| Error::invalid_url(url, "relative URL without a base URL"))?;
            base.join(url).map_err(|e| Error::invalid_url(url, e.to_string()))
        }
        Err(e) => Err(Error::invalid_url(url, e.to_string())),
    }
}

/// Appends one path segment, inserting a `/` only if needed.
#[must_use]
pub fn append_path(url: &Url, segment: &str) -> Url {
    let mut result = url.clone();
    let mut path = result.path().to_string();
    if !path.ends_with('/') {
        path.push('/');
    }
    path.push_str(segment);
    result.set_path(&path);
    result
}

/// Appends a raw `key=value` query fragment.
#[must_use]
pub fn append_query(url: &Url, fragment: &str) -> Url {
    if fragment.is_empty() {
        return url.clone();
    }

    let mut result = url.clone();
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{fragment}"),
        _ => fragment.to_string(),
    };
    result.set_query(Some(&query));
    result
}

/// Handshake URL for `url`.
#[inline]
#[must_use]
pub fn negotiate_url(url: &Url) -> Url {
    append_path(url, "negotiate")
}

/// Transport URL carrying the negotiated connection id.
///
/// # Errors
///
/// Returns [`Error::Config`] if `connection_id` is blank.
pub fn connect_url(url: &Url, connection_id: &str) -> Result<Url> {
    let id = ConnectionId::new(connection_id)?;
    Ok(append_query(url, &format!("id={}", urlencoding::encode(id.as_str()))))
}

/// Rewrites `http`/`https` to `ws`/`wss`; other schemes are kept.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if the scheme cannot be changed.
pub fn to_socket_scheme(url: &Url) -> Result<Url> {
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return Ok(url.clone()),
    };

    let mut result = url.clone();
    result
        .set_scheme(scheme)
        .map_err(|()| Error::invalid_url(url.as_str(), "cannot switch to a socket scheme"))?;
    Ok(result)
}

/// Appends `access_token` when a token is present.
#[must_use]
pub fn with_access_token(url: &Url, token: Option<&str>) -> Url {
    match token {
        Some(token) if !token.is_empty() => {
            append_query(url, &format!("access_token={}", urlencoding::encode(token)))
        }
        _ => url.clone(),
    }
}

// ============================================================================
// Tests
// ============================================================================
