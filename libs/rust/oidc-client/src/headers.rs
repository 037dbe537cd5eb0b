//! Header maps and refresh endpoint URL joining.

use std::collections::BTreeMap;

/// Header name to value mapping.
pub type Headers = BTreeMap<String, String>;

/// `Authorization` request header.
pub const AUTHORIZATION: &str = "Authorization";

/// Request header carrying the refresh token.
pub const REFRESH_TOKEN_HEADER: &str = "Refresh-Token";

/// Response header (and body field) carrying a new access token.
pub const TOKEN_RESPONSE_HEADER: &str = "token";

/// Response header (and body field) carrying a new refresh token.
pub const REFRESH_TOKEN_RESPONSE_HEADER: &str = "refreshToken";

/// Headers sent when the caller configures none.
#[must_use]
pub fn default_headers() -> Headers {
    Headers::from([
        (
            "Content-Type".to_string(),
            "application/json; charset=UTF-8".to_string(),
        ),
        (
            "Accept".to_string(),
            "application/json, text/javascript, */*; q=0.01".to_string(),
        ),
    ])
}

/// Copy of `headers` carrying `Authorization: Bearer <token>`.
#[must_use]
pub fn with_bearer(headers: &Headers, token: &str) -> Headers {
    let mut out = headers.clone();
    out.insert(AUTHORIZATION.to_string(), format!("Bearer {token}"));
    out
}

/// Case-insensitive header lookup.
#[must_use]
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Strip exactly one leading `/` from a refresh path.
#[must_use]
pub fn normalize_refresh_path(path: &str) -> String {
    path.strip_prefix('/').unwrap_or(path).to_string()
}

/// Join the base URL and refresh path with exactly one `/` between them.
///
/// This is plain concatenation: no segments are resolved or dropped.
#[must_use]
pub fn refresh_url(base_url: &str, refresh_path: &str) -> String {
    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    let path = refresh_path.strip_prefix('/').unwrap_or(refresh_path);
    format!("{base}/{path}")
}
