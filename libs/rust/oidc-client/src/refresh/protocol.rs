//! Request and response contract of the refresh endpoint.
//!
//! Request: `GET <base>/<path>` with the default headers, an optional
//! `Authorization: Bearer <access token>` and `Refresh-Token: <refresh token>`.
//!
//! Response: any status but 403 is read as JSON; `token` and `refreshToken`
//! come from the body, falling back to response headers of the same names.
//! At least one of the two must be present.

use crate::error::{TokenError, TokenResult};
use crate::headers::{
    AUTHORIZATION, Headers, REFRESH_TOKEN_HEADER, REFRESH_TOKEN_RESPONSE_HEADER,
    TOKEN_RESPONSE_HEADER, header_value,
};
use crate::transport::HttpResponse;
use secrecy::SecretString;
use serde_json::Value;

/// Status returned when the refresh token itself is rejected.
pub const FORBIDDEN_STATUS: u16 = 403;

/// Tokens obtained from a refresh response. Either may be absent, never both.
#[derive(Debug)]
pub struct RefreshedTokens {
    /// New access token
    pub access_token: Option<SecretString>,
    /// New refresh token
    pub refresh_token: Option<SecretString>,
}

/// Headers of a refresh request.
#[must_use]
pub fn build_refresh_headers(
    defaults: &Headers,
    access_token: Option<&str>,
    refresh_token: &str,
) -> Headers {
    let mut headers = defaults.clone();
    if let Some(token) = access_token {
        headers.insert(AUTHORIZATION.to_string(), format!("Bearer {token}"));
    }
    headers.insert(REFRESH_TOKEN_HEADER.to_string(), refresh_token.to_string());
    headers
}

/// Extract the new tokens from a refresh response.
///
/// # Errors
///
/// - [`TokenError::Forbidden`] on status 403
/// - [`TokenError::MalformedResponse`] if the body is not JSON
/// - [`TokenError::ProtocolViolation`] if neither token is present
pub fn parse_refresh_response(response: &HttpResponse) -> TokenResult<RefreshedTokens> {
    if response.status == FORBIDDEN_STATUS {
        return Err(TokenError::Forbidden);
    }

    let body = response.json()?;
    let access_token = pick(&body, response, TOKEN_RESPONSE_HEADER);
    let refresh_token = pick(&body, response, REFRESH_TOKEN_RESPONSE_HEADER);

    if access_token.is_none() && refresh_token.is_none() {
        return Err(TokenError::protocol(
            "Couldn't obtain a new access token or refresh token",
        ));
    }

    Ok(RefreshedTokens {
        access_token: access_token.map(SecretString::from),
        refresh_token: refresh_token.map(SecretString::from),
    })
}

fn pick(body: &Value, response: &HttpResponse, field: &str) -> Option<String> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .or_else(|| header_value(&response.headers, field).filter(|value| !value.is_empty()))
        .map(str::to_string)
}
