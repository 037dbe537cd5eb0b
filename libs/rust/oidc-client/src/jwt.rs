//! Access token decoding and expiry evaluation.
//!
//! The client never verifies signatures: it only needs the `exp` claim to
//! decide whether to refresh, and the server remains the authority on
//! whether a token is genuine. The header is not read at all, so tokens
//! with any `alg`, including `none`, decode the same way.

use crate::error::{TokenError, TokenResult};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use std::time::Duration;

/// Claims the manager reads from an access token.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AccessClaims {
    /// Expiry in seconds since the epoch; may be fractional
    #[serde(default)]
    pub exp: Option<f64>,
    /// Subject, used only for log context
    #[serde(default)]
    pub sub: Option<String>,
}

/// Decodes a compact token into its claims.
pub trait TokenDecoder: Send + Sync {
    /// Decode `token`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Decode`](crate::TokenError::Decode) for malformed tokens.
    fn decode(&self, token: &str) -> TokenResult<AccessClaims>;
}

/// Decoder that reads JWT claims from the payload segment without looking
/// at the header or the signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnverifiedJwtDecoder;

impl UnverifiedJwtDecoder {
    /// Create a decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenDecoder for UnverifiedJwtDecoder {
    fn decode(&self, token: &str) -> TokenResult<AccessClaims> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) if !payload.is_empty() => payload,
            _ => return Err(TokenError::Decode("Invalid token format".to_string())),
        };

        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Decode(e.to_string()))
    }
}

/// Whether a token expiring at `exp_secs` is still usable at `now_millis`
/// with at least `margin` left.
#[must_use]
pub fn is_fresh(exp_secs: f64, now_millis: i64, margin: Duration) -> bool {
    #[allow(clippy::cast_precision_loss)]
    let threshold = (now_millis as f64 + margin.as_millis() as f64) / 1000.0;
    exp_secs >= threshold
}
