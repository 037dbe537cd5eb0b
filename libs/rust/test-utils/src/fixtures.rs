//! Test fixtures with sample data.
//!
//! Signed access tokens relative to the current clock, store seeding and a
//! tracing subscriber that writes through the test harness.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use oidc_client::{ACCESS_TOKEN_KEY, KeyValueStore, REFRESH_TOKEN_KEY};
use serde_json::json;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Secret the fixtures sign with. The client never checks it.
pub const SIGNING_SECRET: &[u8] = b"test-signing-secret";

/// Sample refresh token.
pub const SAMPLE_REFRESH_TOKEN: &str = "rt-sample-0001";

/// Sign an HS256 token carrying `exp` (seconds since the epoch).
#[must_use]
pub fn sign_token(exp: f64) -> String {
    sign_claims(&json!({ "exp": exp, "sub": "user-123" }))
}

/// Sign an HS256 token carrying arbitrary claims.
#[must_use]
#[allow(clippy::missing_panics_doc, clippy::expect_used)]
pub fn sign_claims(claims: &serde_json::Value) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(SIGNING_SECRET),
    )
    .expect("HS256 signing of JSON claims cannot fail")
}

/// Token expiring `secs` seconds from now (negative for the past).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn token_expiring_in(secs: i64) -> String {
    sign_token((Utc::now().timestamp() + secs) as f64)
}

/// Unsigned (`alg: none`) token expiring `secs` seconds from now.
#[must_use]
pub fn unsigned_token_expiring_in(secs: i64) -> String {
    let header = json!({ "alg": "none", "typ": "JWT" });
    let claims = json!({ "exp": Utc::now().timestamp() + secs, "sub": "user-123" });
    format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// Token comfortably beyond the default expiry margin.
#[must_use]
pub fn valid_token() -> String {
    token_expiring_in(3600)
}

/// Token inside the default expiry margin.
#[must_use]
pub fn expiring_token() -> String {
    token_expiring_in(5)
}

/// Token that expired a minute ago.
#[must_use]
pub fn expired_token() -> String {
    token_expiring_in(-60)
}

/// Write the given tokens into the session and persistent stores.
#[allow(clippy::missing_panics_doc, clippy::expect_used)]
pub async fn seed_tokens(
    session: &dyn KeyValueStore,
    persistent: &dyn KeyValueStore,
    access: Option<&str>,
    refresh: Option<&str>,
) {
    if let Some(access) = access {
        session
            .set(ACCESS_TOKEN_KEY, access)
            .await
            .expect("seed access token");
    }
    if let Some(refresh) = refresh {
        persistent
            .set(REFRESH_TOKEN_KEY, refresh)
            .await
            .expect("seed refresh token");
    }
}

static TRACING: Once = Once::new();

/// Install a tracing subscriber for tests, once per process.
///
/// Output goes through the test writer, so it only shows for failing tests.
/// Filtered by `RUST_LOG`, defaulting to `oidc_client=debug`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("oidc_client=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
