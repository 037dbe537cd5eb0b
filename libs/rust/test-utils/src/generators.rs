//! Shared proptest generators.

use proptest::prelude::*;

/// Base URLs, with and without a trailing slash.
pub fn base_url_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{3,12}", prop::bool::ANY).prop_map(|(host, slash)| {
        let url = format!("https://{host}.example.com");
        if slash { format!("{url}/") } else { url }
    })
}

/// Refresh paths, with and without a leading slash.
pub fn refresh_path_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{1,10}(/[a-z]{1,10}){0,2}", prop::bool::ANY)
        .prop_map(|(path, slash)| if slash { format!("/{path}") } else { path })
}

/// Opaque refresh tokens.
pub fn refresh_token_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{8,64}"
}

/// Clock instants in milliseconds since the epoch (2001 to 2286).
pub fn now_millis_strategy() -> impl Strategy<Value = i64> {
    1_000_000_000_000_i64..10_000_000_000_000_i64
}

/// Expiry offsets in seconds around a 10 second margin.
pub fn exp_offset_strategy() -> impl Strategy<Value = i64> {
    -120_i64..120_i64
}
