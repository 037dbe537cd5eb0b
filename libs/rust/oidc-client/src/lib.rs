//! OIDC access/refresh token client.
//!
//! Keeps a short-lived access token usable for outgoing requests:
//! - **Manager**: [`TokenManager`] adds `Authorization: Bearer` headers and
//!   refreshes the access token before it expires
//! - **Refresh**: concurrent callers share one refresh call; a rejected
//!   refresh clears both tokens and broadcasts [`SessionEvent::LoggedOut`]
//! - **Capabilities**: storage, transport, token decoding and event
//!   notification are injected behind traits
//!
//! ```no_run
//! use oidc_client::{ClientConfig, MemoryStore, TokenManager};
//! use std::sync::Arc;
//!
//! # async fn run() -> oidc_client::TokenResult<()> {
//! let manager = TokenManager::builder()
//!     .config(ClientConfig::new("https://auth.example.com"))
//!     .persistent_store(Arc::new(MemoryStore::new()))
//!     .build()?;
//!
//! let headers = manager.prepare_headers(None).await;
//! # let _ = headers;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod headers;
pub mod jwt;
pub mod manager;
pub mod notify;
pub mod refresh;
pub mod storage;
pub mod transport;

pub use config::{ClientConfig, Coordination, DEFAULT_REFRESH_PATH, PollConfig};
pub use error::{ConfigError, TokenError, TokenResult};
pub use headers::{Headers, default_headers};
pub use jwt::{AccessClaims, TokenDecoder, UnverifiedJwtDecoder};
pub use manager::{TokenManager, TokenManagerBuilder};
pub use notify::{BroadcastNotifier, SessionEvent, SessionNotifier};
pub use storage::{ACCESS_TOKEN_KEY, JsonFileStore, KeyValueStore, MemoryStore, REFRESH_TOKEN_KEY};
pub use transport::{HttpConfig, HttpResponse, HttpTransport, ReqwestTransport};
