//! Token manager.
//!
//! [`TokenManager`] hands out request headers carrying a valid access token.
//! When the stored access token is missing or about to expire it refreshes it
//! against the configured endpoint, making sure that concurrent callers share
//! a single refresh call. When a refresh fails the session is torn down: both
//! tokens are removed and [`SessionEvent::LoggedOut`] is broadcast.

use crate::config::{ClientConfig, Coordination};
use crate::error::{TokenError, TokenResult};
use crate::headers::{Headers, normalize_refresh_path, refresh_url, with_bearer};
use crate::jwt::{AccessClaims, TokenDecoder, UnverifiedJwtDecoder, is_fresh};
use crate::notify::{BroadcastNotifier, SessionEvent, SessionNotifier};
use crate::refresh::{
    Flight, RefreshCoordinator, RefreshedTokens, build_refresh_headers, parse_refresh_response,
};
use crate::storage::{
    ACCESS_TOKEN_KEY, KeyValueStore, MemoryStore, REFRESH_TOKEN_KEY, read_non_empty,
};
use crate::transport::{HttpConfig, HttpTransport, ReqwestTransport};
use parking_lot::RwLock;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

struct Inner {
    config: RwLock<ClientConfig>,
    session: Arc<dyn KeyValueStore>,
    persistent: Option<Arc<dyn KeyValueStore>>,
    transport: Arc<dyn HttpTransport>,
    decoder: Arc<dyn TokenDecoder>,
    notifier: Arc<dyn SessionNotifier>,
    /// Set when the manager built its own notifier.
    events: Option<BroadcastNotifier>,
    coordinator: Arc<RefreshCoordinator>,
}

/// Access/refresh token manager.
///
/// Cloning is cheap and every clone shares the same stores and the same
/// refresh coordination.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("config", &*self.inner.config.read())
            .field("persistent_store", &self.inner.persistent.is_some())
            .field("refresh_locked", &self.is_refresh_locked())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a manager with default capabilities and `config`.
    ///
    /// Without a persistent store the manager is a pass-through; use
    /// [`TokenManager::builder`] to inject one.
    ///
    /// # Errors
    ///
    /// Returns an error if the default HTTP transport cannot be built.
    pub fn new(config: ClientConfig) -> TokenResult<Self> {
        Self::builder().config(config).build()
    }

    /// Create a manager configured from the environment.
    ///
    /// See [`ClientConfig::from_env`] for the variables read.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] for malformed variables, or an error if
    /// the default HTTP transport cannot be built.
    pub fn from_env() -> TokenResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Start building a manager.
    #[must_use]
    pub fn builder() -> TokenManagerBuilder {
        TokenManagerBuilder::new()
    }

    /// Subscribe to session events.
    ///
    /// Returns `None` when a notifier was injected through
    /// [`TokenManagerBuilder::notifier`]; events then go to that notifier.
    #[must_use]
    pub fn subscribe(&self) -> Option<broadcast::Receiver<SessionEvent>> {
        self.inner.events.as_ref().map(BroadcastNotifier::subscribe)
    }

    /// Set the refresh endpoint base URL.
    pub fn set_base_url(&self, url: impl Into<String>) {
        self.inner.config.write().base_url = Some(url.into());
    }

    /// Refresh endpoint base URL, if configured.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.inner.config.read().base_url.clone()
    }

    /// Set the refresh path. One leading `/` is stripped.
    pub fn set_refresh_path(&self, path: &str) {
        self.inner.config.write().refresh_path = normalize_refresh_path(path);
    }

    /// Refresh path, without a leading `/`.
    #[must_use]
    pub fn refresh_path(&self) -> String {
        self.inner.config.read().refresh_path.clone()
    }

    /// Default request headers.
    #[must_use]
    pub fn base_headers(&self) -> Headers {
        self.inner.config.read().headers.clone()
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> ClientConfig {
        self.inner.config.read().clone()
    }

    /// Whether a refresh is running.
    #[must_use]
    pub fn is_refresh_locked(&self) -> bool {
        self.inner.coordinator.is_locked()
    }

    /// Headers for an authorized request.
    ///
    /// Returns a copy of `headers` (or of the default headers) with
    /// `Authorization: Bearer <token>` added when a valid access token could
    /// be obtained, and the unchanged copy otherwise.
    pub async fn prepare_headers(&self, headers: Option<&Headers>) -> Headers {
        let headers = headers.cloned().unwrap_or_else(|| self.base_headers());

        match self.get_access_token().await {
            Some(token) => with_bearer(&headers, &token),
            None => headers,
        }
    }

    /// Current access token, refreshed first if it is missing or stale.
    ///
    /// Returns `None` straight away when no refresh token is stored: the
    /// session is then managed elsewhere (or does not exist yet). Refresh
    /// failures never surface here; they clear both tokens, broadcast
    /// [`SessionEvent::LoggedOut`] and yield `None`.
    #[instrument(skip(self))]
    pub async fn get_access_token(&self) -> Option<String> {
        match self.stored_refresh_token().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("No refresh token stored, passing through");
                return None;
            }
            Err(err) => {
                warn!(error.code = err.code(), error = %err, "Could not read refresh token");
                return None;
            }
        }

        match self.coordination() {
            Coordination::SharedFlight => self.sync_shared().await,
            Coordination::LockPolling => self.sync_polling().await,
        }

        match read_non_empty(self.inner.session.as_ref(), ACCESS_TOKEN_KEY).await {
            Ok(token) => token,
            Err(err) => {
                warn!(error.code = err.code(), error = %err, "Could not read access token");
                None
            }
        }
    }

    /// Whether the stored access token has at least the configured expiry
    /// margin left. Missing or undecodable tokens are invalid.
    pub async fn verify_token_validity(&self) -> bool {
        let token = match read_non_empty(self.inner.session.as_ref(), ACCESS_TOKEN_KEY).await {
            Ok(Some(token)) => token,
            Ok(None) => return false,
            Err(err) => {
                debug!(error = %err, "Could not read access token");
                return false;
            }
        };

        match self.inner.decoder.decode(&token) {
            Ok(AccessClaims { exp: Some(exp), .. }) => {
                let margin = self.inner.config.read().expiry_margin;
                is_fresh(exp, chrono::Utc::now().timestamp_millis(), margin)
            }
            Ok(_) => false,
            Err(err) => {
                debug!(error = %err, "Stored access token could not be decoded");
                false
            }
        }
    }

    /// Exchange the stored refresh token for new tokens.
    ///
    /// In shared-flight mode a call made while a refresh is running joins
    /// it instead of issuing a second request. Unlike
    /// [`get_access_token`](Self::get_access_token), failures are returned
    /// to the caller and the stored tokens are left alone, unless a
    /// `get_access_token` caller joined the same refresh.
    ///
    /// # Errors
    ///
    /// - [`TokenError::MissingRefreshToken`] without a stored refresh token
    /// - [`TokenError::MissingBaseUrl`] without a configured base URL
    /// - [`TokenError::Forbidden`] when the endpoint answers 403
    /// - [`TokenError::ProtocolViolation`] when the response carries no token
    /// - transport, response and storage errors as they occur
    #[instrument(skip(self))]
    pub async fn refresh_token(&self) -> TokenResult<()> {
        match self.coordination() {
            Coordination::SharedFlight => {
                let flight = {
                    let mut slot = self.inner.coordinator.slot().await;
                    let running = slot.clone();
                    match running {
                        Some(flight) => flight,
                        None => {
                            let refresh_token = self
                                .stored_refresh_token()
                                .await?
                                .ok_or(TokenError::MissingRefreshToken)?;
                            self.start_flight(&mut slot, refresh_token)
                        }
                    }
                };
                flight.wait().await
            }
            Coordination::LockPolling => self.refresh_exclusive(false).await,
        }
    }

    fn coordination(&self) -> Coordination {
        self.inner.config.read().coordination
    }

    async fn stored_refresh_token(&self) -> TokenResult<Option<String>> {
        match &self.inner.persistent {
            Some(store) => read_non_empty(store.as_ref(), REFRESH_TOKEN_KEY).await,
            None => Ok(None),
        }
    }

    async fn sync_shared(&self) {
        let flight = match self.join_or_start().await {
            Ok(Some(flight)) => flight,
            Ok(None) => return,
            Err(err) => {
                warn!(error.code = err.code(), error = %err, "Could not start token refresh");
                return;
            }
        };

        if let Err(err) = flight.wait().await {
            debug!(error.code = err.code(), "Refresh failed, session ended");
        }
    }

    /// Join the running flight, or check the token and start one if it is
    /// stale. Both happen under the slot lock, so a caller that saw a stale
    /// token either joins the refresh or sees what the refresh left behind:
    /// a new token, or no refresh token at all after a failure.
    async fn join_or_start(&self) -> TokenResult<Option<Flight>> {
        let mut slot = self.inner.coordinator.slot().await;
        if let Some(flight) = slot.as_ref() {
            debug!("Joining in-flight refresh");
            flight.request_teardown();
            return Ok(Some(flight.clone()));
        }
        if self.verify_token_validity().await {
            return Ok(None);
        }
        let Some(refresh_token) = self.stored_refresh_token().await? else {
            debug!("Refresh token removed while waiting, passing through");
            return Ok(None);
        };

        let flight = self.start_flight(&mut slot, refresh_token);
        flight.request_teardown();
        Ok(Some(flight))
    }

    fn start_flight(&self, slot: &mut Option<Flight>, refresh_token: String) -> Flight {
        let inner = Arc::clone(&self.inner);
        let refresh = async move { inner.refresh(refresh_token).await };
        let inner = Arc::clone(&self.inner);
        let teardown = move |err: TokenError| async move { inner.end_session(&err).await };
        self.inner.coordinator.start(slot, refresh, teardown)
    }

    async fn sync_polling(&self) {
        let poll = self.inner.config.read().poll;
        if !self.inner.coordinator.wait_for_release(&poll).await {
            warn!(
                attempts = poll.max_attempts,
                "Refresh lock still held after polling, checking token anyway"
            );
        }

        if self.verify_token_validity().await {
            return;
        }
        match self.refresh_exclusive(true).await {
            Ok(()) => {}
            Err(TokenError::MissingRefreshToken) => {
                debug!("Refresh token removed while waiting, passing through");
            }
            Err(err) => debug!(error.code = err.code(), "Refresh failed"),
        }
    }

    /// Refresh while holding the lock flag. With `teardown`, a failed refresh
    /// ends the session before the flag is cleared.
    async fn refresh_exclusive(&self, teardown: bool) -> TokenResult<()> {
        let refresh_token = self
            .stored_refresh_token()
            .await?
            .ok_or(TokenError::MissingRefreshToken)?;

        let _lock = self.inner.coordinator.hold_lock();
        let result = self.inner.refresh(refresh_token).await;
        if let Err(err) = &result {
            if teardown {
                self.inner.end_session(err).await;
            }
        }
        result
    }
}

impl Inner {
    async fn end_session(&self, err: &TokenError) {
        warn!(error.code = err.code(), error = %err, "Token refresh failed, ending session");

        if let Err(e) = self.session.remove(ACCESS_TOKEN_KEY).await {
            warn!(error = %e, "Failed to remove access token");
        }
        if let Some(store) = &self.persistent {
            if let Err(e) = store.remove(REFRESH_TOKEN_KEY).await {
                warn!(error = %e, "Failed to remove refresh token");
            }
        }
        self.notifier.broadcast(SessionEvent::LoggedOut);
    }

    async fn refresh(&self, refresh_token: String) -> TokenResult<()> {
        let result = self.request_tokens(&refresh_token).await;
        if let Err(err) = &result {
            warn!(error.code = err.code(), error = %err, "Failed to refresh tokens");
        }
        result
    }

    async fn request_tokens(&self, refresh_token: &str) -> TokenResult<()> {
        let (defaults, base_url, refresh_path) = {
            let config = self.config.read();
            (
                config.headers.clone(),
                config.base_url.clone(),
                config.refresh_path.clone(),
            )
        };

        let access_token = read_non_empty(self.session.as_ref(), ACCESS_TOKEN_KEY).await?;
        let headers = build_refresh_headers(&defaults, access_token.as_deref(), refresh_token);

        let base_url = base_url.ok_or(TokenError::MissingBaseUrl)?;
        let url = refresh_url(&base_url, &refresh_path);

        debug!(url = %url, "Requesting token refresh");
        let response = self.transport.get(&url, &headers).await?;
        let tokens = parse_refresh_response(&response)?;
        self.store_tokens(&tokens).await?;

        info!(
            url = %url,
            status = response.status,
            access_rotated = tokens.access_token.is_some(),
            refresh_rotated = tokens.refresh_token.is_some(),
            "Tokens refreshed"
        );
        Ok(())
    }

    async fn store_tokens(&self, tokens: &RefreshedTokens) -> TokenResult<()> {
        if let Some(token) = &tokens.access_token {
            self.session
                .set(ACCESS_TOKEN_KEY, token.expose_secret())
                .await?;
        }
        if let Some(token) = &tokens.refresh_token {
            let store = self
                .persistent
                .as_ref()
                .ok_or(TokenError::MissingRefreshToken)?;
            store.set(REFRESH_TOKEN_KEY, token.expose_secret()).await?;
        }
        Ok(())
    }
}

/// Builder for [`TokenManager`].
#[derive(Default)]
pub struct TokenManagerBuilder {
    config: ClientConfig,
    session: Option<Arc<dyn KeyValueStore>>,
    persistent: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn HttpTransport>>,
    decoder: Option<Arc<dyn TokenDecoder>>,
    notifier: Option<Arc<dyn SessionNotifier>>,
}

impl TokenManagerBuilder {
    /// Create a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Store for the access token (default: [`MemoryStore`]).
    #[must_use]
    pub fn session_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.session = Some(store);
        self
    }

    /// Store for the refresh token. Without one the manager never refreshes.
    #[must_use]
    pub fn persistent_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.persistent = Some(store);
        self
    }

    /// Transport for the refresh call (default: [`ReqwestTransport`]).
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Access token decoder (default: [`UnverifiedJwtDecoder`]).
    #[must_use]
    pub fn decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Session event notifier (default: a [`BroadcastNotifier`] reachable
    /// through [`TokenManager::subscribe`]).
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn SessionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the manager.
    ///
    /// # Errors
    ///
    /// Returns an error if no transport was given and the default one
    /// cannot be built.
    pub fn build(self) -> TokenResult<TokenManager> {
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&HttpConfig::default())?),
        };
        let (notifier, events): (Arc<dyn SessionNotifier>, _) = match self.notifier {
            Some(notifier) => (notifier, None),
            None => {
                let events = BroadcastNotifier::default();
                (Arc::new(events.clone()), Some(events))
            }
        };

        Ok(TokenManager {
            inner: Arc::new(Inner {
                config: RwLock::new(self.config),
                session: self
                    .session
                    .unwrap_or_else(|| Arc::new(MemoryStore::new())),
                persistent: self.persistent,
                transport,
                decoder: self
                    .decoder
                    .unwrap_or_else(|| Arc::new(UnverifiedJwtDecoder::new())),
                notifier,
                events,
                coordinator: Arc::new(RefreshCoordinator::new()),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpResponse;
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticTransport(HttpResponse);

    #[async_trait]
    impl HttpTransport for StaticTransport {
        async fn get(&self, _url: &str, _headers: &Headers) -> TokenResult<HttpResponse> {
            Ok(self.0.clone())
        }
    }

    fn manager(persistent: Option<Arc<MemoryStore>>) -> TokenManager {
        let transport = StaticTransport(HttpResponse::json_body(200, &json!({"token": "x"})));
        let mut builder = TokenManager::builder()
            .config(ClientConfig::new("https://auth.example.com"))
            .transport(Arc::new(transport));
        if let Some(store) = persistent {
            builder = builder.persistent_store(store);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_config_accessors() {
        let manager = manager(None);
        assert_eq!(manager.base_url().as_deref(), Some("https://auth.example.com"));
        assert_eq!(manager.refresh_path(), "token/refresh");

        manager.set_base_url("https://other.example.com");
        manager.set_refresh_path("/refreshToken");

        assert_eq!(manager.base_url().as_deref(), Some("https://other.example.com"));
        assert_eq!(manager.refresh_path(), "refreshToken");
        assert_eq!(manager.base_headers(), crate::headers::default_headers());
    }

    #[tokio::test]
    async fn test_pass_through_without_persistent_store() {
        let manager = manager(None);
        assert_eq!(manager.get_access_token().await, None);
        assert_eq!(
            manager.prepare_headers(None).await,
            crate::headers::default_headers()
        );
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let manager = manager(Some(Arc::new(MemoryStore::new())));
        assert!(matches!(
            manager.refresh_token().await,
            Err(TokenError::MissingRefreshToken)
        ));
        assert!(!manager.is_refresh_locked());
    }

    #[tokio::test]
    async fn test_missing_base_url_releases_lock() {
        let persistent = Arc::new(MemoryStore::new());
        persistent.set(REFRESH_TOKEN_KEY, "rt").await.unwrap();

        let manager = TokenManager::builder()
            .persistent_store(persistent)
            .transport(Arc::new(StaticTransport(HttpResponse::default())))
            .build()
            .unwrap();

        assert!(matches!(
            manager.refresh_token().await,
            Err(TokenError::MissingBaseUrl)
        ));
        assert!(!manager.is_refresh_locked());
    }

    #[tokio::test]
    async fn test_undecodable_token_is_invalid() {
        let session = Arc::new(MemoryStore::new());
        session.set(ACCESS_TOKEN_KEY, "garbage").await.unwrap();

        let manager = TokenManager::builder()
            .session_store(session)
            .transport(Arc::new(StaticTransport(HttpResponse::default())))
            .build()
            .unwrap();
        assert!(!manager.verify_token_validity().await);
    }

    #[tokio::test]
    async fn test_default_notifier_is_observable() {
        let persistent = Arc::new(MemoryStore::new());
        persistent.set(REFRESH_TOKEN_KEY, "rt").await.unwrap();

        let manager = TokenManager::builder()
            .config(ClientConfig::new("https://auth.example.com"))
            .persistent_store(persistent.clone())
            .transport(Arc::new(StaticTransport(HttpResponse::json_body(403, &json!({})))))
            .build()
            .unwrap();
        let mut events = manager.subscribe().unwrap();

        assert_eq!(manager.get_access_token().await, None);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
        assert!(events.try_recv().is_err());
        assert_eq!(persistent.get(REFRESH_TOKEN_KEY).await.unwrap(), None);
    }

    #[test]
    fn test_injected_notifier_has_no_subscription() {
        let manager = TokenManager::builder()
            .notifier(Arc::new(BroadcastNotifier::default()))
            .transport(Arc::new(StaticTransport(HttpResponse::default())))
            .build()
            .unwrap();
        assert!(manager.subscribe().is_none());
    }

    fn manager_from(vars: &[(&str, &str)]) -> TokenResult<TokenManager> {
        let config = ClientConfig::from_lookup(|name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
        })?;
        TokenManager::builder()
            .config(config)
            .transport(Arc::new(StaticTransport(HttpResponse::default())))
            .build()
    }

    #[test]
    fn test_bad_configuration_is_a_config_error() {
        let err = manager_from(&[("OIDC_REFRESH_MODE", "sometimes")]).unwrap_err();
        assert!(matches!(
            err,
            TokenError::Config(crate::error::ConfigError::ParseError { .. })
        ));
        assert_eq!(err.code(), "CONFIG_ERROR");

        let err = manager_from(&[("OIDC_BASE_URL", "::")]).unwrap_err();
        assert!(matches!(
            err,
            TokenError::Config(crate::error::ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_manager_from_lookup() {
        let manager = manager_from(&[
            ("OIDC_BASE_URL", "https://auth.example.com"),
            ("OIDC_REFRESH_MODE", "polling"),
        ])
        .unwrap();
        assert_eq!(manager.base_url().as_deref(), Some("https://auth.example.com"));
        assert_eq!(manager.refresh_path(), "token/refresh");
    }
}
