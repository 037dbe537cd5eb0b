//! Client configuration.

use crate::error::ConfigError;
use crate::headers::{Headers, default_headers, normalize_refresh_path};
use std::env;
use std::time::Duration;
use url::Url;

/// Refresh path used when none is configured.
pub const DEFAULT_REFRESH_PATH: &str = "token/refresh";

/// How concurrent callers coordinate around a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coordination {
    /// Joiners await the one in-flight refresh and share its outcome.
    #[default]
    SharedFlight,
    /// Joiners poll the lock flag with a bounded backoff, then check the
    /// token themselves. Only sound on a single cooperative thread.
    LockPolling,
}

/// Bounded poll loop used by [`Coordination::LockPolling`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum number of polls of the lock flag
    pub max_attempts: u32,
    /// Delay increment per attempt
    pub step: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            step: Duration::from_millis(200),
        }
    }
}

impl PollConfig {
    /// Delay before poll number `attempt` (0 first, then `step * attempt`).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.step * attempt
    }

    /// Total time spent polling before giving up.
    #[must_use]
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_attempts).map(|n| self.delay_for_attempt(n)).sum()
    }
}

/// Token manager configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the refresh endpoint; required only once a refresh runs
    pub base_url: Option<String>,
    /// Refresh path, stored without a leading `/`
    pub refresh_path: String,
    /// Default request headers
    pub headers: Headers,
    /// Minimum remaining lifetime for an access token to count as valid
    pub expiry_margin: Duration,
    /// Refresh coordination mode
    pub coordination: Coordination,
    /// Poll loop settings for [`Coordination::LockPolling`]
    pub poll: PollConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            headers: default_headers(),
            expiry_margin: Duration::from_secs(10),
            coordination: Coordination::default(),
            poll: PollConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration pointing at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Reads `OIDC_BASE_URL`, `OIDC_REFRESH_PATH`, `OIDC_EXPIRY_MARGIN_SECS`
    /// and `OIDC_REFRESH_MODE` (`shared` or `polling`), after loading a `.env`
    /// file if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from the variables `lookup` resolves, with the
    /// same names and rules as [`ClientConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is present but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(base) = lookup("OIDC_BASE_URL") {
            Url::parse(&base).map_err(|e| ConfigError::InvalidUrl {
                field: "OIDC_BASE_URL".to_string(),
                reason: e.to_string(),
            })?;
            config.base_url = Some(base);
        }
        if let Some(path) = lookup("OIDC_REFRESH_PATH") {
            config.refresh_path = normalize_refresh_path(&path);
        }
        let margin = parse_var(
            &lookup,
            "OIDC_EXPIRY_MARGIN_SECS",
            config.expiry_margin.as_secs(),
        )?;
        config.expiry_margin = Duration::from_secs(margin);
        config.coordination = parse_coordination(lookup("OIDC_REFRESH_MODE").as_deref())?;

        Ok(config)
    }

    /// Set the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the refresh path (one leading `/` is stripped).
    #[must_use]
    pub fn with_refresh_path(mut self, path: &str) -> Self {
        self.refresh_path = normalize_refresh_path(path);
        self
    }

    /// Replace the default headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the expiry safety margin.
    #[must_use]
    pub const fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    /// Set the coordination mode.
    #[must_use]
    pub const fn with_coordination(mut self, coordination: Coordination) -> Self {
        self.coordination = coordination;
        self
    }

    /// Set the poll loop used by [`Coordination::LockPolling`].
    #[must_use]
    pub const fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

/// Parse a variable with a default value.
fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(val) => val.parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_coordination(value: Option<&str>) -> Result<Coordination, ConfigError> {
    match value {
        None | Some("shared") => Ok(Coordination::SharedFlight),
        Some("polling") => Ok(Coordination::LockPolling),
        Some(other) => Err(ConfigError::ParseError {
            name: "OIDC_REFRESH_MODE".to_string(),
            reason: format!("expected `shared` or `polling`, got `{other}`"),
        }),
    }
}
