//! Configuration: application credentials and auth tunables (code > env).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bon::Builder;

use crate::error::SchwabError;

/// Production token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://api.schwabapi.com/v1/oauth/token";

/// Registered application credentials.
///
/// # Example
/// ```
/// use schwab_auth::config::AppConfig;
///
/// let app = AppConfig::new("clientId", "clientSecret", "redirectUri");
/// assert_eq!(app.auth_header(), "Basic Y2xpZW50SWQ6Y2xpZW50U2VjcmV0");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

impl AppConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Load from `SCHWAB_CLIENT_ID`, `SCHWAB_CLIENT_SECRET` and
    /// `SCHWAB_REDIRECT_URI`, reading `.env` first if present.
    pub fn from_env() -> Result<Self, SchwabError> {
        let _ = dotenvy::dotenv();
        Ok(Self::new(
            required_env("SCHWAB_CLIENT_ID")?,
            required_env("SCHWAB_CLIENT_SECRET")?,
            required_env("SCHWAB_REDIRECT_URI")?,
        ))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// HTTP Basic credentials for the token endpoint.
    pub fn auth_header(&self) -> String {
        let raw = format!("{}:{}", self.client_id, self.client_secret);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

/// Token lifecycle tunables.
///
/// `refresh_interval` must stay below the provider's access-token lifetime
/// minus `access_token_safety_margin`; see [`AuthConfig::validate_against_ttl`].
///
/// # Example
/// ```
/// use std::time::Duration;
/// use schwab_auth::config::AuthConfig;
///
/// let config = AuthConfig::builder()
///     .refresh_interval(Duration::from_secs(10 * 60))
///     .build();
/// assert_eq!(config.max_retries, 5);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct AuthConfig {
    #[builder(into, default = DEFAULT_TOKEN_URL.to_string())]
    pub token_url: String,
    #[builder(default = Duration::from_secs(20 * 60))]
    pub refresh_interval: Duration,
    #[builder(default = Duration::from_secs(60))]
    pub retry_delay: Duration,
    /// Retries after the first failed attempt of a cycle.
    #[builder(default = 5)]
    pub max_retries: u32,
    #[builder(default = Duration::from_secs(120))]
    pub access_token_safety_margin: Duration,
    /// The provider does not report a refresh-token TTL; this is assumed.
    #[builder(default = Duration::from_secs(6 * 24 * 60 * 60))]
    pub refresh_token_lifetime: Duration,
    #[builder(default = Duration::from_secs(30))]
    pub request_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AuthConfig {
    /// Defaults overridden by `SCHWAB_*` environment variables.
    pub fn from_env() -> Result<Self, SchwabError> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SCHWAB_TOKEN_URL") {
            config.token_url = url;
        }
        if let Some(secs) = optional_env::<u64>("SCHWAB_REFRESH_INTERVAL_SECS")? {
            config.refresh_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = optional_env::<u64>("SCHWAB_RETRY_DELAY_SECS")? {
            config.retry_delay = Duration::from_secs(secs);
        }
        if let Some(retries) = optional_env::<u32>("SCHWAB_MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(secs) = optional_env::<u64>("SCHWAB_REFRESH_TOKEN_LIFETIME_SECS")? {
            config.refresh_token_lifetime = Duration::from_secs(secs);
        }
        if let Some(secs) = optional_env::<u64>("SCHWAB_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Check the refresh cadence against a provider-declared `expires_in`.
    ///
    /// Returns a description of the problem when an access token could expire
    /// between two scheduled refreshes.
    pub fn validate_against_ttl(&self, expires_in_secs: i64) -> Option<String> {
        let usable = expires_in_secs - self.access_token_safety_margin.as_secs() as i64;
        let interval = self.refresh_interval.as_secs() as i64;
        if interval < usable {
            return None;
        }
        Some(format!(
            "refresh interval {interval}s is not shorter than the usable access token \
             lifetime {usable}s (expires_in {expires_in_secs}s minus {}s margin)",
            self.access_token_safety_margin.as_secs()
        ))
    }
}

fn required_env(name: &str) -> Result<String, SchwabError> {
    std::env::var(name)
        .map_err(|_| SchwabError::Configuration(format!("Environment variable {name} not set")))
}

fn optional_env<T: FromStr>(name: &str) -> Result<Option<T>, SchwabError> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            SchwabError::Configuration(format!(
                "Environment variable {name} has invalid value {raw:?}"
            ))
        }),
        Err(_) => Ok(None),
    }
}
