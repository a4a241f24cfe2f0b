//! Token endpoint client: authorization-code and refresh-token grants.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use strum::Display;

use super::error::AuthError;
use crate::config::{AppConfig, AuthConfig};

/// OAuth2 grant types used against the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    /// Human-readable name of the operation, used in error messages.
    pub fn action(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "exchange authorization code",
            Self::RefreshToken => "refresh access token",
        }
    }
}

/// Result of a successful token exchange.
#[derive(Debug, Clone)]
pub struct TokenBundle {
    pub access_token: String,
    /// Present when the endpoint issued (or echoed) a refresh token.
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    /// Base64 identity token, still encoded.
    pub id_token: Option<String>,
    /// Provider-declared access-token lifetime in seconds.
    pub expires_in: i64,
    /// `now + expires_in - safety margin`.
    pub access_token_expires_at: DateTime<Utc>,
    /// Only set for the authorization-code grant.
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
}

/// Source of fresh access tokens for the refresh scheduler.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str, app: &AppConfig)
        -> Result<TokenBundle, AuthError>;
}

/// Client for the authorization server's token endpoint.
///
/// # Example
/// ```no_run
/// use schwab_auth::auth::TokenExchangeClient;
/// use schwab_auth::config::{AppConfig, AuthConfig};
///
/// # async fn example() -> Result<(), schwab_auth::auth::AuthError> {
/// let app = AppConfig::new("client-id", "client-secret", "https://127.0.0.1/callback");
/// let client = TokenExchangeClient::new(&AuthConfig::default())?;
/// let bundle = client.exchange_authorization_code("AUTHCODE", &app).await?;
/// println!("access token expires at {}", bundle.access_token_expires_at);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    client: reqwest::Client,
    token_url: String,
    safety_margin: Duration,
    refresh_token_lifetime: Duration,
}

impl TokenExchangeClient {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::InvalidState(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Use a caller-provided HTTP client.
    pub fn with_client(client: reqwest::Client, config: &AuthConfig) -> Self {
        Self {
            client,
            token_url: config.token_url.clone(),
            safety_margin: to_chrono(config.access_token_safety_margin),
            refresh_token_lifetime: to_chrono(config.refresh_token_lifetime),
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Trade an authorization code for the initial token set.
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        app: &AppConfig,
    ) -> Result<TokenBundle, AuthError> {
        let form = [
            ("grant_type", GrantType::AuthorizationCode.to_string()),
            ("code", code.to_string()),
            ("redirect_uri", app.redirect_uri().to_string()),
        ];
        self.request(GrantType::AuthorizationCode, app, &form).await
    }

    /// Obtain a new access token. The caller decides whether the returned
    /// refresh token is a rotation.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        app: &AppConfig,
    ) -> Result<TokenBundle, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidState(
                "cannot refresh without a refresh token".to_string(),
            ));
        }
        let form = [
            ("grant_type", GrantType::RefreshToken.to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        self.request(GrantType::RefreshToken, app, &form).await
    }

    async fn request(
        &self,
        grant: GrantType,
        app: &AppConfig,
        form: &[(&str, String)],
    ) -> Result<TokenBundle, AuthError> {
        tracing::debug!(grant = %grant, url = %self.token_url, "Requesting token");

        let resp = self
            .client
            .post(&self.token_url)
            .header(AUTHORIZATION, app.auth_header())
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::network(grant, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let body = serde_json::from_str::<serde_json::Value>(&text).ok();
            tracing::debug!(
                grant = %grant,
                status = status.as_u16(),
                "Token endpoint rejected request"
            );
            return Err(AuthError::TokenExchange {
                grant,
                status: Some(status.as_u16()),
                message: rejection_message(status, body.as_ref()),
                body,
                source: None,
            });
        }

        let payload: TokenResponse = resp.json().await.map_err(|e| AuthError::network(grant, e))?;
        let lifetime = match grant {
            GrantType::AuthorizationCode => Some(self.refresh_token_lifetime),
            GrantType::RefreshToken => None,
        };
        payload.into_bundle(Utc::now(), self.safety_margin, lifetime)
    }
}

#[async_trait]
impl TokenRefresher for TokenExchangeClient {
    async fn refresh(
        &self,
        refresh_token: &str,
        app: &AppConfig,
    ) -> Result<TokenBundle, AuthError> {
        self.refresh_access_token(refresh_token, app).await
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    id_token: Option<String>,
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    fn into_bundle(
        self,
        now: DateTime<Utc>,
        safety_margin: Duration,
        refresh_lifetime: Option<Duration>,
    ) -> Result<TokenBundle, AuthError> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::InvalidResponse("missing access_token".to_string()))?;
        let expires_in = self
            .expires_in
            .as_ref()
            .and_then(parse_seconds)
            .ok_or_else(|| {
                AuthError::InvalidResponse("missing or invalid expires_in".to_string())
            })?;

        let access_token_expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime - safety_margin))
            .ok_or_else(|| {
                AuthError::InvalidResponse(format!("expires_in out of range: {expires_in}"))
            })?;

        Ok(TokenBundle {
            access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            scope: self.scope,
            id_token: self.id_token.filter(|t| !t.is_empty()),
            expires_in,
            access_token_expires_at,
            refresh_token_expires_at: refresh_lifetime.map(|lifetime| now + lifetime),
        })
    }
}

/// `expires_in` arrives as a number or a numeric string.
fn parse_seconds(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn rejection_message(status: reqwest::StatusCode, body: Option<&serde_json::Value>) -> String {
    let reason = status.canonical_reason().unwrap_or("unknown status");
    let detail = body.and_then(|b| {
        b.get("error_description")
            .or_else(|| b.get("error"))
            .and_then(|v| v.as_str())
    });
    match detail {
        Some(detail) => format!("{} {reason} ({detail})", status.as_u16()),
        None => format!("{} {reason}", status.as_u16()),
    }
}

pub(crate) fn to_chrono(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or_else(|_| Duration::days(36_500))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: serde_json::Value) -> TokenResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn grant_type_renders_wire_names() {
        assert_eq!(GrantType::AuthorizationCode.to_string(), "authorization_code");
        assert_eq!(GrantType::RefreshToken.to_string(), "refresh_token");
    }

    #[test]
    fn access_expiry_subtracts_safety_margin() {
        let now = Utc::now();
        let bundle = response(json!({"access_token": "AT1", "expires_in": 1800}))
            .into_bundle(now, Duration::seconds(120), None)
            .unwrap();
        assert_eq!(bundle.access_token_expires_at, now + Duration::seconds(1680));
        assert_eq!(bundle.refresh_token_expires_at, None);
    }

    #[test]
    fn refresh_expiry_uses_fixed_lifetime() {
        let now = Utc::now();
        let bundle = response(json!({"access_token": "AT1", "expires_in": "1800"}))
            .into_bundle(now, Duration::seconds(120), Some(Duration::days(6)))
            .unwrap();
        assert_eq!(bundle.expires_in, 1800);
        assert_eq!(bundle.refresh_token_expires_at, Some(now + Duration::days(6)));
    }

    #[test]
    fn missing_access_token_is_invalid() {
        let err = response(json!({"expires_in": 1800}))
            .into_bundle(Utc::now(), Duration::seconds(120), None)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(msg) if msg.contains("access_token")));
    }

    #[test]
    fn missing_expires_in_is_invalid() {
        let err = response(json!({"access_token": "AT1", "expires_in": "soon"}))
            .into_bundle(Utc::now(), Duration::seconds(120), None)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(msg) if msg.contains("expires_in")));
    }

    #[test]
    fn rejection_message_prefers_error_description() {
        let body = json!({"error": "invalid_grant", "error_description": "code expired"});
        assert_eq!(
            rejection_message(reqwest::StatusCode::BAD_REQUEST, Some(&body)),
            "400 Bad Request (code expired)"
        );
        assert_eq!(
            rejection_message(reqwest::StatusCode::UNAUTHORIZED, None),
            "401 Unauthorized"
        );
    }
}
