#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration as ChronoDuration, Utc};
use schwab_auth::auth::{AuthError, Credential, GrantType, TokenBundle, TokenRefresher};
use schwab_auth::config::AppConfig;
use serde_json::{json, Value};

/// Scripted token endpoint: pops one outcome per call, fails once exhausted.
#[derive(Default)]
pub struct ScriptedRefresher {
    outcomes: Mutex<VecDeque<Outcome>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen_refresh_tokens: Mutex<Vec<String>>,
    latency: Option<Duration>,
}

pub enum Outcome {
    Ok(TokenBundle),
    Err(u16),
}

impl ScriptedRefresher {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn seen_refresh_tokens(&self) -> Vec<String> {
        self.seen_refresh_tokens.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl TokenRefresher for ScriptedRefresher {
    async fn refresh(
        &self,
        refresh_token: &str,
        _app: &AppConfig,
    ) -> Result<TokenBundle, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        self.seen_refresh_tokens
            .lock()
            .expect("lock poisoned")
            .push(refresh_token.to_string());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let outcome = self.outcomes.lock().expect("lock poisoned").pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match outcome {
            Some(Outcome::Ok(bundle)) => Ok(bundle),
            Some(Outcome::Err(status)) => Err(rejected(status)),
            None => Err(rejected(503)),
        }
    }
}

pub fn rejected(status: u16) -> AuthError {
    AuthError::TokenExchange {
        grant: GrantType::RefreshToken,
        status: Some(status),
        message: format!("{status}"),
        body: None,
        source: None,
    }
}

pub fn refreshed(access: &str, refresh: Option<&str>) -> TokenBundle {
    TokenBundle {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        token_type: Some("Bearer".to_string()),
        scope: Some("api".to_string()),
        id_token: None,
        expires_in: 1800,
        access_token_expires_at: Utc::now() + ChronoDuration::seconds(1680),
        refresh_token_expires_at: None,
    }
}

pub fn app() -> AppConfig {
    AppConfig::new("clientId", "clientSecret", "https://127.0.0.1/callback")
}

pub fn seeded_credential() -> Credential {
    let now = Utc::now();
    let mut credential = Credential::new();
    credential.set_access_token("AT0");
    credential.set_access_token_expires_at(now + ChronoDuration::seconds(1680));
    credential.set_refresh_token("RT0");
    credential.set_refresh_token_expires_at(now + ChronoDuration::days(6));
    credential.set_scope("api");
    credential
}

/// Base64 of `header JSON + payload JSON + signature`, as the provider sends it.
pub fn id_token(subject: &str) -> String {
    id_token_with_claims(json!({
        "iss": "urn://api.schwabapi.com",
        "sub": subject,
        "aud": "client",
        "exp": 1_744_668_728,
        "iat": 1_744_665_128,
        "jti": "jwt-1"
    }))
}

pub fn id_token_with_claims(claims: Value) -> String {
    let mut raw = serde_json::to_vec(&json!({"typ": "JWT", "alg": "HS256"})).expect("header");
    raw.extend(serde_json::to_vec(&claims).expect("payload"));
    raw.extend_from_slice(&[0x0c, b'}', 0xef, 0xbf, 0xbd]);
    STANDARD.encode(raw)
}
