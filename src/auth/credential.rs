//! Session credential and its shared read handle.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};

use super::exchange::TokenBundle;
use super::id_token::IdentityToken;

/// Anything that can produce an `Authorization` header for API calls.
///
/// This is the only thing request builders need from the auth layer.
pub trait AuthHeader {
    fn auth_header(&self) -> String;
}

/// Tokens for one authenticated session.
///
/// Setters are independent; callers set a token and its expiry together. A
/// token without an expiry is treated as expired.
#[derive(Clone, Default)]
pub struct Credential {
    access_token: String,
    refresh_token: String,
    scope: String,
    identity: Option<IdentityToken>,
    access_token_expires_at: Option<DateTime<Utc>>,
    refresh_token_expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("scope", &self.scope)
            .field("identity", &self.identity.as_ref().map(|_| ".."))
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .finish()
    }
}

impl Credential {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a credential from an authorization-code exchange.
    ///
    /// Without a refresh token in the response, the refresh expiry stays
    /// unset so the missing token reads as expired.
    pub fn from_bundle(bundle: TokenBundle, identity: Option<IdentityToken>) -> Self {
        let refresh_token = bundle.refresh_token.unwrap_or_default();
        let refresh_token_expires_at = if refresh_token.is_empty() {
            None
        } else {
            bundle.refresh_token_expires_at
        };
        Self {
            access_token: bundle.access_token,
            refresh_token,
            scope: bundle.scope.unwrap_or_default(),
            identity,
            access_token_expires_at: Some(bundle.access_token_expires_at),
            refresh_token_expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Decoded identity claims of the session user.
    pub fn identity(&self) -> Option<&IdentityToken> {
        self.identity.as_ref()
    }

    pub fn access_token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.access_token_expires_at
    }

    pub fn refresh_token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.refresh_token_expires_at
    }

    pub fn is_access_token_expired(&self) -> bool {
        is_expired(self.access_token_expires_at, Utc::now())
    }

    pub fn is_refresh_token_expired(&self) -> bool {
        is_expired(self.refresh_token_expires_at, Utc::now())
    }

    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = token.into();
    }

    pub fn set_refresh_token(&mut self, token: impl Into<String>) {
        self.refresh_token = token.into();
    }

    pub fn set_access_token_expires_at(&mut self, expires_at: DateTime<Utc>) {
        self.access_token_expires_at = Some(expires_at);
    }

    pub fn set_refresh_token_expires_at(&mut self, expires_at: DateTime<Utc>) {
        self.refresh_token_expires_at = Some(expires_at);
    }

    pub fn set_identity(&mut self, identity: IdentityToken) {
        self.identity = Some(identity);
    }

    pub fn set_scope(&mut self, scope: impl Into<String>) {
        self.scope = scope.into();
    }

    /// Apply a refresh response.
    ///
    /// The access token, its expiry and the identity are replaced together.
    /// The refresh token and its expiry are rotated only when the response
    /// carries a refresh token different from the stored one; the rotated
    /// token expires `refresh_lifetime` after `now`. Returns whether a
    /// rotation happened.
    pub fn apply_refresh(
        &mut self,
        bundle: TokenBundle,
        identity: Option<IdentityToken>,
        now: DateTime<Utc>,
        refresh_lifetime: Duration,
    ) -> bool {
        self.access_token = bundle.access_token;
        self.access_token_expires_at = Some(bundle.access_token_expires_at);
        if let Some(identity) = identity {
            self.identity = Some(identity);
        }
        if let Some(scope) = bundle.scope {
            self.scope = scope;
        }

        match bundle.refresh_token {
            Some(rotated) if !rotated.is_empty() && rotated != self.refresh_token => {
                self.refresh_token = rotated;
                self.refresh_token_expires_at = Some(now + refresh_lifetime);
                true
            }
            _ => false,
        }
    }
}

impl AuthHeader for Credential {
    fn auth_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map(|at| at <= now).unwrap_or(true)
}

fn redact(token: &str) -> &'static str {
    if token.is_empty() {
        ""
    } else {
        "***"
    }
}

/// Shared, cloneable view of a [`Credential`].
///
/// The refresh scheduler is the only writer; API call sites read through
/// [`AuthHeader::auth_header`] or [`CredentialHandle::snapshot`].
#[derive(Clone, Debug, Default)]
pub struct CredentialHandle {
    inner: Arc<RwLock<Credential>>,
}

impl CredentialHandle {
    pub fn new(credential: Credential) -> Self {
        Self {
            inner: Arc::new(RwLock::new(credential)),
        }
    }

    /// Copy of the current credential.
    pub fn snapshot(&self) -> Credential {
        self.read().clone()
    }

    pub fn access_token(&self) -> String {
        self.read().access_token.clone()
    }

    pub fn is_access_token_expired(&self) -> bool {
        self.read().is_access_token_expired()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Credential> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Credential> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuthHeader for CredentialHandle {
    fn auth_header(&self) -> String {
        self.read().auth_header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(access: &str, refresh: Option<&str>, expires_at: DateTime<Utc>) -> TokenBundle {
        TokenBundle {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            token_type: Some("Bearer".to_string()),
            scope: Some("api".to_string()),
            id_token: None,
            expires_in: 1800,
            access_token_expires_at: expires_at,
            refresh_token_expires_at: None,
        }
    }

    fn seeded(now: DateTime<Utc>) -> Credential {
        let mut credential = Credential::new();
        credential.set_access_token("AT0");
        credential.set_access_token_expires_at(now + Duration::minutes(28));
        credential.set_refresh_token("RT0");
        credential.set_refresh_token_expires_at(now + Duration::days(2));
        credential
    }

    #[test]
    fn auth_header_is_bearer_access_token() {
        let mut credential = Credential::new();
        credential.set_access_token("abc");
        assert_eq!(credential.auth_header(), "Bearer abc");
    }

    #[test]
    fn token_without_expiry_counts_as_expired() {
        let mut credential = Credential::new();
        credential.set_access_token("abc");
        assert!(credential.is_access_token_expired());
        assert!(credential.is_refresh_token_expired());
    }

    #[test]
    fn expiry_at_now_is_expired() {
        let now = Utc::now();
        assert!(is_expired(Some(now), now));
        assert!(!is_expired(Some(now + Duration::seconds(1)), now));
    }

    #[test]
    fn apply_refresh_keeps_refresh_token_when_unchanged() {
        let now = Utc::now();
        let mut credential = seeded(now);
        let before = credential.refresh_token_expires_at();

        let rotated = credential.apply_refresh(
            bundle("AT1", Some("RT0"), now + Duration::minutes(28)),
            None,
            now,
            Duration::days(6),
        );

        assert!(!rotated);
        assert_eq!(credential.access_token(), "AT1");
        assert_eq!(credential.refresh_token(), "RT0");
        assert_eq!(credential.refresh_token_expires_at(), before);
    }

    #[test]
    fn apply_refresh_rotates_new_refresh_token() {
        let now = Utc::now();
        let mut credential = seeded(now);

        let rotated = credential.apply_refresh(
            bundle("AT1", Some("RT1"), now + Duration::minutes(28)),
            None,
            now,
            Duration::days(6),
        );

        assert!(rotated);
        assert_eq!(credential.refresh_token(), "RT1");
        assert_eq!(credential.refresh_token_expires_at(), Some(now + Duration::days(6)));
    }

    #[test]
    fn apply_refresh_ignores_missing_refresh_token() {
        let now = Utc::now();
        let mut credential = seeded(now);
        assert!(!credential.apply_refresh(
            bundle("AT1", None, now + Duration::minutes(28)),
            None,
            now,
            Duration::days(6),
        ));
        assert_eq!(credential.refresh_token(), "RT0");
    }

    #[test]
    fn from_bundle_sets_refresh_expiry_with_refresh_token() {
        let now = Utc::now();
        let mut issued = bundle("AT1", Some("RT1"), now + Duration::minutes(28));
        issued.refresh_token_expires_at = Some(now + Duration::days(6));

        let credential = Credential::from_bundle(issued, None);

        assert_eq!(credential.refresh_token(), "RT1");
        assert_eq!(credential.refresh_token_expires_at(), Some(now + Duration::days(6)));
        assert!(!credential.is_refresh_token_expired());
    }

    #[test]
    fn from_bundle_without_refresh_token_reads_as_expired() {
        let now = Utc::now();
        for refresh in [None, Some("")] {
            let mut issued = bundle("AT1", refresh, now + Duration::minutes(28));
            issued.refresh_token_expires_at = Some(now + Duration::days(6));

            let credential = Credential::from_bundle(issued, None);

            assert_eq!(credential.refresh_token(), "");
            assert_eq!(credential.refresh_token_expires_at(), None);
            assert!(credential.is_refresh_token_expired());
            assert!(!credential.is_access_token_expired());
        }
    }

    #[test]
    fn handle_reads_see_writes() {
        let handle = CredentialHandle::new(seeded(Utc::now()));
        let reader = handle.clone();
        handle.write().set_access_token("AT9");
        assert_eq!(reader.auth_header(), "Bearer AT9");
        assert_eq!(reader.access_token(), "AT9");
    }

    #[test]
    fn debug_redacts_tokens() {
        let rendered = format!("{:?}", seeded(Utc::now()));
        assert!(!rendered.contains("AT0"));
        assert!(!rendered.contains("RT0"));
    }
}
