use thiserror::Error;

use super::exchange::GrantType;

/// Errors raised by the credential lifecycle.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint rejected the request or could not be reached.
    #[error("Failed to {}: {message}", .grant.action())]
    TokenExchange {
        grant: GrantType,
        /// HTTP status, when a response was received.
        status: Option<u16>,
        message: String,
        /// Parsed JSON error body, when the endpoint returned one.
        body: Option<serde_json::Value>,
        #[source]
        source: Option<reqwest::Error>,
    },
    #[error("Malformed identity token: {0}")]
    MalformedToken(String),
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl AuthError {
    pub(crate) fn network(grant: GrantType, error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            format!("request timed out ({error})")
        } else {
            error.to_string()
        };
        Self::TokenExchange {
            grant,
            status: None,
            message,
            body: None,
            source: Some(error),
        }
    }

    /// HTTP status of a rejected exchange, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TokenExchange { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a later attempt could plausibly succeed.
    ///
    /// Transport failures and 5xx/429 responses are transient; a 4xx means the
    /// grant itself was refused.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TokenExchange { status: None, .. } => true,
            Self::TokenExchange {
                status: Some(code), ..
            } => *code == 429 || (500..=599).contains(code),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(status: u16) -> AuthError {
        AuthError::TokenExchange {
            grant: GrantType::RefreshToken,
            status: Some(status),
            message: "Unauthorized".to_string(),
            body: None,
            source: None,
        }
    }

    #[test]
    fn display_names_the_failed_operation() {
        let err = AuthError::TokenExchange {
            grant: GrantType::AuthorizationCode,
            status: Some(400),
            message: "Bad Request".to_string(),
            body: None,
            source: None,
        };
        assert_eq!(
            err.to_string(),
            "Failed to exchange authorization code: Bad Request"
        );
        assert_eq!(
            rejected(401).to_string(),
            "Failed to refresh access token: Unauthorized"
        );
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        assert!(rejected(503).is_transient());
        assert!(rejected(429).is_transient());
        assert!(!rejected(401).is_transient());
        assert!(!AuthError::MalformedToken("x".into()).is_transient());
    }

    #[test]
    fn status_is_exposed_for_exchange_errors_only() {
        assert_eq!(rejected(401).status(), Some(401));
        assert_eq!(AuthError::InvalidState("x".into()).status(), None);
    }
}
