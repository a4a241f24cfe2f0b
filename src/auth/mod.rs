//! OAuth2 credential lifecycle: code exchange, background refresh and
//! identity-token decoding.

pub mod credential;
pub mod error;
pub mod exchange;
pub mod id_token;
pub mod refresh;

pub use credential::{AuthHeader, Credential, CredentialHandle};
pub use error::AuthError;
pub use exchange::{GrantType, TokenBundle, TokenExchangeClient, TokenRefresher};
pub use id_token::{IdentityClaims, IdentityHeader, IdentityToken};
pub use refresh::{AutoRefreshScheduler, SchedulerState};
