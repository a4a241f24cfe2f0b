//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthError, AuthHeader, AutoRefreshScheduler, Credential, CredentialHandle, IdentityToken,
    SchedulerState, TokenBundle, TokenExchangeClient,
};
pub use crate::config::{AppConfig, AuthConfig};
pub use crate::error::{Result, SchwabError};
