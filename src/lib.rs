//! schwab-auth — OAuth2 credentials for the Schwab trader API.
//!
//! Exchanges an authorization code for tokens, keeps the access token fresh
//! in the background, and decodes the identity token the provider returns.
//! Request builders only need [`auth::AuthHeader::auth_header`].
//!
//! # Quick Start
//!
//! ```no_run
//! use schwab_auth::prelude::*;
//!
//! # async fn example() -> schwab_auth::error::Result<()> {
//! let app = AppConfig::from_env()?;
//! let config = AuthConfig::from_env()?;
//! let mut scheduler =
//!     AutoRefreshScheduler::from_authorization_code("AUTHCODE", app, config).await?;
//! scheduler.start()?;
//!
//! let credential = scheduler.credential();
//! println!("{}", credential.auth_header());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;
