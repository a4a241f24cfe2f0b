//! CLI command handlers.

use crate::auth::{AuthHeader, AutoRefreshScheduler, IdentityToken, TokenExchangeClient};
use crate::config::{AppConfig, AuthConfig};
use crate::error::Result;

/// Handle `schwab-auth decode <token>`.
pub fn handle_decode(token: &str) -> Result<()> {
    let decoded = IdentityToken::decode_base64(token)?;
    println!("{}", serde_json::to_string_pretty(&decoded)?);
    Ok(())
}

/// Handle `schwab-auth exchange --code <code>`.
pub async fn handle_exchange(code: &str) -> Result<()> {
    let app = AppConfig::from_env()?;
    let config = AuthConfig::from_env()?;
    let client = TokenExchangeClient::new(&config)?;
    let bundle = client.exchange_authorization_code(code, &app).await?;

    println!("access_token:  {}", bundle.access_token);
    if let Some(refresh_token) = &bundle.refresh_token {
        println!("refresh_token: {refresh_token}");
    }
    println!("scope:         {}", bundle.scope.as_deref().unwrap_or(""));
    println!("expires_at:    {}", bundle.access_token_expires_at);
    if let Some(expires_at) = bundle.refresh_token_expires_at {
        println!("refresh_until: {expires_at}");
    }
    if let Some(id_token) = bundle.id_token.as_deref() {
        let identity = IdentityToken::decode_base64(id_token)?;
        println!("subject:       {}", identity.payload.subject().unwrap_or(""));
    }
    Ok(())
}

/// Handle `schwab-auth watch --code <code>`.
pub async fn handle_watch(code: &str) -> Result<()> {
    let app = AppConfig::from_env()?;
    let config = AuthConfig::from_env()?;
    let mut scheduler = AutoRefreshScheduler::from_authorization_code(code, app, config).await?;
    scheduler.start()?;

    let credential = scheduler.credential();
    tracing::info!(
        interval_secs = scheduler.config().refresh_interval.as_secs(),
        expires_at = ?credential.snapshot().access_token_expires_at(),
        "Watching credential; press Ctrl-C to stop"
    );
    println!("{}", scheduler.auth_header());

    tokio::signal::ctrl_c().await?;
    scheduler.stop();
    tracing::info!(state = %scheduler.state(), "Stopped");
    Ok(())
}
