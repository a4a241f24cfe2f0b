//! Background access-token renewal.
//!
//! [`AutoRefreshScheduler`] owns the session [`Credential`] and renews the
//! access token on a fixed cadence. A failed renewal is retried after a fixed
//! delay; once the retry budget is spent the periodic timer is cleared and the
//! credential keeps its last good value.
//!
//! At most one refresh attempt runs at a time. A tick that arrives while a
//! previous cycle (attempt or retry wait) is still pending is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use strum::Display;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::credential::{AuthHeader, Credential, CredentialHandle};
use super::error::AuthError;
use super::exchange::{to_chrono, TokenExchangeClient, TokenRefresher};
use super::id_token::IdentityToken;
use crate::config::{AppConfig, AuthConfig};

/// Lifecycle of the periodic timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SchedulerState {
    /// Constructed, never started.
    Idle,
    Running,
    /// Stopped by the caller, or gave up after exhausting retries.
    Stopped,
}

enum Timer {
    Idle,
    Running {
        cancel: CancellationToken,
        driver: JoinHandle<()>,
    },
    Stopped,
}

struct Shared {
    credential: CredentialHandle,
    app: AppConfig,
    refresher: Arc<dyn TokenRefresher>,
    config: AuthConfig,
    attempt_lock: tokio::sync::Mutex<()>,
}

/// Keeps a session's access token fresh in the background.
///
/// # Example
/// ```no_run
/// use schwab_auth::auth::{AuthHeader, AutoRefreshScheduler};
/// use schwab_auth::config::{AppConfig, AuthConfig};
///
/// # async fn example() -> Result<(), schwab_auth::auth::AuthError> {
/// let app = AppConfig::new("client-id", "client-secret", "https://127.0.0.1/callback");
/// let mut scheduler =
///     AutoRefreshScheduler::from_authorization_code("AUTHCODE", app, AuthConfig::default())
///         .await?;
/// scheduler.start()?;
///
/// let credential = scheduler.credential();
/// let header = credential.auth_header();
/// # let _ = header;
/// scheduler.stop();
/// # Ok(())
/// # }
/// ```
pub struct AutoRefreshScheduler {
    shared: Arc<Shared>,
    timer: Timer,
}

impl AutoRefreshScheduler {
    pub fn new(
        credential: Credential,
        app: AppConfig,
        refresher: Arc<dyn TokenRefresher>,
        config: AuthConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                credential: CredentialHandle::new(credential),
                app,
                refresher,
                config,
                attempt_lock: tokio::sync::Mutex::new(()),
            }),
            timer: Timer::Idle,
        }
    }

    /// Exchange an authorization code and wrap the resulting credential.
    ///
    /// The scheduler is returned idle; call [`start`](Self::start) to begin
    /// renewing.
    pub async fn from_authorization_code(
        code: &str,
        app: AppConfig,
        config: AuthConfig,
    ) -> Result<Self, AuthError> {
        let client = TokenExchangeClient::new(&config)?;
        let bundle = client.exchange_authorization_code(code, &app).await?;
        let identity = bundle
            .id_token
            .as_deref()
            .map(IdentityToken::decode_base64)
            .transpose()?;
        warn_on_short_ttl(&config, bundle.expires_in);

        tracing::info!(
            expires_at = %bundle.access_token_expires_at,
            subject = identity.as_ref().and_then(|t| t.payload.subject()).unwrap_or(""),
            "Obtained initial tokens"
        );

        let credential = Credential::from_bundle(bundle, identity);
        Ok(Self::new(credential, app, Arc::new(client), config))
    }

    /// Read handle to the managed credential.
    pub fn credential(&self) -> CredentialHandle {
        self.shared.credential.clone()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.shared.config
    }

    pub fn state(&self) -> SchedulerState {
        match &self.timer {
            Timer::Idle => SchedulerState::Idle,
            Timer::Running { cancel, .. } if cancel.is_cancelled() => SchedulerState::Stopped,
            Timer::Running { .. } => SchedulerState::Running,
            Timer::Stopped => SchedulerState::Stopped,
        }
    }

    /// Start (or restart) the periodic timer.
    ///
    /// Restarting resets the cadence to zero and discards any pending retry.
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> Result<(), AuthError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            AuthError::InvalidState("refresh scheduler requires a Tokio runtime".to_string())
        })?;
        self.stop();

        let cancel = CancellationToken::new();
        let first_tick = Instant::now() + self.shared.config.refresh_interval;
        let driver = runtime.spawn(drive(self.shared.clone(), cancel.clone(), first_tick));
        tracing::debug!(
            interval_secs = self.shared.config.refresh_interval.as_secs(),
            "Started token refresh"
        );
        self.timer = Timer::Running { cancel, driver };
        Ok(())
    }

    /// Clear the periodic timer and any pending retry. No-op when idle.
    pub fn stop(&mut self) {
        match std::mem::replace(&mut self.timer, Timer::Idle) {
            Timer::Idle => {}
            Timer::Stopped => self.timer = Timer::Stopped,
            Timer::Running { cancel, driver } => {
                {
                    // Ordered against the apply step of an in-flight attempt.
                    let _credential = self.shared.credential.write();
                    cancel.cancel();
                }
                driver.abort();
                tracing::debug!("Stopped token refresh");
                self.timer = Timer::Stopped;
            }
        }
    }

    /// Run one refresh attempt now, without retry.
    ///
    /// Serialized with background attempts. Fails on a stopped scheduler.
    pub async fn refresh_now(&self) -> Result<(), AuthError> {
        let cancel = match &self.timer {
            Timer::Stopped => None,
            Timer::Running { cancel, .. } if cancel.is_cancelled() => None,
            Timer::Running { cancel, .. } => Some(cancel.clone()),
            Timer::Idle => Some(CancellationToken::new()),
        }
        .ok_or_else(|| AuthError::InvalidState("refresh scheduler is stopped".to_string()))?;

        self.shared.refresh_once(&cancel).await
    }
}

impl AuthHeader for AutoRefreshScheduler {
    fn auth_header(&self) -> String {
        self.shared.credential.auth_header()
    }
}

impl Drop for AutoRefreshScheduler {
    fn drop(&mut self) {
        if let Timer::Running { cancel, driver } = &self.timer {
            cancel.cancel();
            driver.abort();
        }
    }
}

impl Shared {
    async fn refresh_once(&self, cancel: &CancellationToken) -> Result<(), AuthError> {
        let _attempt = self.attempt_lock.lock().await;

        let refresh_token = self.credential.read().refresh_token().to_string();
        let bundle = self.refresher.refresh(&refresh_token, &self.app).await?;
        let identity = bundle
            .id_token
            .as_deref()
            .map(IdentityToken::decode_base64)
            .transpose()?;
        warn_on_short_ttl(&self.config, bundle.expires_in);

        let expires_at = bundle.access_token_expires_at;
        let rotated = {
            let mut credential = self.credential.write();
            if cancel.is_cancelled() {
                tracing::debug!("Discarding refresh result after stop");
                return Ok(());
            }
            credential.apply_refresh(
                bundle,
                identity,
                Utc::now(),
                to_chrono(self.config.refresh_token_lifetime),
            )
        };

        tracing::info!(%expires_at, rotated, "Refreshed access token");
        Ok(())
    }
}

async fn drive(shared: Arc<Shared>, cancel: CancellationToken, first_tick: Instant) {
    let mut ticker = tokio::time::interval_at(first_tick, shared.config.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let busy = Arc::new(AtomicBool::new(false));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        if busy.swap(true, Ordering::AcqRel) {
            tracing::debug!("Previous refresh still pending; skipping tick");
            continue;
        }

        let shared = shared.clone();
        let cancel = cancel.clone();
        let busy = BusyGuard(busy.clone());
        tokio::spawn(async move {
            let _busy = busy;
            run_cycle(&shared, &cancel).await;
        });
    }
}

/// Clears the cycle-pending flag when the cycle task ends, including on unwind.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One scheduled renewal: the first attempt plus up to `max_retries` retries.
async fn run_cycle(shared: &Shared, cancel: &CancellationToken) {
    let mut retries: u32 = 0;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = shared.refresh_once(cancel) => result,
        };
        let Err(err) = result else {
            return;
        };

        retries += 1;
        if retries > shared.config.max_retries {
            tracing::error!(
                attempts = retries,
                error = %err,
                "Failed to refresh access token after {} retries; no longer refreshing",
                shared.config.max_retries
            );
            cancel.cancel();
            return;
        }

        tracing::warn!(
            attempt = retries,
            retry_in_secs = shared.config.retry_delay.as_secs(),
            error = %err,
            "Failed to refresh access token"
        );
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(shared.config.retry_delay) => {}
        }
    }
}

fn warn_on_short_ttl(config: &AuthConfig, expires_in: i64) {
    if let Some(problem) = config.validate_against_ttl(expires_in) {
        tracing::warn!(expires_in, "{problem}");
    }
}
