//! Session manager: sign-in, sign-out, token refresh and the user resource.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::cookie::{CookieJar, PersistedCookie, SESSION_COOKIE};
use super::navigator::{Navigator, LOGIN_ROUTE};
use super::state::SessionState;
use super::timer::RefreshTimer;
use super::token;
use crate::api::{ApiClient, ApiError};
use crate::models::{
    Account, Credentials, EmailRequest, ResetPasswordRequest, Session, TokenRequest, UpdatedUser,
    UserId,
};

// ============================================================================
// Endpoints
// ============================================================================

const AUTHENTICATE_PATH: &str = "/auth/authenticate";
const LOGOUT_PATH: &str = "/auth/account/logout";
const REFRESH_PATH: &str = "/auth/account/refresh";
const REGISTER_PATH: &str = "/register";
const VERIFY_EMAIL_PATH: &str = "/verify-email";
const FORGOT_PASSWORD_PATH: &str = "/forgot-password";
const VALIDATE_RESET_TOKEN_PATH: &str = "/validate-reset-token";
const RESET_PASSWORD_PATH: &str = "/reset-password";
const USERS_PATH: &str = "";

/// Used when neither the options nor the API URL name a host
const FALLBACK_COOKIE_DOMAIN: &str = "localhost";

fn user_path(id: &UserId) -> String {
    format!("/{}", id)
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Domain the session cookie is scoped to. Defaults to the API host.
    pub cookie_domain: Option<String>,
    /// Where `logout` sends the user
    pub login_route: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cookie_domain: None,
            login_route: LOGIN_ROUTE.to_string(),
        }
    }
}

struct Inner {
    api: ApiClient,
    state: Arc<SessionState>,
    cookies: Arc<dyn CookieJar>,
    navigator: Arc<dyn Navigator>,
    timer: RefreshTimer,
    /// Held across login, refresh and logout so they apply one at a time
    transition: Mutex<()>,
    /// Bumped whenever a session is established or cleared. A scheduled
    /// refresh only runs if nothing changed since it was scheduled.
    generation: AtomicU64,
    /// Most recent background revoke request
    revoke: StdMutex<Option<JoinHandle<()>>>,
    cookie_domain: String,
    login_route: String,
}

/// Signs the user in and out, keeps the token fresh and publishes the
/// current user through the injected `SessionState`.
///
/// Clone is cheap; every clone drives the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        api: ApiClient,
        state: Arc<SessionState>,
        cookies: Arc<dyn CookieJar>,
        navigator: Arc<dyn Navigator>,
        options: SessionOptions,
    ) -> Self {
        let cookie_domain = options
            .cookie_domain
            .or_else(|| api.host().map(str::to_string))
            .unwrap_or_else(|| FALLBACK_COOKIE_DOMAIN.to_string());

        Self {
            inner: Arc::new(Inner {
                api,
                state,
                cookies,
                navigator,
                timer: RefreshTimer::new(),
                transition: Mutex::new(()),
                generation: AtomicU64::new(0),
                revoke: StdMutex::new(None),
                cookie_domain,
                login_route: options.login_route,
            }),
        }
    }

    // ===== Current user =====

    /// Subscribe to the current user
    pub fn user(&self) -> watch::Receiver<Option<Session>> {
        self.inner.state.subscribe()
    }

    /// Snapshot of the current user
    pub fn user_value(&self) -> Option<Session> {
        self.inner.state.current()
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.inner.state
    }

    pub fn is_refresh_scheduled(&self) -> bool {
        self.inner.timer.is_scheduled()
    }

    /// When the next token refresh is due
    pub fn refresh_deadline(&self) -> Option<Instant> {
        self.inner.timer.deadline()
    }

    // ===== Session lifecycle =====

    /// Sign in, persist the token cookie and start the refresh timer.
    /// The transport error is returned unchanged on failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let _guard = self.inner.transition.lock().await;

        match self.authenticate(email, password).await {
            Ok(session) => {
                info!(user = %session.id, "Logged in");
                Ok(session)
            }
            Err(e) => {
                error!(error = %e, "Error during login");
                Err(e)
            }
        }
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Session> {
        let result = self
            .inner
            .api
            .post(AUTHENTICATE_PATH, &Credentials { email, password }, None)
            .await;
        let session: Session = self.check_auth_locked(result)?;
        self.establish(session)
    }

    /// Revoke the token (best effort), stop refreshing, forget the user and
    /// go to the login view.
    pub async fn logout(&self) {
        let _guard = self.inner.transition.lock().await;
        self.logout_locked();
    }

    /// The revoke request runs in the background; nothing here waits on it.
    fn logout_locked(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let api = self.inner.api.clone();
        let bearer = self.inner.state.token();
        let revoke = tokio::spawn(async move {
            if let Err(e) = api.get::<Value>(LOGOUT_PATH, bearer.as_deref()).await {
                debug!(error = %e, "Token revoke failed, ignoring");
            }
        });
        *self
            .inner
            .revoke
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(revoke);

        self.inner.timer.stop();
        self.inner.state.publish(None);
        if let Err(e) = self.inner.cookies.remove(SESSION_COOKIE) {
            warn!(error = %e, "Failed to clear session cookie");
        }
        info!("Logged out");
        self.inner.navigator.navigate(&self.inner.login_route);
    }

    /// Wait for the revoke request sent by the last logout, if still running.
    /// Short-lived front ends call this before exiting.
    pub async fn wait_for_revoke(&self) {
        let pending = self
            .inner
            .revoke
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = pending {
            if let Err(e) = handle.await {
                debug!(error = %e, "Revoke task did not finish");
            }
        }
    }

    /// Exchange the ambient credentials for a fresh token and restart the
    /// refresh timer.
    pub async fn refresh_token(&self) -> Result<Session> {
        let _guard = self.inner.transition.lock().await;
        self.refresh_locked().await
    }

    /// Timer-driven refresh. Does nothing if a login or logout happened
    /// after it was scheduled.
    async fn scheduled_refresh(&self, generation: u64) -> Result<()> {
        let _guard = self.inner.transition.lock().await;
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            debug!("Session changed since refresh was scheduled, skipping");
            return Ok(());
        }
        self.refresh_locked().await.map(|_| ())
    }

    async fn refresh_locked(&self) -> Result<Session> {
        let bearer = match self.inner.state.token() {
            Some(token) => Some(token),
            None => self.persisted_token(),
        };
        let result = self
            .inner
            .api
            .post(REFRESH_PATH, &json!({}), bearer.as_deref())
            .await;
        let session: Session = self.check_auth_locked(result)?;
        let session = self.establish(session)?;

        debug!(user = %session.id, "Token refreshed");
        Ok(session)
    }

    /// Validate the token, then persist, publish and schedule, in that order.
    /// Nothing is mutated when the token cannot be decoded.
    fn establish(&self, session: Session) -> Result<Session> {
        let delay = token::refresh_delay(&session.token, Utc::now())?;

        let cookie =
            PersistedCookie::session_token(&session.token, &self.inner.cookie_domain, Utc::now());
        self.inner
            .cookies
            .set(cookie)
            .context("Failed to persist session cookie")?;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.publish(Some(session.clone()));
        self.start_refresh_timer(delay, generation);
        Ok(session)
    }

    fn start_refresh_timer(&self, delay: Duration, generation: u64) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.timer.start(delay, async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = SessionManager { inner };
            // Detached so that restarting the timer from inside the refresh
            // does not cancel the refresh itself.
            tokio::spawn(async move {
                if let Err(e) = manager.scheduled_refresh(generation).await {
                    warn!(error = %e, "Scheduled token refresh failed");
                }
            });
        });
    }

    fn persisted_token(&self) -> Option<String> {
        match self.inner.cookies.get(SESSION_COOKIE) {
            Ok(cookie) => cookie.map(|c| c.value),
            Err(e) => {
                warn!(error = %e, "Failed to read session cookie");
                None
            }
        }
    }

    fn bearer(&self) -> Option<String> {
        self.inner.state.token()
    }

    // ===== Auto-logout on rejected credentials =====

    /// A 401/403 while signed in means the session is gone server-side.
    /// Caller must not hold the transition guard.
    async fn check_auth<T>(&self, result: Result<T, ApiError>) -> Result<T> {
        match result {
            Err(e) if e.is_auth_rejection() && self.inner.state.is_logged_in() => {
                warn!(error = %e, "Credentials rejected, logging out");
                self.logout().await;
                Err(e.into())
            }
            other => other.map_err(Into::into),
        }
    }

    /// Same as `check_auth`, for callers already holding the transition guard
    fn check_auth_locked<T>(&self, result: Result<T, ApiError>) -> Result<T> {
        match result {
            Err(e) if e.is_auth_rejection() && self.inner.state.is_logged_in() => {
                warn!(error = %e, "Credentials rejected, logging out");
                self.logout_locked();
                Err(e.into())
            }
            other => other.map_err(Into::into),
        }
    }

    // ===== Account flows (no session change) =====

    pub async fn register<B: Serialize + ?Sized>(&self, params: &B) -> Result<Value> {
        let result = self
            .inner
            .api
            .post(REGISTER_PATH, params, self.bearer().as_deref())
            .await;
        self.check_auth(result).await
    }

    pub async fn verify_email(&self, token: &str) -> Result<Value> {
        let result = self
            .inner
            .api
            .post(VERIFY_EMAIL_PATH, &TokenRequest { token }, self.bearer().as_deref())
            .await;
        self.check_auth(result).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<Value> {
        let result = self
            .inner
            .api
            .post(FORGOT_PASSWORD_PATH, &EmailRequest { email }, self.bearer().as_deref())
            .await;
        self.check_auth(result).await
    }

    pub async fn validate_reset_token(&self, token: &str) -> Result<Value> {
        let result = self
            .inner
            .api
            .post(
                VALIDATE_RESET_TOKEN_PATH,
                &TokenRequest { token },
                self.bearer().as_deref(),
            )
            .await;
        self.check_auth(result).await
    }

    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<Value> {
        let result = self
            .inner
            .api
            .post(RESET_PASSWORD_PATH, request, self.bearer().as_deref())
            .await;
        self.check_auth(result).await
    }

    // ===== User resource =====

    pub async fn get_all(&self) -> Result<Vec<Account>> {
        let result = self.inner.api.get(USERS_PATH, self.bearer().as_deref()).await;
        self.check_auth(result).await
    }

    pub async fn get_by_id(&self, id: &UserId) -> Result<Account> {
        let result = self
            .inner
            .api
            .get(&user_path(id), self.bearer().as_deref())
            .await;
        self.check_auth(result).await
    }

    pub async fn create<B: Serialize + ?Sized>(&self, params: &B) -> Result<Value> {
        let result = self
            .inner
            .api
            .post(USERS_PATH, params, self.bearer().as_deref())
            .await;
        self.check_auth(result).await
    }

    /// Update a user. When it is the signed-in user, the response is merged
    /// into the current session, republished and returned.
    pub async fn update<B: Serialize + ?Sized>(
        &self,
        id: &UserId,
        params: &B,
    ) -> Result<UpdatedUser> {
        let result = self
            .inner
            .api
            .put(&user_path(id), params, self.bearer().as_deref())
            .await;
        let account: Account = self.check_auth(result).await?;

        let fields = account.to_map()?;
        let merged = self
            .inner
            .state
            .merge_if_current(id, &fields)
            .context("Failed to merge updated account into session")?;

        match merged {
            Some(session) => {
                debug!(user = %id, "Current user updated");
                Ok(UpdatedUser::Current(session))
            }
            None => Ok(UpdatedUser::Other(account)),
        }
    }

    /// Delete a user. Deleting the signed-in user logs out.
    pub async fn delete(&self, id: &UserId) -> Result<Value> {
        let result = self
            .inner
            .api
            .delete(&user_path(id), self.bearer().as_deref())
            .await;
        let response = self.check_auth(result).await?;

        if self.inner.state.id().as_ref() == Some(id) {
            info!(user = %id, "Current user deleted");
            self.logout().await;
        }
        Ok(response)
    }
}
