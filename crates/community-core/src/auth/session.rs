//! Session state machine: startup restoration, login, registration, logout.
//!
//! The `SessionManager` is the only writer of `SessionState`. Front ends
//! read it through `state()` or follow changes with `subscribe()`.
//!
//! Every operation that awaits the network captures the session epoch first
//! and only publishes its result if the epoch is unchanged. Logout and 401
//! expiry bump the epoch, so a slow response can never bring back a session
//! that was ended in the meantime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::credentials::{CredentialStore, StoreError, ACCESS_TOKEN_KEY, USER_KEY};
use crate::api::{ApiClient, ApiClientBuilder, ApiError, ResponseInterceptor, ResponseMeta};
use crate::models::{LoginRequest, RegisterRequest, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// Startup restoration has not settled yet
    Initializing,
    Authenticated,
    Unauthenticated,
}

/// In-memory session snapshot published to observers
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: AuthPhase,
    pub user: Option<UserProfile>,
    /// True only while startup restoration runs
    pub loading: bool,
}

impl SessionState {
    fn initializing() -> Self {
        Self {
            phase: AuthPhase::Initializing,
            user: None,
            loading: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == AuthPhase::Authenticated
    }

    fn set_authenticated(&mut self, user: UserProfile) {
        self.phase = AuthPhase::Authenticated;
        self.user = Some(user);
    }

    fn set_unauthenticated(&mut self) {
        self.phase = AuthPhase::Unauthenticated;
        self.user = None;
    }
}

/// Result of a user-initiated auth action, ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl AuthOutcome {
    fn succeeded(message: Option<String>) -> Self {
        Self {
            success: true,
            message,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// State shared between the manager and its expiry interceptor
struct SessionShared {
    state: watch::Sender<SessionState>,
    epoch: AtomicU64,
}

impl SessionShared {
    fn new() -> Self {
        let (state, _) = watch::channel(SessionState::initializing());
        Self {
            state,
            epoch: AtomicU64::new(0),
        }
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// End the session: bump the epoch and publish Unauthenticated.
    /// Both happen under the channel lock so no stale update can slip between.
    fn invalidate(&self) {
        self.state.send_modify(|state| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            state.set_unauthenticated();
        });
    }

    /// Like `invalidate`, but only if a session is currently active
    fn expire(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.phase != AuthPhase::Authenticated {
                return false;
            }
            self.epoch.fetch_add(1, Ordering::SeqCst);
            state.set_unauthenticated();
            true
        })
    }

    /// Apply `update` only if no logout or expiry happened since `epoch`
    fn update_if_current(&self, epoch: u64, update: impl FnOnce(&mut SessionState)) -> bool {
        self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            update(state);
            true
        })
    }

    /// Settle a session that never ran restoration, so `loading` does not
    /// stay set when a front end goes straight to login or logout
    fn leave_initializing(&self) {
        self.state.send_if_modified(|state| {
            if state.phase != AuthPhase::Initializing {
                return false;
            }
            state.set_unauthenticated();
            state.loading = false;
            true
        });
    }

    fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.loading != loading;
            state.loading = loading;
            changed
        });
    }
}

/// Moves an active session to Unauthenticated when any call comes back 401.
/// Runs after `PurgeOnUnauthorized`, which has already cleared the store.
struct ExpireSessionOnUnauthorized {
    shared: Arc<SessionShared>,
}

#[async_trait]
impl ResponseInterceptor for ExpireSessionOnUnauthorized {
    async fn on_response(&self, response: &ResponseMeta) -> Result<(), ApiError> {
        if response.status == StatusCode::UNAUTHORIZED && self.shared.expire() {
            info!(path = response.url.path(), "Session expired by server");
        }
        Ok(())
    }
}

pub struct SessionManager {
    api: ApiClient,
    store: Arc<dyn CredentialStore>,
    shared: Arc<SessionShared>,
}

impl SessionManager {
    /// Build the manager and its API client.
    /// The session expiry stage is appended to the builder's response stages.
    pub fn new(builder: ApiClientBuilder) -> Result<Self, ApiError> {
        let shared = Arc::new(SessionShared::new());
        let store = builder.store();
        let api = builder
            .response_interceptor(Arc::new(ExpireSessionOnUnauthorized {
                shared: shared.clone(),
            }))
            .build()?;

        Ok(Self { api, store, shared })
    }

    /// Client for the non-auth endpoints (posts, comments, users)
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Follow session changes; the receiver starts at the current state
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub fn phase(&self) -> AuthPhase {
        self.shared.state.borrow().phase
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state.borrow().loading
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.shared.state.borrow().user.clone()
    }

    // =========================================================================
    // Startup restoration
    // =========================================================================

    /// Restore the persisted session, then validate it against the server.
    ///
    /// With both a token and a cached profile the session is published as
    /// Authenticated right away and confirmed by `GET /auth/me`; any
    /// validation failure ends it and clears the store. Missing or unreadable
    /// credentials settle on Unauthenticated.
    pub async fn restore(&self) -> AuthPhase {
        let epoch = self.shared.epoch();
        self.shared.set_loading(true);
        let phase = self.restore_session(epoch).await;
        self.shared.set_loading(false);
        debug!(?phase, "Session restoration finished");
        phase
    }

    async fn restore_session(&self, epoch: u64) -> AuthPhase {
        let cached_user = match self.read_persisted().await {
            Ok(Some(user)) => user,
            Ok(None) => {
                debug!("No persisted session");
                return self.settle_unauthenticated(epoch);
            }
            Err(e) => {
                error!(error = %e, "Failed to read persisted session, starting logged out");
                return self.settle_unauthenticated(epoch);
            }
        };

        let optimistic = cached_user.clone();
        if !self
            .shared
            .update_if_current(epoch, |s| s.set_authenticated(optimistic))
        {
            return self.phase();
        }
        info!(username = %cached_user.username, "Restored cached session, validating");

        match self.api.current_user().await {
            Ok(user) => {
                let fresh = user.clone();
                if self
                    .shared
                    .update_if_current(epoch, |s| s.set_authenticated(fresh))
                {
                    self.persist_profile(epoch, &user).await;
                    info!(username = %user.username, "Session validated");
                }
                self.phase()
            }
            Err(e) => {
                warn!(error = %e, "Stored session failed validation, logging out");
                self.discard_session().await;
                AuthPhase::Unauthenticated
            }
        }
    }

    /// Token and cached profile, or None if either is missing or unreadable
    async fn read_persisted(&self) -> Result<Option<UserProfile>, StoreError> {
        let token = self.store.get(ACCESS_TOKEN_KEY).await?;
        let user = self.store.get(USER_KEY).await?;

        let (Some(token), Some(user)) = (token, user) else {
            return Ok(None);
        };
        if token.is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<UserProfile>(&user) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                warn!(error = %e, "Cached profile is unreadable, ignoring it");
                Ok(None)
            }
        }
    }

    fn settle_unauthenticated(&self, epoch: u64) -> AuthPhase {
        self.shared
            .update_if_current(epoch, SessionState::set_unauthenticated);
        self.phase()
    }

    // =========================================================================
    // Login / registration / logout
    // =========================================================================

    /// Log in and publish the session.
    ///
    /// If the profile fetch that follows a successful login fails for any
    /// reason other than 401, a profile holding only the submitted username
    /// is used instead of failing the login.
    pub async fn login(&self, username: &str, password: &str) -> AuthOutcome {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            self.shared.leave_initializing();
            return AuthOutcome::failed("Username and password required");
        }

        self.shared.leave_initializing();
        let epoch = self.shared.epoch();
        let request = LoginRequest::new(username, password);

        let response = match self.api.login(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Login failed");
                return AuthOutcome::failed(login_error_message(&e));
            }
        };

        if response.issued_token().is_none() {
            info!(username, "Login rejected");
            return AuthOutcome::failed(
                response
                    .message
                    .unwrap_or_else(|| "Login failed".to_string()),
            );
        }

        let user = match self.api.current_user().await {
            Ok(user) => user,
            // The token was purged along with the 401
            Err(e) if e.is_unauthorized() => return AuthOutcome::failed(e.user_message()),
            Err(e) => {
                warn!(error = %e, "Profile fetch after login failed, using fallback profile");
                UserProfile::fallback(username)
            }
        };

        let published = user.clone();
        if !self
            .shared
            .update_if_current(epoch, |s| s.set_authenticated(published))
        {
            info!("Logged out while logging in, discarding login");
            if let Err(e) = self.store.clear().await {
                error!(error = %e, "Failed to clear credentials of discarded login");
            }
            return AuthOutcome::failed("Login was cancelled");
        }

        self.persist_profile(epoch, &user).await;
        info!(username = %user.username, "Login successful");
        AuthOutcome::succeeded(response.message)
    }

    /// Create an account. The session is left untouched.
    pub async fn register(&self, request: &RegisterRequest) -> AuthOutcome {
        match self.api.register(request).await {
            Ok(response) => {
                info!(username = %request.username, success = response.success, "Registration answered");
                AuthOutcome {
                    success: response.success,
                    message: response.message,
                }
            }
            Err(e) => {
                error!(error = %e, "Registration failed");
                let message = match &e {
                    ApiError::Http { message, .. } => message.clone(),
                    other => other.user_message(),
                };
                AuthOutcome::failed(message)
            }
        }
    }

    /// End the session: in-memory state first, then the stored credentials.
    pub async fn logout(&self) {
        self.shared.leave_initializing();
        self.shared.invalidate();
        if let Err(e) = self.api.logout().await {
            error!(error = %e, "Failed to clear stored credentials on logout");
        }
        info!("Logged out");
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Re-fetch the current user and refresh the cached profile.
    /// A 401 here ends the session through the expiry interceptor.
    pub async fn refresh_user(&self) -> AuthOutcome {
        if !self.is_authenticated() {
            return AuthOutcome::failed("Not logged in");
        }

        let epoch = self.shared.epoch();
        match self.api.current_user().await {
            Ok(user) => {
                let fresh = user.clone();
                if self
                    .shared
                    .update_if_current(epoch, |s| s.set_authenticated(fresh))
                {
                    self.persist_profile(epoch, &user).await;
                    AuthOutcome::succeeded(None)
                } else {
                    AuthOutcome::failed("Session ended")
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh user");
                AuthOutcome::failed(e.user_message())
            }
        }
    }

    /// Point the avatar at `profile_image_url` and patch the cached profile
    pub async fn update_profile_image(&self, profile_image_url: &str) -> AuthOutcome {
        if !self.is_authenticated() {
            return AuthOutcome::failed("Not logged in");
        }

        let epoch = self.shared.epoch();
        if let Err(e) = self.api.update_profile_image(profile_image_url).await {
            warn!(error = %e, "Failed to update profile image");
            return AuthOutcome::failed(e.user_message());
        }

        let url = profile_image_url.to_string();
        let updated = self.shared.update_if_current(epoch, |s| {
            if let Some(user) = s.user.as_mut() {
                user.profile_image_url = Some(url);
            }
        });
        if updated {
            if let Some(user) = self.current_user() {
                self.persist_profile(epoch, &user).await;
            }
        }
        AuthOutcome::succeeded(None)
    }

    // =========================================================================
    // Persistence helpers
    // =========================================================================

    /// Cache the profile under `user`, undoing the write if the session
    /// ended while it was in flight
    async fn persist_profile(&self, epoch: u64, user: &UserProfile) {
        let json = match serde_json::to_string(user) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize profile");
                return;
            }
        };
        if let Err(e) = self.store.set(USER_KEY, &json).await {
            error!(error = %e, "Failed to cache profile");
            return;
        }
        if self.shared.epoch() != epoch {
            if let Err(e) = self.store.remove(USER_KEY).await {
                warn!(error = %e, "Failed to remove profile cached after logout");
            }
        }
    }

    /// Local-only logout used when restoration fails
    async fn discard_session(&self) {
        self.shared.invalidate();
        if let Err(e) = self.store.clear().await {
            error!(error = %e, "Failed to clear stored credentials");
        }
    }
}

/// Map a login failure to a display message
fn login_error_message(e: &ApiError) -> String {
    match e {
        ApiError::Unauthorized(_) => "Invalid username or password".to_string(),
        ApiError::Http { message, .. } => message.clone(),
        other => other.user_message(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_initializing_and_loading() {
        let shared = SessionShared::new();
        let state = shared.state.borrow().clone();
        assert_eq!(state.phase, AuthPhase::Initializing);
        assert!(state.loading);
        assert!(state.user.is_none());
    }

    #[test]
    fn test_update_discarded_after_invalidate() {
        let shared = SessionShared::new();
        let epoch = shared.epoch();

        shared.invalidate();
        let applied =
            shared.update_if_current(epoch, |s| s.set_authenticated(UserProfile::fallback("kim")));

        assert!(!applied);
        assert_eq!(shared.state.borrow().phase, AuthPhase::Unauthenticated);
    }

    #[test]
    fn test_update_applied_with_current_epoch() {
        let shared = SessionShared::new();
        let epoch = shared.epoch();

        assert!(shared.update_if_current(epoch, |s| s.set_authenticated(UserProfile::fallback("kim"))));
        assert!(shared.state.borrow().is_authenticated());
    }

    #[test]
    fn test_expire_only_acts_on_active_session() {
        let shared = SessionShared::new();
        let before = shared.epoch();
        assert!(!shared.expire());
        assert_eq!(shared.epoch(), before);

        shared.update_if_current(before, |s| s.set_authenticated(UserProfile::fallback("kim")));
        assert!(shared.expire());
        assert_eq!(shared.epoch(), before + 1);
        assert_eq!(shared.state.borrow().phase, AuthPhase::Unauthenticated);
    }

    #[test]
    fn test_subscribers_see_changes() {
        let shared = SessionShared::new();
        let rx = shared.state.subscribe();
        assert!(!rx.has_changed().unwrap());

        shared.invalidate();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow().phase, AuthPhase::Unauthenticated);
    }

    #[test]
    fn test_leave_initializing_clears_loading_once() {
        let shared = SessionShared::new();
        shared.leave_initializing();
        let state = shared.state.borrow().clone();
        assert_eq!(state.phase, AuthPhase::Unauthenticated);
        assert!(!state.loading);

        let epoch = shared.epoch();
        shared.update_if_current(epoch, |s| s.set_authenticated(UserProfile::fallback("kim")));
        shared.leave_initializing();
        assert!(shared.state.borrow().is_authenticated());
    }

    #[test]
    fn test_login_error_message() {
        let unauthorized = ApiError::from_status(StatusCode::UNAUTHORIZED, "");
        assert_eq!(login_error_message(&unauthorized), "Invalid username or password");

        let bad_request = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"message":"Wrong password"}"#,
        );
        assert_eq!(login_error_message(&bad_request), "Wrong password");
    }
}
