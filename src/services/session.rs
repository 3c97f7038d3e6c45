// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session manager: login, logout, refresh and token expiry.
//!
//! This service encapsulates:
//! - The auth state machine (anonymous, authenticating, authenticated,
//!   refreshing, error)
//! - Persisting tokens and the cached user to the token store
//! - Proactive refresh when the access token is within the safety margin
//! - Coalescing of duplicate refresh calls on one instance
//! - Re-hydrating from the store when another instance publishes an event

use crate::config::{Config, MAX_REFRESH_MARGIN};
use crate::error::AuthError;
use crate::models::{CachedUser, Session};
use crate::services::notifier::{new_origin_id, AuthEvent, AuthEventKind, AuthNotifier};
use crate::services::profile::ProfileFetcher;
use crate::services::token;
use crate::services::xrpc::{SessionOutput, XrpcClient, XrpcError};
use crate::store::{self, StoredTokens, TokenStore};
use crate::time_utils::{format_utc_rfc3339, Clock, SystemClock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Default margin before expiry at which we refresh (5 minutes).
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Default period of the background expiry check (5 minutes).
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
    Error,
}

#[derive(Default)]
struct Inner {
    state: AuthState,
    session: Option<Session>,
    last_error: Option<String>,
    last_refresh: Option<Result<Session, AuthError>>,
}

/// Background task handle. The task is aborted when this is dropped.
#[derive(Debug)]
pub struct BackgroundTask(JoinHandle<()>);

impl BackgroundTask {
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Owns one instance's view of the session.
pub struct SessionManager {
    xrpc: XrpcClient,
    profiles: ProfileFetcher,
    store: Arc<dyn TokenStore>,
    notifier: AuthNotifier,
    clock: Arc<dyn Clock>,
    origin_id: String,
    refresh_margin: chrono::Duration,
    check_interval: Duration,
    inner: RwLock<Inner>,
    /// Serializes state transitions on this instance.
    transition: Mutex<()>,
    /// Bumped after every completed refresh.
    refresh_generation: AtomicU64,
    closed: AtomicBool,
}

impl SessionManager {
    /// Create a manager that persists to the notifier's store.
    pub fn new(xrpc: XrpcClient, notifier: AuthNotifier) -> Self {
        Self {
            profiles: ProfileFetcher::new(xrpc.clone()),
            xrpc,
            store: notifier.store().clone(),
            notifier,
            clock: Arc::new(SystemClock),
            origin_id: new_origin_id(),
            refresh_margin: to_chrono(DEFAULT_REFRESH_MARGIN),
            check_interval: DEFAULT_CHECK_INTERVAL,
            inner: RwLock::new(Inner::default()),
            transition: Mutex::new(()),
            refresh_generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a manager with margins and intervals from `config`.
    pub fn from_config(config: &Config, xrpc: XrpcClient, notifier: AuthNotifier) -> Self {
        Self::new(xrpc, notifier)
            .with_refresh_margin(config.refresh_margin)
            .with_check_interval(config.refresh_check_interval)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Margins above [`MAX_REFRESH_MARGIN`] are clamped to it.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = to_chrono(margin.min(MAX_REFRESH_MARGIN));
        self
    }

    /// A zero interval falls back to [`DEFAULT_CHECK_INTERVAL`].
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            tracing::warn!("Zero expiry check interval, using default");
            self.check_interval = DEFAULT_CHECK_INTERVAL;
        } else {
            self.check_interval = interval;
        }
        self
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    pub fn state(&self) -> AuthState {
        self.read().state
    }

    pub fn current_session(&self) -> Option<Session> {
        self.read().session.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().session.is_some()
    }

    /// Message of the most recent failed operation, cleared on success.
    pub fn last_error(&self) -> Option<String> {
        self.read().last_error.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop background tasks from applying further updates.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }

    // ─── Login / Logout ──────────────────────────────────────────────────────

    /// Exchange an identifier (handle or email) and app password for a session.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Session, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            let err = AuthError::InvalidCredentials(
                "Both identifier and password are required".to_string(),
            );
            self.record_failure(&err);
            return Err(err);
        }

        let _guard = self.transition.lock().await;
        self.set_state(AuthState::Authenticating);
        tracing::info!(identifier, "Creating session");

        let output = match self.xrpc.create_session(identifier, password).await {
            Ok(output) => output,
            Err(e) => {
                let err = login_error(e);
                tracing::warn!(identifier, reason = err.reason(), error = %err, "Login failed");
                self.record_failure(&err);
                return Err(err);
            }
        };

        let mut session = session_from_output(output);
        if let Err(err) = self.persist(&session) {
            self.record_failure(&err);
            return Err(err);
        }

        match self
            .profiles
            .fetch(&session.did, Some(&session.access_jwt))
            .await
        {
            Ok(profile) => {
                session.apply_profile(&profile);
                self.persist_cached_user(&session);
            }
            Err(e) => {
                tracing::warn!(did = %session.did, error = %e, "Profile fetch after login failed");
            }
        }

        self.install(session.clone());
        self.notifier.publish(AuthEventKind::Login, &self.origin_id);
        tracing::info!(did = %session.did, handle = %session.handle, "Logged in");

        Ok(session)
    }

    /// Forget the session everywhere. Always clears the stored tokens and
    /// cached user, whatever state we were in.
    pub async fn logout(&self) {
        let _guard = self.transition.lock().await;
        self.clear_locked();
        self.notifier.publish(AuthEventKind::Logout, &self.origin_id);
        tracing::info!("Logged out");
    }

    // ─── Refresh ─────────────────────────────────────────────────────────────

    /// Rotate the token pair. Any failure logs out.
    ///
    /// Calls that arrive while a refresh is in flight wait for it and share
    /// its result instead of issuing another request.
    pub async fn refresh(&self) -> Result<Session, AuthError> {
        let seen = self.refresh_generation.load(Ordering::Acquire);
        let _guard = self.transition.lock().await;

        if self.refresh_generation.load(Ordering::Acquire) != seen {
            if let Some(outcome) = self.read().last_refresh.clone() {
                tracing::debug!("Joined result of concurrent refresh");
                return outcome;
            }
        }

        let outcome = self.refresh_locked().await;
        self.write().last_refresh = Some(outcome.clone());
        self.refresh_generation.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    async fn refresh_locked(&self) -> Result<Session, AuthError> {
        let previous = self.current_session();
        let refresh_jwt = previous
            .as_ref()
            .map(|s| s.refresh_jwt.clone())
            .or_else(|| store::load_tokens(&*self.store).map(|t| t.refresh_jwt));

        let Some(refresh_jwt) = refresh_jwt else {
            let err = AuthError::InvalidRefreshToken("No refresh token available".to_string());
            self.fail_refresh(&err);
            return Err(err);
        };

        self.set_state(AuthState::Refreshing);

        let output = match self.xrpc.refresh_session(&refresh_jwt).await {
            Ok(output) => output,
            Err(e) => {
                let err = refresh_error(e);
                tracing::warn!(reason = err.reason(), error = %err, "Session refresh failed, logging out");
                self.fail_refresh(&err);
                return Err(err);
            }
        };

        let mut session = session_from_output(output);
        match (&previous, store::load_cached_user(&*self.store)) {
            (Some(prev), _) if prev.did == session.did => {
                session.display_name = prev.display_name.clone();
                session.avatar = prev.avatar.clone();
            }
            (_, Some(cached)) if cached.did == session.did => {
                session.display_name = cached.display_name;
                session.avatar = cached.avatar;
            }
            _ => {}
        }

        if let Err(err) = self.persist(&session) {
            self.fail_refresh(&err);
            return Err(err);
        }

        self.install(session.clone());
        self.notifier.publish(AuthEventKind::Refresh, &self.origin_id);
        let expires_at = session.expires_at.map(format_utc_rfc3339).unwrap_or_default();
        tracing::info!(did = %session.did, expires_at = %expires_at, "Session refreshed");

        Ok(session)
    }

    /// Current access token, refreshed first if it is about to expire.
    /// `Ok(None)` when nobody is logged in.
    pub async fn valid_access_token(&self) -> Result<Option<String>, AuthError> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };

        if !self.is_expiring(&session.access_jwt) {
            return Ok(Some(session.access_jwt));
        }

        tracing::info!(did = %session.did, "Access token expiring, refreshing before use");
        self.refresh().await.map(|s| Some(s.access_jwt))
    }

    /// One tick of the expiry watch. Returns whether a refresh happened.
    pub async fn check_expiry(&self) -> Result<bool, AuthError> {
        let Some(session) = self.current_session() else {
            return Ok(false);
        };
        if !self.is_expiring(&session.access_jwt) {
            return Ok(false);
        }

        tracing::info!(did = %session.did, "Access token within refresh margin, refreshing");
        self.refresh().await.map(|_| true)
    }

    fn is_expiring(&self, access_jwt: &str) -> bool {
        token::is_token_expired(access_jwt, self.clock.now(), self.refresh_margin)
    }

    // ─── Restore ─────────────────────────────────────────────────────────────

    /// Re-hydrate from the token store, e.g. at startup.
    ///
    /// A still-valid access token is adopted (and the profile refreshed in
    /// the background of this call, best-effort); an expired one is
    /// refreshed, and a failed refresh logs out.
    pub async fn restore(&self) -> Result<Option<Session>, AuthError> {
        let Some(tokens) = store::load_tokens(&*self.store) else {
            if store::load_cached_user(&*self.store).is_some() {
                tracing::debug!("Cached user present without tokens, staying anonymous");
            }
            return Ok(None);
        };

        if self.is_expiring(&tokens.access_jwt) {
            tracing::info!("Stored access token expired, refreshing");
            return self.refresh().await.map(Some);
        }

        let Some(mut session) = self.session_from_tokens(tokens) else {
            tracing::warn!("Stored access token has no subject, refreshing");
            return self.refresh().await.map(Some);
        };

        {
            let _guard = self.transition.lock().await;
            self.install(session.clone());
        }
        tracing::info!(did = %session.did, "Session restored from store");

        match self
            .profiles
            .fetch(&session.did, Some(&session.access_jwt))
            .await
        {
            Ok(profile) => {
                session.apply_profile(&profile);
                self.update_profile_fields(&session);
            }
            Err(e) => tracing::warn!(did = %session.did, error = %e, "Profile refresh failed"),
        }

        Ok(Some(session))
    }

    // ─── Cross-instance events ───────────────────────────────────────────────

    /// Apply an event published by another instance. Events from this
    /// instance are ignored.
    pub async fn apply_remote_event(&self, event: &AuthEvent) {
        if event.origin_id == self.origin_id || self.is_closed() {
            return;
        }

        let _guard = self.transition.lock().await;
        match event.kind {
            AuthEventKind::Login | AuthEventKind::Refresh => {
                let restored = store::load_tokens(&*self.store)
                    .and_then(|tokens| self.session_from_tokens(tokens));
                match restored {
                    Some(session) => {
                        tracing::debug!(
                            origin_id = %event.origin_id,
                            kind = ?event.kind,
                            did = %session.did,
                            "Adopting session from another instance"
                        );
                        self.install(session);
                    }
                    None => tracing::debug!(
                        origin_id = %event.origin_id,
                        "Auth event without usable stored tokens"
                    ),
                }
            }
            AuthEventKind::Logout => {
                // The origin already cleared the store; re-emitting would bounce.
                let mut inner = self.write();
                inner.session = None;
                inner.state = AuthState::Anonymous;
                inner.last_error = None;
                tracing::debug!(origin_id = %event.origin_id, "Logged out by another instance");
            }
        }
    }

    /// Apply notifier events until the manager is dropped or shut down.
    pub fn spawn_event_listener(self: &Arc<Self>) -> BackgroundTask {
        let weak = Arc::downgrade(self);
        let mut rx = self.notifier.subscribe();

        BackgroundTask(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(manager) = weak.upgrade() else { break };
                        if manager.is_closed() {
                            break;
                        }
                        manager.apply_remote_event(&event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }

    /// Check expiry immediately and then every `check_interval`.
    pub fn spawn_expiry_watch(self: &Arc<Self>) -> BackgroundTask {
        let weak = Arc::downgrade(self);
        let period = self.check_interval;

        BackgroundTask(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else { break };
                if manager.is_closed() {
                    break;
                }
                if let Err(e) = manager.check_expiry().await {
                    tracing::error!(error = %e, "Automatic token refresh failed");
                }
            }
        }))
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: AuthState) {
        self.write().state = state;
    }

    fn install(&self, session: Session) {
        let mut inner = self.write();
        inner.session = Some(session);
        inner.state = AuthState::Authenticated;
        inner.last_error = None;
    }

    /// Surface `err`, then settle back to the state the session implies.
    /// `Error` is only observable while the transition lock is held.
    fn record_failure(&self, err: &AuthError) {
        self.set_state(AuthState::Error);
        let mut inner = self.write();
        inner.last_error = Some(err.to_string());
        inner.state = if inner.session.is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        };
    }

    fn fail_refresh(&self, err: &AuthError) {
        self.clear_locked();
        self.write().last_error = Some(err.to_string());
        self.notifier.publish(AuthEventKind::Logout, &self.origin_id);
    }

    /// Clear store and memory. Caller holds the transition lock.
    fn clear_locked(&self) {
        if let Err(e) = store::clear_session(&*self.store) {
            tracing::error!(error = %e, "Failed to clear stored session");
        }
        let mut inner = self.write();
        inner.session = None;
        inner.state = AuthState::Anonymous;
        inner.last_error = None;
    }

    fn persist(&self, session: &Session) -> Result<(), AuthError> {
        store::save_tokens(&*self.store, &session.access_jwt, &session.refresh_jwt)
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        self.persist_cached_user(session);
        Ok(())
    }

    fn persist_cached_user(&self, session: &Session) {
        if let Err(e) = store::save_cached_user(&*self.store, &CachedUser::from(session)) {
            tracing::warn!(error = %e, "Failed to store cached user");
        }
    }

    fn update_profile_fields(&self, session: &Session) {
        let mut inner = self.write();
        if let Some(current) = inner.session.as_mut().filter(|s| s.did == session.did) {
            current.handle = session.handle.clone();
            current.display_name = session.display_name.clone();
            current.avatar = session.avatar.clone();
            drop(inner);
            self.persist_cached_user(session);
        }
    }

    /// Build a session from stored tokens plus the cached user blob.
    fn session_from_tokens(&self, tokens: StoredTokens) -> Option<Session> {
        let claims = token::decode_claims(&tokens.access_jwt).ok();
        let cached = store::load_cached_user(&*self.store);

        let did = claims
            .as_ref()
            .and_then(|c| c.sub.clone())
            .filter(|sub| sub.starts_with("did:"))
            .or_else(|| cached.as_ref().map(|u| u.did.clone()))?;

        let mut session = Session {
            handle: did.clone(),
            did,
            display_name: None,
            avatar: None,
            expires_at: token::expires_at(&tokens.access_jwt),
            access_jwt: tokens.access_jwt,
            refresh_jwt: tokens.refresh_jwt,
        };
        if let Some(cached) = &cached {
            session.apply_cached(cached);
        }
        Some(session)
    }
}

fn session_from_output(output: SessionOutput) -> Session {
    Session {
        expires_at: token::expires_at(&output.access_jwt),
        did: output.did,
        handle: output.handle,
        display_name: None,
        avatar: None,
        access_jwt: output.access_jwt,
        refresh_jwt: output.refresh_jwt,
    }
}

/// Map a `createSession` failure.
fn login_error(err: XrpcError) -> AuthError {
    match err {
        XrpcError::Transport(msg) => AuthError::Network(msg),
        XrpcError::Decode(msg) => AuthError::Parse(crate::error::ParseError::Response(msg)),
        XrpcError::Status { status: 429, .. } => AuthError::RateLimited,
        XrpcError::Status {
            status: 400,
            error,
            message,
        } => AuthError::InvalidCredentials(match error.as_deref() {
            Some("InvalidPassword") => "Invalid password. Please check your app password.".to_string(),
            Some("InvalidIdentifier") => {
                "Invalid identifier. Please check your handle or email.".to_string()
            }
            _ => message,
        }),
        XrpcError::Status { status: 401, .. } => AuthError::InvalidCredentials(
            "Authentication failed. Please check your credentials.".to_string(),
        ),
        XrpcError::Status {
            status, message, ..
        } => AuthError::Server { status, message },
    }
}

/// Map a `refreshSession` failure.
fn refresh_error(err: XrpcError) -> AuthError {
    match err {
        XrpcError::Transport(msg) => AuthError::Network(msg),
        XrpcError::Decode(msg) => AuthError::Parse(crate::error::ParseError::Response(msg)),
        XrpcError::Status { message, .. } => AuthError::InvalidRefreshToken(message),
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}
