//! Session context shared by every gateway call.
//!
//! One context is created by the application root and handed to the
//! [`ApiClient`](crate::ApiClient). It owns the session fields, their durable
//! mirror, and the redirect guard that keeps expiry handling single-flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use monitor_core::{
    is_login_location, login_redirect_url, Session, TOKEN_KEY, USERNAME_KEY,
};
use monitor_logging::{monitor_debug, monitor_info, monitor_warn};

use crate::store::{KeyValueStore, StoreError};

/// Where the user currently is, and how to send them elsewhere.
pub trait Navigator: Send + Sync {
    /// Current path plus query, e.g. `/jobs/123?tab=metrics`.
    fn current_location(&self) -> String;
    fn navigate(&self, target: &str);
}

/// In-process navigator that records every navigation.
#[derive(Debug)]
pub struct HistoryNavigator {
    inner: Mutex<NavigatorState>,
}

#[derive(Debug)]
struct NavigatorState {
    location: String,
    history: Vec<String>,
}

impl HistoryNavigator {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(NavigatorState {
                location: location.into(),
                history: Vec::new(),
            }),
        }
    }

    /// Navigations performed so far, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    /// Move without recording, as a user clicking around would.
    pub fn set_location(&self, location: impl Into<String>) {
        self.lock().location = location.into();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NavigatorState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HistoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for HistoryNavigator {
    fn current_location(&self) -> String {
        self.lock().location.clone()
    }

    fn navigate(&self, target: &str) {
        let mut state = self.lock();
        state.location = target.to_string();
        state.history.push(target.to_string());
    }
}

/// What a server-side 401 meant for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The request was made under a token that has since been replaced.
    Stale,
    /// The active session is gone; `redirected` is true for the one call that navigated.
    Expired { redirected: bool },
}

pub struct SessionContext {
    durable: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    session: Mutex<Session>,
    redirecting_to_login: AtomicBool,
}

impl SessionContext {
    /// Build a context and restore any session found in durable storage.
    pub fn new(durable: Arc<dyn KeyValueStore>, navigator: Arc<dyn Navigator>) -> Self {
        let context = Self {
            durable,
            navigator,
            session: Mutex::new(Session::new()),
            redirecting_to_login: AtomicBool::new(false),
        };
        context.initialize();
        context
    }

    /// Reload the in-memory session from durable storage.
    pub fn initialize(&self) {
        let restored = Session::restore(
            self.durable.get(TOKEN_KEY),
            self.durable.get(USERNAME_KEY),
        );
        if restored.is_authenticated() {
            monitor_debug!("Restored session for {:?}", restored.username());
        }
        *self.lock_session() = restored;
    }

    pub fn session(&self) -> Session {
        self.lock_session().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock_session().is_authenticated()
    }

    /// Token as currently persisted; this is what outbound requests capture.
    pub fn stored_token(&self) -> Option<String> {
        self.durable.get(TOKEN_KEY)
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn is_redirecting_to_login(&self) -> bool {
        self.redirecting_to_login.load(Ordering::Acquire)
    }

    /// Record a successful login and re-arm the redirect guard.
    pub fn establish(&self, token: &str, username: &str) -> Result<(), StoreError> {
        self.durable.set(TOKEN_KEY, token)?;
        self.durable.set(USERNAME_KEY, username)?;
        *self.lock_session() = Session::authenticated(token, username);
        self.redirecting_to_login.store(false, Ordering::Release);
        monitor_info!("Signed in as {}", username);
        Ok(())
    }

    /// Drop the session on explicit user request. No navigation happens.
    pub fn logout(&self) -> Result<(), StoreError> {
        let cleared = self.clear_durable();
        self.lock_session().clear();
        monitor_info!("Signed out");
        cleared
    }

    /// Handle a 401 for a request that captured `request_token` when it was sent.
    pub(crate) fn expire(&self, request_token: Option<&str>) -> Expiry {
        let current = self.stored_token();
        if let Some(current) = current.as_deref() {
            if Some(current) != request_token {
                monitor_info!("Ignoring 401 for a request made under a previous session");
                return Expiry::Stale;
            }
            if let Err(err) = self.clear_durable() {
                monitor_warn!("Failed to clear expired session: {}", err);
            }
        }
        // With nothing stored, a sibling request already tore the session down.
        self.lock_session().clear();

        let location = self.navigator.current_location();
        if is_login_location(&location) {
            return Expiry::Expired { redirected: false };
        }
        if self
            .redirecting_to_login
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Expiry::Expired { redirected: false };
        }

        let target = login_redirect_url(&location);
        monitor_info!("Session expired, redirecting to {}", target);
        self.navigator.navigate(&target);
        Expiry::Expired { redirected: true }
    }

    fn clear_durable(&self) -> Result<(), StoreError> {
        let token = self.durable.remove(TOKEN_KEY);
        let username = self.durable.remove(USERNAME_KEY);
        token.and(username)
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
