//! Authentication/session provider seam.

use std::sync::{PoisonError, RwLock};

/// Who is logged in, as far as the engine needs to know.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<String>;

    /// Whether remote calls can be attempted for the current user.
    fn is_authenticated(&self) -> bool;
}

#[derive(Debug, Default)]
struct AuthState {
    user: Option<String>,
    authenticated: bool,
}

/// Settable provider for front ends that manage login themselves.
#[derive(Debug, Default)]
pub struct StaticAuth {
    state: RwLock<AuthState>,
}

impl StaticAuth {
    /// Logged in with backend credentials.
    pub fn authenticated(user: impl Into<String>) -> Self {
        let auth = Self::default();
        auth.sign_in(user, true);
        auth
    }

    /// A known user without credentials; state is kept locally only.
    pub fn offline(user: impl Into<String>) -> Self {
        let auth = Self::default();
        auth.sign_in(user, false);
        auth
    }

    pub fn sign_in(&self, user: impl Into<String>, authenticated: bool) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.user = Some(user.into());
        state.authenticated = authenticated;
    }

    pub fn sign_out(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = AuthState::default();
    }
}

impl AuthProvider for StaticAuth {
    fn current_user(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user
            .clone()
    }

    fn is_authenticated(&self) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.authenticated && state.user.is_some()
    }
}
