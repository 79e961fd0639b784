//! Authentication lifecycle for the parent account.
//!
//! Every operation clears `last_error` first, raises `is_loading` while it
//! awaits the provider, and reports failure through `last_error` instead of
//! returning it. `is_signed_in` only turns on after the provider has confirmed
//! a current user.

use crate::error::ProviderError;
use crate::provider::{AuthProvider, OtpPurpose};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Where the session sits in the sign-up / sign-in flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Unknown,
    SignedOut,
    AwaitingVerification,
    SignedIn,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionState {
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub verification_code: String,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub is_verified: bool,
    pub is_signed_in: bool,
    #[serde(default)]
    checked: bool,
    #[serde(default)]
    awaiting_verification: bool,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        if self.is_signed_in {
            SessionPhase::SignedIn
        } else if self.awaiting_verification {
            SessionPhase::AwaitingVerification
        } else if self.checked {
            SessionPhase::SignedOut
        } else {
            SessionPhase::Unknown
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<SessionState>>,
    auth: Arc<dyn AuthProvider>,
    gate: Arc<Mutex<()>>,
}

/// Lowers `is_loading` when the operation finishes or its future is dropped.
struct LoadingGuard<'a> {
    inner: &'a RwLock<SessionState>,
}

impl<'a> LoadingGuard<'a> {
    fn raise(inner: &'a RwLock<SessionState>) -> Self {
        {
            let mut state = inner.write();
            state.last_error = None;
            state.is_loading = true;
        }
        Self { inner }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.inner.write().is_loading = false;
    }
}

impl SessionStore {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState::default())),
            auth,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.read().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.read().phase()
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.read().is_signed_in
    }

    pub fn is_loading(&self) -> bool {
        self.inner.read().is_loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    pub fn set_email(&self, email: impl Into<String>) {
        self.inner.write().email = email.into();
    }

    pub fn set_password(&self, password: impl Into<String>) {
        self.inner.write().password = password.into();
    }

    pub fn set_verification_code(&self, code: impl Into<String>) {
        self.inner.write().verification_code = code.into();
    }

    pub fn clear_error(&self) {
        self.inner.write().last_error = None;
    }

    /// Recover an existing remote session on start-up. A missing session is
    /// not an error.
    pub async fn bootstrap(&self) {
        let _turn = self.gate.lock().await;
        let _loading = LoadingGuard::raise(&self.inner);
        let signed_in = match self.auth.current_user().await {
            Ok(user) => {
                info!(user_id = %user.id, "restored existing session");
                true
            }
            Err(err) => {
                tracing::debug!(%err, "no session to restore");
                false
            }
        };
        let mut state = self.inner.write();
        state.is_signed_in = signed_in;
        state.checked = true;
    }

    pub async fn sign_up(&self) {
        let _turn = self.gate.lock().await;
        let _loading = LoadingGuard::raise(&self.inner);
        let (email, password) = self.credentials();
        match self.auth.sign_up(&email, &password).await {
            Ok(()) => {
                info!(%email, "account created, awaiting verification code");
                let mut state = self.inner.write();
                state.is_verified = false;
                state.awaiting_verification = true;
                state.checked = true;
            }
            Err(err) => self.fail("sign up", &err),
        }
    }

    pub async fn verify_code(&self, code: impl Into<String>) {
        let code = code.into();
        let _turn = self.gate.lock().await;
        let _loading = LoadingGuard::raise(&self.inner);
        let email = {
            let mut state = self.inner.write();
            state.verification_code = code.clone();
            state.email.clone()
        };

        let result = match self
            .auth
            .verify_one_time_code(&email, &code, OtpPurpose::Signup)
            .await
        {
            Ok(()) => {
                {
                    let mut state = self.inner.write();
                    state.is_verified = true;
                    state.awaiting_verification = false;
                }
                self.auth.current_user().await.map(|_| ())
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                info!(%email, "email verified and session established");
                self.inner.write().is_signed_in = true;
            }
            Err(err) => {
                self.fail("verify code", &err);
                self.inner.write().is_signed_in = false;
            }
        }
    }

    pub async fn sign_in(&self) {
        let _turn = self.gate.lock().await;
        let _loading = LoadingGuard::raise(&self.inner);
        let (email, password) = self.credentials();
        let result = match self.auth.sign_in(&email, &password).await {
            Ok(()) => self.auth.current_user().await.map(|_| ()),
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => {
                info!(%email, "signed in");
                let mut state = self.inner.write();
                state.is_signed_in = true;
                state.awaiting_verification = false;
                state.checked = true;
            }
            Err(err) => {
                self.fail("sign in", &err);
                self.inner.write().is_signed_in = false;
            }
        }
    }

    pub async fn sign_out(&self) {
        let _turn = self.gate.lock().await;
        let _loading = LoadingGuard::raise(&self.inner);
        match self.auth.sign_out().await {
            Ok(()) => {
                info!("signed out");
                let mut state = self.inner.write();
                state.is_signed_in = false;
                state.is_verified = false;
                state.awaiting_verification = false;
                state.verification_code.clear();
                state.password.clear();
                state.checked = true;
            }
            Err(err) => self.fail("sign out", &err),
        }
    }

    fn credentials(&self) -> (String, String) {
        let state = self.inner.read();
        (state.email.clone(), state.password.clone())
    }

    fn fail(&self, operation: &str, err: &ProviderError) {
        warn!(operation, kind = ?err.kind(), %err, "session operation failed");
        self.inner.write().last_error = Some(err.user_message());
    }
}
