use super::{fresh_context, signed_in_context, test_runtime, CODE, EMAIL, PASSWORD};
use allowance_core::{AuthProvider, OtpPurpose, ProviderResult, SessionPhase, SessionStore, User};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Auth provider whose `sign_in` parks until the test releases it.
#[derive(Default)]
struct HeldAuth {
    release: Notify,
    calls: Mutex<Vec<&'static str>>,
}

#[async_trait]
impl AuthProvider for HeldAuth {
    async fn sign_up(&self, _email: &str, _password: &str) -> ProviderResult<()> {
        Ok(())
    }

    async fn verify_one_time_code(
        &self,
        _email: &str,
        _code: &str,
        _purpose: OtpPurpose,
    ) -> ProviderResult<()> {
        Ok(())
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> ProviderResult<()> {
        self.calls.lock().push("enter");
        self.release.notified().await;
        self.calls.lock().push("exit");
        Ok(())
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        Ok(())
    }

    async fn current_user(&self) -> ProviderResult<User> {
        Ok(User {
            id: Uuid::nil(),
            email: Some(EMAIL.into()),
        })
    }
}

#[test]
fn sign_up_waits_for_the_emailed_code() {
    let runtime = test_runtime();
    let (ctx, backend) = fresh_context();
    ctx.session.set_email(EMAIL);
    ctx.session.set_password(PASSWORD);

    runtime.block_on(ctx.session.sign_up());

    let state = ctx.session.snapshot();
    assert!(!state.is_signed_in);
    assert!(!state.is_verified);
    assert!(!state.is_loading);
    assert_eq!(state.last_error, None);
    assert_eq!(state.phase(), SessionPhase::AwaitingVerification);
    assert_eq!(backend.outbox(EMAIL).as_deref(), Some(CODE));
}

#[test]
fn correct_code_verifies_and_signs_in() {
    let runtime = test_runtime();
    let (ctx, backend) = runtime.block_on(signed_in_context());

    let state = ctx.session.snapshot();
    assert!(state.is_verified);
    assert!(state.is_signed_in);
    assert_eq!(state.verification_code, CODE);
    assert_eq!(state.phase(), SessionPhase::SignedIn);
    assert_eq!(backend.outbox(EMAIL), None);
}

#[test]
fn wrong_code_reports_an_error_and_stays_signed_out() {
    let runtime = test_runtime();
    let (ctx, _backend) = fresh_context();
    ctx.session.set_email(EMAIL);
    ctx.session.set_password(PASSWORD);
    runtime.block_on(ctx.session.sign_up());

    runtime.block_on(ctx.session.verify_code("000000"));

    let state = ctx.session.snapshot();
    assert!(!state.is_signed_in);
    assert!(!state.is_verified);
    assert_eq!(
        state.last_error.as_deref(),
        Some("Token has expired or is invalid")
    );
}

#[test]
fn short_password_is_rejected_at_sign_up() {
    let runtime = test_runtime();
    let (ctx, _backend) = fresh_context();
    ctx.session.set_email(EMAIL);
    ctx.session.set_password("abc");

    runtime.block_on(ctx.session.sign_up());

    let error = ctx.session.last_error().expect("error");
    assert!(error.contains("at least 6 characters"), "{error}");
    assert_ne!(ctx.session.phase(), SessionPhase::AwaitingVerification);
}

#[test]
fn unverified_account_cannot_sign_in() {
    let runtime = test_runtime();
    let (ctx, _backend) = fresh_context();
    ctx.session.set_email(EMAIL);
    ctx.session.set_password(PASSWORD);
    runtime.block_on(ctx.session.sign_up());

    runtime.block_on(ctx.session.sign_in());

    assert!(!ctx.session.is_signed_in());
    assert_eq!(ctx.session.last_error().as_deref(), Some("Email not confirmed"));
}

#[test]
fn sign_out_clears_secrets_but_keeps_the_email() {
    let runtime = test_runtime();
    let (ctx, _backend) = runtime.block_on(signed_in_context());

    runtime.block_on(ctx.session.sign_out());

    let state = ctx.session.snapshot();
    assert!(!state.is_signed_in);
    assert!(!state.is_verified);
    assert!(state.password.is_empty());
    assert!(state.verification_code.is_empty());
    assert_eq!(state.email, EMAIL);
    assert_eq!(state.phase(), SessionPhase::SignedOut);
}

#[test]
fn sign_in_after_sign_out_restores_the_session() {
    let runtime = test_runtime();
    let (ctx, _backend) = runtime.block_on(signed_in_context());
    runtime.block_on(ctx.session.sign_out());

    ctx.session.set_password(PASSWORD);
    runtime.block_on(ctx.session.sign_in());

    assert!(ctx.session.is_signed_in());
    assert_eq!(ctx.session.last_error(), None);
}

#[test]
fn bootstrap_without_a_session_is_quiet() {
    let runtime = test_runtime();
    let (ctx, _backend) = fresh_context();
    assert_eq!(ctx.session.phase(), SessionPhase::Unknown);

    runtime.block_on(ctx.session.bootstrap());

    assert!(!ctx.session.is_signed_in());
    assert!(!ctx.session.is_loading());
    assert_eq!(ctx.session.last_error(), None);
    assert_eq!(ctx.session.phase(), SessionPhase::SignedOut);
}

#[test]
fn failed_sign_out_leaves_the_session_flags_alone() {
    let runtime = test_runtime();
    let (ctx, backend) = runtime.block_on(signed_in_context());
    backend.set_offline(true);

    runtime.block_on(ctx.session.sign_out());

    let state = ctx.session.snapshot();
    assert!(state.is_signed_in);
    assert!(state.is_verified);
    assert!(state.last_error.is_some());
}

#[test]
fn operations_run_one_at_a_time_and_show_loading() {
    let runtime = test_runtime();
    let auth = Arc::new(HeldAuth::default());
    let store = SessionStore::new(auth.clone());
    store.set_email(EMAIL);
    store.set_password(PASSWORD);

    runtime.block_on(async {
        let observer = async {
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
            assert!(store.is_loading());
            assert_eq!(*auth.calls.lock(), ["enter"]);
            auth.release.notify_one();

            while auth.calls.lock().len() < 3 {
                tokio::task::yield_now().await;
            }
            assert!(store.is_loading());
            auth.release.notify_one();
        };
        tokio::join!(store.sign_in(), store.sign_in(), observer);
    });

    assert_eq!(*auth.calls.lock(), ["enter", "exit", "enter", "exit"]);
    assert!(!store.is_loading());
    assert!(store.is_signed_in());
    assert_eq!(store.last_error(), None);
}
