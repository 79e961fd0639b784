mod repository_tests;
mod session_tests;

use allowance_core::{AppContext, InMemoryBackend};

pub(crate) const EMAIL: &str = "parent@example.com";
pub(crate) const PASSWORD: &str = "Secret123!";
pub(crate) const CODE: &str = "482913";

pub(crate) fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

pub(crate) fn fresh_context() -> (AppContext, InMemoryBackend) {
    let backend = InMemoryBackend::new().with_signup_code(CODE);
    (AppContext::in_memory(backend.clone()), backend)
}

/// Sign up and verify the default parent so data calls are authorised.
pub(crate) async fn signed_in_context() -> (AppContext, InMemoryBackend) {
    let (ctx, backend) = fresh_context();
    ctx.session.set_email(EMAIL);
    ctx.session.set_password(PASSWORD);
    ctx.session.sign_up().await;
    ctx.session.verify_code(CODE).await;
    assert!(ctx.session.is_signed_in(), "{:?}", ctx.session.last_error());
    (ctx, backend)
}
