use super::{fresh_context, signed_in_context, test_runtime, CODE, EMAIL, PASSWORD};
use allowance_core::model::{PROFILES_RELATION, TASKS_RELATION};
use allowance_core::provider::{Filter, Order};
use allowance_core::{
    AppContext, AvatarImage, BlobStorage, DataProvider, InMemoryBackend, NewProfile, NewTask,
    ProviderError, ProviderResult,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Notify;
use url::Url;
use uuid::Uuid;

/// Storage whose upload drops the connection on the way out.
struct DroppedUpload {
    backend: InMemoryBackend,
}

#[async_trait]
impl BlobStorage for DroppedUpload {
    async fn upload(
        &self,
        _bucket: &str,
        _path: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
        _upsert: bool,
    ) -> ProviderResult<()> {
        self.backend.set_offline(true);
        Err(ProviderError::storage("connection reset"))
    }

    fn public_url(&self, bucket: &str, path: &str) -> Url {
        self.backend.public_url(bucket, path)
    }
}

/// Data provider whose `select` parks until the test releases it.
struct HeldSelect {
    backend: InMemoryBackend,
    release: Notify,
    calls: Mutex<Vec<&'static str>>,
}

#[async_trait]
impl DataProvider for HeldSelect {
    async fn select(
        &self,
        relation: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> ProviderResult<Vec<Value>> {
        self.calls.lock().push("enter");
        self.release.notified().await;
        self.calls.lock().push("exit");
        self.backend.select(relation, filters, order).await
    }

    async fn insert(&self, relation: &str, row: Value) -> ProviderResult<Vec<Value>> {
        self.backend.insert(relation, row).await
    }

    async fn update(
        &self,
        relation: &str,
        changes: Value,
        filters: &[Filter],
    ) -> ProviderResult<Vec<Value>> {
        self.backend.update(relation, changes, filters).await
    }

    async fn delete(&self, relation: &str, filters: &[Filter]) -> ProviderResult<()> {
        self.backend.delete(relation, filters).await
    }
}

async fn sign_in_parent(ctx: &AppContext) {
    ctx.session.set_email(EMAIL);
    ctx.session.set_password(PASSWORD);
    ctx.session.sign_up().await;
    ctx.session.verify_code(CODE).await;
    assert!(ctx.session.is_signed_in(), "{:?}", ctx.session.last_error());
}

#[test]
fn loading_twice_yields_the_same_list() {
    let runtime = test_runtime();
    let (ctx, _backend) = runtime.block_on(signed_in_context());
    runtime.block_on(async {
        ctx.profiles.add(NewProfile::new("Mia")).await;
        ctx.profiles.add(NewProfile::new("Leo")).await;
        ctx.profiles.load().await;
        let first = ctx.profiles.profiles();
        ctx.profiles.load().await;
        assert_eq!(first, ctx.profiles.profiles());
    });

    let names: Vec<_> = ctx
        .profiles
        .profiles()
        .into_iter()
        .map(|profile| profile.name)
        .collect();
    assert_eq!(names, ["Mia", "Leo"]);
}

#[test]
fn loading_while_signed_out_reports_the_missing_session() {
    let runtime = test_runtime();
    let (ctx, _backend) = fresh_context();

    runtime.block_on(ctx.profiles.load());

    let state = ctx.profiles.snapshot();
    assert!(state.items.is_empty());
    assert!(!state.is_loading);
    assert_eq!(state.last_error.as_deref(), Some("Auth session missing!"));
}

#[test]
fn profile_rows_belong_to_the_signed_in_parent() {
    let runtime = test_runtime();
    let (ctx, _backend) = runtime.block_on(signed_in_context());
    let birthdate = NaiveDate::from_ymd_opt(2016, 4, 2).expect("date");

    runtime.block_on(ctx.profiles.add(NewProfile::new("Mia").born(birthdate)));

    let profiles = ctx.profiles.profiles();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].birthdate, Some(birthdate));
    assert!(profiles[0].created_at.is_some());
    assert_eq!(profiles[0].avatar_url, None);
    assert!(ctx.profiles.public_url(&profiles[0]).is_none());
}

#[test]
fn avatar_is_stored_under_the_owner_folder() {
    let runtime = test_runtime();
    let (ctx, backend) = runtime.block_on(signed_in_context());
    let photo = AvatarImage::jpeg(vec![0xFF, 0xD8, 0xFF]);

    runtime.block_on(ctx.profiles.add(NewProfile::new("Mia").with_avatar(photo)));

    assert_eq!(ctx.profiles.snapshot().last_error, None);
    let profile = ctx.profiles.profiles().remove(0);
    let path = profile.avatar_url.clone().expect("avatar path");
    assert_eq!(path, format!("{}/{}.jpg", profile.parent_user_id, profile.id));
    let (content_type, bytes) = backend.object("avatars", &path).expect("object");
    assert_eq!(content_type, "image/jpeg");
    assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);
    let url = ctx.profiles.public_url(&profile).expect("public url");
    assert!(url.as_str().ends_with(&path), "{url}");
}

#[test]
fn failed_avatar_upload_keeps_the_profile() {
    let runtime = test_runtime();
    let (ctx, backend) = runtime.block_on(signed_in_context());
    backend.remove_bucket("avatars");
    let photo = AvatarImage::jpeg(vec![1, 2, 3]);

    runtime.block_on(ctx.profiles.add(NewProfile::new("Mia").with_avatar(photo)));

    let state = ctx.profiles.snapshot();
    assert_eq!(state.items.len(), 1);
    assert_eq!(state.items[0].name, "Mia");
    assert_eq!(state.items[0].avatar_url, None);
    assert_eq!(
        state.last_error.as_deref(),
        Some("Profile saved, but photo upload failed: Bucket not found")
    );
    assert_eq!(backend.row_count(PROFILES_RELATION), 1);
}

#[test]
fn editing_a_profile_reloads_the_list() {
    let runtime = test_runtime();
    let (ctx, _backend) = runtime.block_on(signed_in_context());
    runtime.block_on(ctx.profiles.add(NewProfile::new("Mia")));
    let mut profile = ctx.profiles.profiles().remove(0);
    profile.name = "Amelia".into();

    runtime.block_on(ctx.profiles.update(&profile));

    assert_eq!(ctx.profiles.snapshot().last_error, None);
    assert_eq!(ctx.profiles.profiles()[0].name, "Amelia");
}

#[test]
fn updating_a_missing_profile_is_a_data_error() {
    let runtime = test_runtime();
    let (ctx, _backend) = runtime.block_on(signed_in_context());
    runtime.block_on(ctx.profiles.add(NewProfile::new("Mia")));
    let mut ghost = ctx.profiles.profiles().remove(0);
    ghost.id = Uuid::new_v4();

    runtime.block_on(ctx.profiles.update(&ghost));

    let error = ctx.profiles.snapshot().last_error.expect("error");
    assert!(error.starts_with("Couldn't reach your family data"), "{error}");
    assert_eq!(ctx.profiles.profiles()[0].name, "Mia");
}

#[test]
fn completing_a_task_stamps_and_clears_completion_time() {
    let runtime = test_runtime();
    let (ctx, _backend) = runtime.block_on(signed_in_context());
    runtime.block_on(ctx.tasks.add(NewTask::new("Feed the cat", 3)));
    let id = ctx.tasks.tasks()[0].id;

    runtime.block_on(ctx.tasks.set_completed(id, true));
    let done = ctx.tasks.tasks().remove(0);
    assert!(done.is_completed);
    assert!(done.completed_at.is_some());

    runtime.block_on(ctx.tasks.set_completed(id, false));
    let undone = ctx.tasks.tasks().remove(0);
    assert!(!undone.is_completed);
    assert_eq!(undone.completed_at, None);
}

#[test]
fn points_only_count_completed_chores_for_that_child() {
    let runtime = test_runtime();
    let (ctx, _backend) = runtime.block_on(signed_in_context());
    runtime.block_on(async {
        ctx.profiles.add(NewProfile::new("Mia")).await;
        ctx.profiles.add(NewProfile::new("Leo")).await;
    });
    let profiles = ctx.profiles.profiles();
    let (mia, leo) = (profiles[0].id, profiles[1].id);

    runtime.block_on(async {
        ctx.tasks.add(NewTask::new("Dishes", 5).assigned_to(mia)).await;
        ctx.tasks.add(NewTask::new("Laundry", 4).assigned_to(mia)).await;
        ctx.tasks.add(NewTask::new("Trash", 2).assigned_to(leo)).await;
        let dishes = ctx.tasks.tasks()[0].id;
        let trash = ctx.tasks.tasks()[2].id;
        ctx.tasks.set_completed(dishes, true).await;
        ctx.tasks.set_completed(trash, true).await;
    });

    assert_eq!(ctx.tasks.assigned_to(mia).len(), 2);
    assert_eq!(ctx.tasks.points_earned(mia), 5);
    assert_eq!(ctx.tasks.points_earned(leo), 2);
}

#[test]
fn deleting_a_task_removes_it_remotely() {
    let runtime = test_runtime();
    let (ctx, backend) = runtime.block_on(signed_in_context());
    let due = NaiveDate::from_ymd_opt(2024, 6, 1).expect("date");
    runtime.block_on(ctx.tasks.add(NewTask::new("Rake leaves", 3).due(due).notes("front yard")));
    let task = ctx.tasks.tasks().remove(0);
    assert_eq!(task.due_date, Some(due));
    assert_eq!(task.notes.as_deref(), Some("front yard"));

    runtime.block_on(ctx.tasks.delete(task.id));

    assert!(ctx.tasks.tasks().is_empty());
    assert_eq!(backend.row_count(TASKS_RELATION), 0);
}

#[test]
fn offline_failure_keeps_the_previous_list() {
    let runtime = test_runtime();
    let (ctx, backend) = runtime.block_on(signed_in_context());
    runtime.block_on(ctx.profiles.add(NewProfile::new("Mia")));
    backend.set_offline(true);

    runtime.block_on(ctx.profiles.add(NewProfile::new("Leo")));

    let state = ctx.profiles.snapshot();
    assert_eq!(state.items.len(), 1);
    assert!(state.last_error.is_some());
    assert!(!state.is_loading);
}

#[test]
fn dropped_connection_during_upload_still_reports_the_saved_profile() {
    let runtime = test_runtime();
    let backend = InMemoryBackend::new().with_signup_code(CODE);
    let storage = Arc::new(DroppedUpload {
        backend: backend.clone(),
    });
    let shared = Arc::new(backend.clone());
    let ctx = AppContext::new(shared.clone(), shared, storage, "avatars");
    runtime.block_on(sign_in_parent(&ctx));

    let photo = AvatarImage::jpeg(vec![7]);
    runtime.block_on(ctx.profiles.add(NewProfile::new("Mia").with_avatar(photo)));

    let error = ctx.profiles.snapshot().last_error.expect("error");
    assert!(
        error.starts_with("Profile saved, but photo upload failed: connection reset"),
        "{error}"
    );
    assert!(error.contains("list not refreshed"), "{error}");
    backend.set_offline(false);
    assert_eq!(backend.row_count(PROFILES_RELATION), 1);
}

#[test]
fn repository_operations_queue_behind_the_one_in_flight() {
    let runtime = test_runtime();
    let backend = InMemoryBackend::new().with_signup_code(CODE);
    let data = Arc::new(HeldSelect {
        backend: backend.clone(),
        release: Notify::new(),
        calls: Mutex::new(Vec::new()),
    });
    let shared = Arc::new(backend);
    let ctx = AppContext::new(shared.clone(), data.clone(), shared, "avatars");
    runtime.block_on(sign_in_parent(&ctx));

    runtime.block_on(async {
        let observer = async {
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
            assert!(ctx.profiles.snapshot().is_loading);
            assert_eq!(*data.calls.lock(), ["enter"]);
            data.release.notify_one();

            while data.calls.lock().len() < 3 {
                tokio::task::yield_now().await;
            }
            assert!(ctx.profiles.snapshot().is_loading);
            data.release.notify_one();
        };
        tokio::join!(ctx.profiles.load(), ctx.profiles.load(), observer);
    });

    assert_eq!(*data.calls.lock(), ["enter", "exit", "enter", "exit"]);
    let state = ctx.profiles.snapshot();
    assert!(!state.is_loading);
    assert_eq!(state.last_error, None);
}
