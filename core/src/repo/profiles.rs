use super::{RemoteTable, RepoState};
use crate::error::{ProviderError, ProviderResult};
use crate::model::{date_only, AvatarImage, NewProfile, Profile, PROFILES_RELATION};
use crate::provider::{AuthProvider, BlobStorage, DataProvider};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use url::Url;
use uuid::Uuid;

pub const DEFAULT_AVATAR_BUCKET: &str = "avatars";

/// Child profiles owned by the signed-in parent, plus their avatar photos.
#[derive(Clone)]
pub struct ProfileRepository {
    table: RemoteTable<Profile>,
    storage: Arc<dyn BlobStorage>,
    bucket: String,
}

impl ProfileRepository {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        data: Arc<dyn DataProvider>,
        storage: Arc<dyn BlobStorage>,
    ) -> Self {
        Self::with_bucket(auth, data, storage, DEFAULT_AVATAR_BUCKET)
    }

    pub fn with_bucket(
        auth: Arc<dyn AuthProvider>,
        data: Arc<dyn DataProvider>,
        storage: Arc<dyn BlobStorage>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            table: RemoteTable::new(PROFILES_RELATION, auth, data),
            storage,
            bucket: bucket.into(),
        }
    }

    pub fn snapshot(&self) -> RepoState<Profile> {
        self.table.snapshot()
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.table.items()
    }

    pub fn clear_error(&self) {
        self.table.clear_error();
    }

    /// Public URL of the stored avatar, if the profile has one.
    pub fn public_url(&self, profile: &Profile) -> Option<Url> {
        let path = profile.avatar_url.as_deref()?.trim();
        if path.is_empty() {
            return None;
        }
        Some(self.storage.public_url(&self.bucket, path))
    }

    pub async fn load(&self) {
        let _turn = self.table.begin().await;
        if let Err(err) = self.table.reload().await {
            self.table.report("load", &err);
        }
    }

    /// Insert the row first, then upload the photo. A failed upload keeps the
    /// saved row and says so in `last_error`.
    pub async fn add(&self, profile: NewProfile) {
        let _turn = self.table.begin().await;
        let NewProfile {
            name,
            birthdate,
            avatar,
        } = profile;

        let created = async {
            let owner = self.table.current_user_id().await?;
            let id = Uuid::new_v4();
            let row = json!({
                "id": id,
                "parent_user_id": owner,
                "name": name,
                "birthdate": birthdate.map(date_only::format),
                "avatar_url": null,
            });
            self.table.insert(row).await?;
            info!(profile_id = %id, "profile created");
            Ok::<_, ProviderError>((owner, id))
        }
        .await;

        let (owner, id) = match created {
            Ok(ids) => ids,
            Err(err) => {
                self.table.report("add", &err);
                return;
            }
        };

        let mut partial = None;
        if let Some(image) = avatar {
            if let Err(err) = self.store_avatar(owner, id, image).await {
                let message = format!(
                    "Profile saved, but photo upload failed: {}",
                    err.message()
                );
                self.table.report_message("add avatar", &err, message.clone());
                partial = Some(message);
            }
        }

        if let Err(err) = self.table.reload().await {
            match partial {
                Some(saved) => {
                    let message =
                        format!("{saved} (list not refreshed: {})", err.user_message());
                    self.table.report_message("load", &err, message);
                }
                None => self.table.report("load", &err),
            }
        }
    }

    /// Write name, birthdate and avatar path of an existing profile.
    pub async fn update(&self, profile: &Profile) {
        let _turn = self.table.begin().await;
        let changes = json!({
            "name": profile.name,
            "birthdate": profile.birthdate.map(date_only::format),
            "avatar_url": profile.avatar_url,
        });
        let result = async {
            self.table.update_by_id(profile.id, changes).await?;
            self.table.reload().await
        }
        .await;
        if let Err(err) = result {
            self.table.report("update", &err);
        }
    }

    /// Replace the profile photo and point the row at it.
    pub async fn upload_avatar(&self, profile: &Profile, image: AvatarImage) {
        let _turn = self.table.begin().await;
        let result = async {
            self.store_avatar(profile.parent_user_id, profile.id, image)
                .await?;
            self.table.reload().await
        }
        .await;
        if let Err(err) = result {
            self.table.report("upload avatar", &err);
        }
    }

    pub async fn delete(&self, id: Uuid) {
        let _turn = self.table.begin().await;
        let result = async {
            self.table.delete_by_id(id).await?;
            info!(profile_id = %id, "profile deleted");
            self.table.reload().await
        }
        .await;
        if let Err(err) = result {
            self.table.report("delete", &err);
        }
    }

    async fn store_avatar(&self, owner: Uuid, id: Uuid, image: AvatarImage) -> ProviderResult<()> {
        let path = avatar_path(owner, id, &image);
        self.storage
            .upload(&self.bucket, &path, image.bytes, &image.content_type, true)
            .await?;
        self.table
            .update_by_id(id, json!({ "avatar_url": path }))
            .await?;
        Ok(())
    }
}

fn avatar_path(owner: Uuid, id: Uuid, image: &AvatarImage) -> String {
    format!("{owner}/{id}.{}", image.extension())
}
