use crate::error::ProviderResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

/// The authenticated account as reported by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// What a one-time code is being redeemed for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Signup,
    Magiclink,
    Recovery,
    EmailChange,
    Email,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Magiclink => "magiclink",
            Self::Recovery => "recovery",
            Self::EmailChange => "email_change",
            Self::Email => "email",
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> ProviderResult<()>;

    async fn verify_one_time_code(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> ProviderResult<()>;

    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<()>;

    async fn sign_out(&self) -> ProviderResult<()>;

    /// Fails when no session is established.
    async fn current_user(&self) -> ProviderResult<User>;
}

/// Equality predicate on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }
}

/// Row-level access to named relations. Rows travel as JSON objects.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn select(
        &self,
        relation: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> ProviderResult<Vec<Value>>;

    /// Returns the inserted rows as stored.
    async fn insert(&self, relation: &str, row: Value) -> ProviderResult<Vec<Value>>;

    /// Returns the rows after the update; an empty vector means nothing matched.
    async fn update(
        &self,
        relation: &str,
        changes: Value,
        filters: &[Filter],
    ) -> ProviderResult<Vec<Value>>;

    async fn delete(&self, relation: &str, filters: &[Filter]) -> ProviderResult<()>;
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> ProviderResult<()>;

    fn public_url(&self, bucket: &str, path: &str) -> Url;
}
