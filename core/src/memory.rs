//! In-process backend implementing every provider contract.
//!
//! Accounts must be confirmed with the emailed one-time code before they can
//! sign in. Tables enforce row ownership the way row-level security does:
//! writes must be tagged with the signed-in user, and reads, updates and
//! deletes only see that user's rows.

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{AuthProvider, BlobStorage, DataProvider, Filter, Order, OtpPurpose, User};
use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct Account {
    id: Uuid,
    password: String,
    confirmed: bool,
    pending_code: Option<String>,
}

#[derive(Default)]
struct Backend {
    accounts: HashMap<String, Account>,
    session: Option<User>,
    tables: HashMap<String, Vec<Map<String, Value>>>,
    buckets: HashSet<String>,
    objects: HashMap<(String, String), (String, Vec<u8>)>,
    clock: u32,
    signup_code: Option<String>,
    offline: bool,
}

#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<RwLock<Backend>>,
    public_base: Url,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// A backend with the `avatars` bucket already created.
    pub fn new() -> Self {
        let backend = Backend {
            buckets: HashSet::from(["avatars".to_string()]),
            ..Default::default()
        };
        Self {
            inner: Arc::new(RwLock::new(backend)),
            public_base: Url::parse("http://localhost:54321/").expect("static url"),
        }
    }

    /// Every sign-up from now on is issued `code` instead of a random one.
    pub fn with_signup_code(self, code: impl Into<String>) -> Self {
        self.inner.write().signup_code = Some(code.into());
        self
    }

    pub fn remove_bucket(&self, bucket: &str) {
        self.inner.write().buckets.remove(bucket);
    }

    /// The code most recently "emailed" to `email`, if still unredeemed.
    pub fn outbox(&self, email: &str) -> Option<String> {
        self.inner
            .read()
            .accounts
            .get(&normalize_email(email))
            .and_then(|account| account.pending_code.clone())
    }

    /// Simulate losing the network: every call fails until restored.
    pub fn set_offline(&self, offline: bool) {
        self.inner.write().offline = offline;
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<(String, Vec<u8>)> {
        self.inner
            .read()
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub fn row_count(&self, relation: &str) -> usize {
        self.inner
            .read()
            .tables
            .get(relation)
            .map(Vec::len)
            .unwrap_or_default()
    }

    fn online(&self) -> Result<(), String> {
        if self.inner.read().offline {
            Err("The Internet connection appears to be offline.".to_string())
        } else {
            Ok(())
        }
    }

    fn signed_in_user(backend: &Backend) -> ProviderResult<Uuid> {
        backend
            .session
            .as_ref()
            .map(|user| user.id)
            .ok_or_else(|| ProviderError::data("permission denied: no authenticated user"))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

fn issue_code() -> String {
    let n = Uuid::new_v4().as_u128() % 1_000_000;
    format!("{n:06}")
}

fn column_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn matches(row: &Map<String, Value>, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| {
        row.get(&filter.column)
            .map(|value| column_text(value) == filter.value)
            .unwrap_or(false)
    })
}

fn owned_by(row: &Map<String, Value>, owner: Uuid) -> bool {
    row.get("parent_user_id")
        .map(|value| column_text(value) == owner.to_string())
        .unwrap_or(false)
}

fn as_object(row: Value) -> ProviderResult<Map<String, Value>> {
    match row {
        Value::Object(map) => Ok(map),
        other => Err(ProviderError::data(format!("expected a JSON object row, got {other}"))),
    }
}

#[async_trait]
impl AuthProvider for InMemoryBackend {
    async fn sign_up(&self, email: &str, password: &str) -> ProviderResult<()> {
        self.online().map_err(ProviderError::Auth)?;
        if !looks_like_email(email) {
            return Err(ProviderError::auth(
                "Unable to validate email address: invalid format",
            ));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ProviderError::auth(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters."
            )));
        }
        let mut backend = self.inner.write();
        let key = normalize_email(email);
        if backend
            .accounts
            .get(&key)
            .map(|account| account.confirmed)
            .unwrap_or(false)
        {
            return Err(ProviderError::auth("User already registered"));
        }
        let code = backend.signup_code.clone().unwrap_or_else(issue_code);
        let id = backend
            .accounts
            .get(&key)
            .map(|account| account.id)
            .unwrap_or_else(Uuid::new_v4);
        backend.accounts.insert(
            key,
            Account {
                id,
                password: password.to_string(),
                confirmed: false,
                pending_code: Some(code),
            },
        );
        Ok(())
    }

    async fn verify_one_time_code(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> ProviderResult<()> {
        self.online().map_err(ProviderError::Auth)?;
        if purpose != OtpPurpose::Signup {
            return Err(ProviderError::auth(format!(
                "Verification type `{}` is not supported",
                purpose.as_str()
            )));
        }
        let mut backend = self.inner.write();
        let key = normalize_email(email);
        let account = backend
            .accounts
            .get_mut(&key)
            .filter(|account| account.pending_code.as_deref() == Some(code.trim()))
            .ok_or_else(|| ProviderError::auth("Token has expired or is invalid"))?;
        account.confirmed = true;
        account.pending_code = None;
        let user = User {
            id: account.id,
            email: Some(key),
        };
        backend.session = Some(user);
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> ProviderResult<()> {
        self.online().map_err(ProviderError::Auth)?;
        let mut backend = self.inner.write();
        let key = normalize_email(email);
        let account = backend
            .accounts
            .get(&key)
            .filter(|account| account.password == password)
            .cloned()
            .ok_or_else(|| ProviderError::auth("Invalid login credentials"))?;
        if !account.confirmed {
            return Err(ProviderError::auth("Email not confirmed"));
        }
        backend.session = Some(User {
            id: account.id,
            email: Some(key),
        });
        Ok(())
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        self.online().map_err(ProviderError::Auth)?;
        self.inner.write().session = None;
        Ok(())
    }

    async fn current_user(&self) -> ProviderResult<User> {
        self.online().map_err(ProviderError::Auth)?;
        self.inner
            .read()
            .session
            .clone()
            .ok_or_else(|| ProviderError::auth("Auth session missing!"))
    }
}

#[async_trait]
impl DataProvider for InMemoryBackend {
    async fn select(
        &self,
        relation: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> ProviderResult<Vec<Value>> {
        self.online().map_err(ProviderError::Data)?;
        let backend = self.inner.read();
        let owner = Self::signed_in_user(&backend)?;
        let mut rows: Vec<Map<String, Value>> = backend
            .tables
            .get(relation)
            .map(|rows| {
                rows.iter()
                    .filter(|row| owned_by(row, owner) && matches(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let left = a.get(&order.column).map(column_text);
                let right = b.get(&order.column).map(column_text);
                let ordering = left.cmp(&right);
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        Ok(rows.into_iter().map(Value::Object).collect())
    }

    async fn insert(&self, relation: &str, row: Value) -> ProviderResult<Vec<Value>> {
        self.online().map_err(ProviderError::Data)?;
        let mut row = as_object(row)?;
        let mut backend = self.inner.write();
        let owner = Self::signed_in_user(&backend)?;
        if !owned_by(&row, owner) {
            return Err(ProviderError::data(format!(
                "new row violates row-level security policy for table \"{relation}\""
            )));
        }
        let id = match row.get("id") {
            Some(value) if !value.is_null() => column_text(value),
            _ => {
                let id = Uuid::new_v4().to_string();
                row.insert("id".into(), Value::String(id.clone()));
                id
            }
        };
        let duplicate = backend.tables.get(relation).map_or(false, |rows| {
            rows.iter()
                .any(|existing| existing.get("id").map(column_text).as_deref() == Some(id.as_str()))
        });
        if duplicate {
            return Err(ProviderError::data(format!(
                "duplicate key value violates unique constraint \"{relation}_pkey\""
            )));
        }
        // Server-side default; the tick keeps rows inserted in the same
        // instant strictly ordered.
        backend.clock += 1;
        let created_at = (Utc::now() + Duration::microseconds(i64::from(backend.clock)))
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        row.entry("created_at")
            .or_insert_with(|| Value::String(created_at));
        backend
            .tables
            .entry(relation.to_string())
            .or_default()
            .push(row.clone());
        Ok(vec![Value::Object(row)])
    }

    async fn update(
        &self,
        relation: &str,
        changes: Value,
        filters: &[Filter],
    ) -> ProviderResult<Vec<Value>> {
        self.online().map_err(ProviderError::Data)?;
        let changes = as_object(changes)?;
        let mut backend = self.inner.write();
        let owner = Self::signed_in_user(&backend)?;
        let mut updated = Vec::new();
        if let Some(rows) = backend.tables.get_mut(relation) {
            for row in rows
                .iter_mut()
                .filter(|row| owned_by(row, owner) && matches(row, filters))
            {
                for (column, value) in &changes {
                    row.insert(column.clone(), value.clone());
                }
                updated.push(Value::Object(row.clone()));
            }
        }
        Ok(updated)
    }

    async fn delete(&self, relation: &str, filters: &[Filter]) -> ProviderResult<()> {
        self.online().map_err(ProviderError::Data)?;
        let mut backend = self.inner.write();
        let owner = Self::signed_in_user(&backend)?;
        if let Some(rows) = backend.tables.get_mut(relation) {
            rows.retain(|row| !(owned_by(row, owner) && matches(row, filters)));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStorage for InMemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> ProviderResult<()> {
        self.online().map_err(ProviderError::Storage)?;
        let mut backend = self.inner.write();
        if !backend.buckets.contains(bucket) {
            return Err(ProviderError::storage("Bucket not found"));
        }
        let key = (bucket.to_string(), path.to_string());
        if !upsert && backend.objects.contains_key(&key) {
            return Err(ProviderError::storage("The resource already exists"));
        }
        backend
            .objects
            .insert(key, (content_type.to_string(), bytes));
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> Url {
        let mut url = self.public_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "object", "public", bucket])
                .extend(path.split('/'));
        }
        url
    }
}
