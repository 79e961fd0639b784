//! Local mirrors of the parent's remote tables.
//!
//! A repository never merges: after every successful mutation it reloads the
//! whole list owned by the current user, ordered by `created_at` ascending.

mod profiles;
mod tasks;

pub use profiles::{ProfileRepository, DEFAULT_AVATAR_BUCKET};
pub use tasks::TaskRepository;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{AuthProvider, DataProvider, Filter, Order};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;
use uuid::Uuid;

/// What a presentation layer renders for one repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoState<T> {
    pub items: Vec<T>,
    pub is_loading: bool,
    pub last_error: Option<String>,
}

impl<T> Default for RepoState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            is_loading: false,
            last_error: None,
        }
    }
}

/// Shared plumbing for a repository backed by one relation.
struct RemoteTable<T> {
    relation: &'static str,
    state: Arc<RwLock<RepoState<T>>>,
    auth: Arc<dyn AuthProvider>,
    data: Arc<dyn DataProvider>,
    gate: Arc<Mutex<()>>,
}

impl<T> Clone for RemoteTable<T> {
    fn clone(&self) -> Self {
        Self {
            relation: self.relation,
            state: self.state.clone(),
            auth: self.auth.clone(),
            data: self.data.clone(),
            gate: self.gate.clone(),
        }
    }
}

/// Held for the duration of one repository operation.
struct Turn<'a, T> {
    _gate: MutexGuard<'a, ()>,
    state: &'a RwLock<RepoState<T>>,
}

impl<T> Drop for Turn<'_, T> {
    fn drop(&mut self) {
        self.state.write().is_loading = false;
    }
}

impl<T> RemoteTable<T>
where
    T: DeserializeOwned + Clone + Send + Sync,
{
    fn new(relation: &'static str, auth: Arc<dyn AuthProvider>, data: Arc<dyn DataProvider>) -> Self {
        Self {
            relation,
            state: Arc::new(RwLock::new(RepoState::default())),
            auth,
            data,
            gate: Arc::new(Mutex::new(())),
        }
    }

    fn snapshot(&self) -> RepoState<T> {
        self.state.read().clone()
    }

    fn items(&self) -> Vec<T> {
        self.state.read().items.clone()
    }

    fn clear_error(&self) {
        self.state.write().last_error = None;
    }

    async fn begin(&self) -> Turn<'_, T> {
        let gate = self.gate.lock().await;
        {
            let mut state = self.state.write();
            state.last_error = None;
            state.is_loading = true;
        }
        Turn {
            _gate: gate,
            state: &self.state,
        }
    }

    async fn current_user_id(&self) -> ProviderResult<Uuid> {
        Ok(self.auth.current_user().await?.id)
    }

    /// Fetch and replace the local list. Caller holds the turn.
    async fn reload(&self) -> ProviderResult<()> {
        let owner = self.current_user_id().await?;
        let rows = self
            .data
            .select(
                self.relation,
                &[Filter::eq("parent_user_id", owner)],
                Some(&Order::ascending("created_at")),
            )
            .await?;
        let items = decode_rows(self.relation, rows)?;
        self.state.write().items = items;
        Ok(())
    }

    async fn insert(&self, row: Value) -> ProviderResult<Vec<T>> {
        let rows = self.data.insert(self.relation, row).await?;
        decode_rows(self.relation, rows)
    }

    async fn update_by_id(&self, id: Uuid, changes: Value) -> ProviderResult<Vec<T>> {
        let rows = self
            .data
            .update(self.relation, changes, &[Filter::eq("id", id)])
            .await?;
        if rows.is_empty() {
            return Err(ProviderError::data(format!(
                "no {} row with id {id}",
                self.relation
            )));
        }
        decode_rows(self.relation, rows)
    }

    async fn delete_by_id(&self, id: Uuid) -> ProviderResult<()> {
        self.data
            .delete(self.relation, &[Filter::eq("id", id)])
            .await
    }

    fn report(&self, operation: &str, err: &ProviderError) {
        self.report_message(operation, err, err.user_message());
    }

    fn report_message(&self, operation: &str, err: &ProviderError, message: String) {
        warn!(
            relation = self.relation,
            operation,
            kind = ?err.kind(),
            %err,
            "repository operation failed"
        );
        self.state.write().last_error = Some(message);
    }
}

fn decode_rows<T: DeserializeOwned>(relation: &str, rows: Vec<Value>) -> ProviderResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|err| ProviderError::data(format!("unreadable {relation} row: {err}")))
        })
        .collect()
}
