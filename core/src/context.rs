use crate::config::BackendSettings;
use crate::memory::InMemoryBackend;
use crate::provider::{AuthProvider, BlobStorage, DataProvider};
use crate::repo::{ProfileRepository, TaskRepository, DEFAULT_AVATAR_BUCKET};
use crate::session::SessionStore;
use crate::store::CredentialStore;
use crate::supabase::SupabaseClient;
use std::sync::Arc;

/// Everything the presentation layer talks to, wired over one set of providers.
#[derive(Clone)]
pub struct AppContext {
    pub session: SessionStore,
    pub profiles: ProfileRepository,
    pub tasks: TaskRepository,
}

impl AppContext {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        data: Arc<dyn DataProvider>,
        storage: Arc<dyn BlobStorage>,
        avatar_bucket: impl Into<String>,
    ) -> Self {
        Self {
            session: SessionStore::new(auth.clone()),
            profiles: ProfileRepository::with_bucket(
                auth.clone(),
                data.clone(),
                storage,
                avatar_bucket,
            ),
            tasks: TaskRepository::new(auth, data),
        }
    }

    /// Backed by a hosted project; sessions persist through `credentials`.
    pub fn supabase(settings: BackendSettings, credentials: Option<CredentialStore>) -> Self {
        let bucket = settings.avatar_bucket.clone();
        let mut client = SupabaseClient::new(settings);
        if let Some(store) = credentials {
            client = client.with_credentials(store);
        }
        let client = Arc::new(client);
        Self::new(client.clone(), client.clone(), client, bucket)
    }

    pub fn in_memory(backend: InMemoryBackend) -> Self {
        let backend = Arc::new(backend);
        Self::new(
            backend.clone(),
            backend.clone(),
            backend,
            DEFAULT_AVATAR_BUCKET,
        )
    }
}
