pub mod config;
pub mod context;
pub mod error;
pub mod memory;
pub mod model;
pub mod provider;
pub mod repo;
pub mod session;
pub mod store;
pub mod supabase;
pub mod telemetry;

pub use config::{BackendSettings, ConfigError};
pub use context::AppContext;
pub use error::{ErrorKind, ProviderError, ProviderResult};
pub use memory::InMemoryBackend;
pub use model::{AvatarImage, NewProfile, NewTask, Profile, Task};
pub use provider::{AuthProvider, BlobStorage, DataProvider, OtpPurpose, User};
pub use repo::{ProfileRepository, RepoState, TaskRepository};
pub use session::{SessionPhase, SessionState, SessionStore};
pub use store::{CredentialStore, StoredSession};
pub use supabase::SupabaseClient;
