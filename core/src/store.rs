use crate::provider::User;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

const SESSION_FILE: &str = "session.json";

/// Tokens for an established auth session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

impl StoredSession {
    /// True when the access token expires within the next minute.
    pub fn needs_refresh(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now() + Duration::minutes(1) >= exp,
            None => false,
        }
    }
}

/// Keeps the current session on disk so a later process can bootstrap into it.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    pub fn new(root: PathBuf) -> Self {
        fs::create_dir_all(&root).ok();
        Self { root }
    }

    /// The per-user data directory, falling back to `./.allowance`.
    pub fn default_location() -> Self {
        let root = ProjectDirs::from("", "", "allowance")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".allowance"));
        Self::new(root)
    }

    fn session_path(&self) -> PathBuf {
        self.root.join(SESSION_FILE)
    }

    /// A missing or unreadable file both mean "no session".
    pub fn load(&self) -> Option<StoredSession> {
        let path = self.session_path();
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(%err, path = %path.display(), "discarding unreadable session file");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    pub fn save(&self, session: &StoredSession) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let path = self.session_path();
        let serialized = serde_json::to_vec_pretty(session)?;
        fs::write(&path, serialized)
            .with_context(|| format!("failed to write session at {}", path.display()))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let path = self.session_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove session at {}", path.display()))
            }
        }
    }
}
