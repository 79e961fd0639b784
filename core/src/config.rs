use crate::repo::DEFAULT_AVATAR_BUCKET;
use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

pub const URL_VAR: &str = "SUPABASE_URL";
pub const ANON_KEY_VAR: &str = "SUPABASE_ANON_KEY";
pub const REDIRECT_URL_VAR: &str = "SUPABASE_REDIRECT_URL";
pub const AVATAR_BUCKET_VAR: &str = "ALLOWANCE_AVATAR_BUCKET";

/// Where and how to reach the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    pub url: Url,
    pub anon_key: String,
    pub avatar_bucket: String,
    /// Only used for magic links; code verification does not need it.
    pub redirect_url: Option<Url>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Backend not configured: create allowance.yaml or set SUPABASE_URL and SUPABASE_ANON_KEY.")]
    Missing,
    #[error("Backend configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Missing => {
                "Backend not configured: create allowance.yaml with your project URL and anon key."
                    .to_string()
            }
            Self::Invalid(detail) => {
                format!("Backend not configured: {detail}. Update allowance.yaml.")
            }
        }
    }
}

impl BackendSettings {
    pub fn new(url: &str, anon_key: impl Into<String>) -> Result<Self, ConfigError> {
        resolve_backend(BackendSection {
            url: url.to_string(),
            anon_key: anon_key.into(),
            ..Default::default()
        })
    }

    /// Read `allowance.yaml` from the usual places, then let the process
    /// environment (and a `.env` file) override individual keys.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = match locate_config_file() {
            Some(path) => Some(read_section(&path)?),
            None => None,
        };
        let section = apply_env(file, |key| std::env::var(key).ok())?;
        resolve_backend(section)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        resolve_backend(read_section(path)?)
    }
}

fn read_section(path: &Path) -> Result<BackendSection, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
    })?;
    let config: AllowanceConfig = serde_yaml::from_str(&contents)
        .map_err(|err| ConfigError::Invalid(format!("invalid allowance.yaml: {err}")))?;
    config
        .backend
        .ok_or_else(|| ConfigError::Invalid("missing `backend` section".to_string()))
}

fn apply_env(
    file: Option<BackendSection>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<BackendSection, ConfigError> {
    let env_url = lookup(URL_VAR).filter(|value| !value.trim().is_empty());
    let env_key = lookup(ANON_KEY_VAR).filter(|value| !value.trim().is_empty());
    if file.is_none() && env_url.is_none() && env_key.is_none() {
        return Err(ConfigError::Missing);
    }
    let mut section = file.unwrap_or_default();
    if let Some(url) = env_url {
        section.url = url;
    }
    if let Some(key) = env_key {
        section.anon_key = key;
    }
    if let Some(redirect) = lookup(REDIRECT_URL_VAR).filter(|value| !value.trim().is_empty()) {
        section.redirect_url = Some(redirect);
    }
    if let Some(bucket) = lookup(AVATAR_BUCKET_VAR).filter(|value| !value.trim().is_empty()) {
        section.avatar_bucket = Some(bucket);
    }
    Ok(section)
}

fn resolve_backend(section: BackendSection) -> Result<BackendSettings, ConfigError> {
    let raw_url = section.url.trim();
    if raw_url.is_empty() {
        return Err(ConfigError::Invalid("missing backend url".to_string()));
    }
    let url = Url::parse(raw_url)
        .map_err(|err| ConfigError::Invalid(format!("invalid backend url `{raw_url}`: {err}")))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!(
            "backend url `{raw_url}` must be an http(s) address"
        )));
    }
    let anon_key = section.anon_key.trim().to_string();
    if anon_key.is_empty() {
        return Err(ConfigError::Invalid("missing anon key".to_string()));
    }
    // An unparseable redirect is dropped rather than rejected; it is optional.
    let redirect_url = section
        .redirect_url
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| Url::parse(raw).ok());
    let avatar_bucket = section
        .avatar_bucket
        .map(|bucket| bucket.trim().to_string())
        .filter(|bucket| !bucket.is_empty())
        .unwrap_or_else(|| DEFAULT_AVATAR_BUCKET.to_string());
    Ok(BackendSettings {
        url,
        anon_key,
        avatar_bucket,
        redirect_url,
    })
}

fn locate_config_file() -> Option<PathBuf> {
    allowance_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn allowance_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("allowance.yaml")];
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("allowance");
        paths.push(config_dir.join("allowance.yaml"));
        paths.push(config_dir.join("allowance.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".allowance").join("allowance.yaml"));
        paths.push(home_dir.join(".allowance").join("allowance.yml"));
    }
    paths
}

#[derive(Debug, Deserialize)]
struct AllowanceConfig {
    backend: Option<BackendSection>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendSection {
    #[serde(default)]
    url: String,
    #[serde(default)]
    anon_key: String,
    #[serde(default)]
    avatar_bucket: Option<String>,
    #[serde(default)]
    redirect_url: Option<String>,
}
