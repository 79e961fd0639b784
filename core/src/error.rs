use serde::{Deserialize, Serialize};

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Which backend collaborator produced a failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    Data,
    Storage,
}

/// Failure reported by an auth, data or blob storage provider.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Bad credentials, unconfirmed account, invalid or expired code.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Constraint violation, missing row, or a row-level ownership denial.
    #[error("data request failed: {0}")]
    Data(String),
    /// Upload failure or missing bucket.
    #[error("storage request failed: {0}")]
    Storage(String),
}

impl ProviderError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Data(_) => ErrorKind::Data,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Auth(message) | Self::Data(message) | Self::Storage(message) => message,
        }
    }

    /// The single string surfaced through a store's `last_error`.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(message) => message.clone(),
            Self::Data(message) => format!("Couldn't reach your family data: {message}"),
            Self::Storage(message) => format!("Photo storage problem: {message}"),
        }
    }
}
