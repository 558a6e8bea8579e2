use thiserror::Error;
use uuid::Uuid;

pub type AdServeResult<T> = Result<T, AdServeError>;

#[derive(Error, Debug)]
pub enum AdServeError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("Catalog store error: {0}")]
    Store(String),

    #[error("Tracking error: {0}")]
    Tracking(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AdServeError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn store(message: impl std::fmt::Display) -> Self {
        Self::Store(message.to_string())
    }

    pub fn tracking(message: impl std::fmt::Display) -> Self {
        Self::Tracking(message.to_string())
    }

    pub fn advertisement_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: "advertisement",
            id,
        }
    }

    pub fn format_not_found(id: Uuid) -> Self {
        Self::NotFound { kind: "format", id }
    }
}
