use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("Content tree unavailable: {0}")]
    Tree(String),

    #[error("Index backend failed: {0}")]
    Backend(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap any displayable backend failure (transport, storage engine, ...).
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
