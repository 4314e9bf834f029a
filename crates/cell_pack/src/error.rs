//! Error types and result alias for the crate.
//!
//! This module defines [`enum@crate::error::Error`] and the crate-wide [Result] alias. Variants cover
//! malformed recipes, invalid grids and configuration, stale grid caches,
//! missing meshes, IO, serialization, and generic errors.
//!
//! Placement rejections are not errors: they travel as
//! [`crate::ingredient::placement::PlaceOutcome::Rejected`] and are recovered
//! inside the jitter loop.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("grid cache key mismatch (expected {expected}, found {found})")]
    CacheMismatch { expected: String, found: String },

    #[error("mesh '{path}' not found")]
    MeshNotFound { path: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Other(value)
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::Other(value.to_owned())
    }
}
