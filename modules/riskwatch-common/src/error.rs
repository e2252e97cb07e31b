use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Duplicate pattern name: {0}")]
    DuplicatePattern(String),

    #[error("Pattern {pattern}: unknown sector '{value}'")]
    UnknownSector { pattern: String, value: String },

    #[error("Pattern {pattern}: unknown risk level '{value}'")]
    UnknownRiskLevel { pattern: String, value: String },

    #[error("Pattern {pattern}: risk factor {factor} has non-positive weight {weight}")]
    InvalidWeight {
        pattern: String,
        factor: String,
        weight: f64,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// A uniqueness constraint rejected the write. Callers treat this as a no-op.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SummaryError {
    #[error("Summary generator unavailable")]
    Unavailable,

    #[error("Summary generator error: {0}")]
    Provider(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
