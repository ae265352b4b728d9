//! Error types for offcache
//!
//! All modules use `OffcacheResult<T>` as their return type.

use crate::network::NetworkError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for offcache operations
pub type OffcacheResult<T> = Result<T, OffcacheError>;

/// All errors that can occur in offcache
#[derive(Error, Debug)]
pub enum OffcacheError {
    // Lifecycle errors
    #[error("Install of generation {generation} failed: {reason}")]
    Install { generation: String, reason: String },

    #[error("Activation of generation {generation} failed: {reason}")]
    Activation { generation: String, reason: String },

    #[error("Generation not found: {0}")]
    GenerationNotFound(String),

    #[error("Worker event loop has stopped")]
    ReactorStopped,

    // Network errors
    #[error(transparent)]
    Network(#[from] NetworkError),

    // Cache storage errors
    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("Corrupt cache entry {path}: {reason}")]
    CorruptEntry { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid cache name {name}: {reason}")]
    InvalidCacheName { name: String, reason: String },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl OffcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an install error for a generation
    pub fn install(generation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Install {
            generation: generation.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an activation error for a generation
    pub fn activation(generation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Activation {
            generation: generation.into(),
            reason: reason.to_string(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Install { .. } => {
                Some("The previous generation is still in use. Check connectivity and run: offcache install")
            }
            Self::Activation { .. } => {
                Some("Run: offcache install (a complete generation is required)")
            }
            Self::InvalidCacheName { .. } => {
                Some("Cache names must end in -v<semver>, e.g. portfolio-v1.2.0")
            }
            Self::ConfigInvalid { .. } => Some("Run: offcache config show"),
            _ => None,
        }
    }
}
