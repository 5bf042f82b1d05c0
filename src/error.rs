//! Error types for the sanitation publisher
//!
//! Every failure is fatal to the run. The variants keep the failing stage
//! visible in logs: configuration, input, image, serialization, broker or
//! remote table.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for publisher operations
#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Failed to load records: {0}")]
    Source(#[from] crate::source::SourceError),

    #[error("Failed to read image {}: {source}", path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Remote table error: {0}")]
    Table(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PublisherError {
    /// Wrap a transport failure
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(error))
    }

    /// Wrap a remote table failure
    pub fn table<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Table(Box::new(error))
    }
}

/// Result type for publisher operations
pub type PublisherResult<T> = Result<T, PublisherError>;
