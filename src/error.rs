//! Error types for the merge pipeline

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EpgError {
    #[error("Cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    ConfigFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Download failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Unparseable feed: {reason}")]
    Parse { reason: String },

    #[error("Merged document is not well-formed: {reason}")]
    Assembly { reason: String },

    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, EpgError>;

impl EpgError {
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse { reason: reason.into() }
    }

    pub fn assembly(reason: impl std::fmt::Display) -> Self {
        Self::Assembly { reason: reason.to_string() }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ConfigRead { .. } | Self::ConfigFormat { .. } => 2,
            Self::Assembly { .. } => 3,
            Self::Write { .. } => 4,
            _ => 1,
        }
    }
}
