//! Error taxonomy shared by every module.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SemdexError>;

/// Coarse classification every [`SemdexError`] maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Corrupt,
    ExternalFailure,
}

#[derive(Debug, Error)]
pub enum SemdexError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("corrupt artifact '{}': {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("external failure: {0}")]
    ExternalFailure(String),

    /// The scoring model could not be loaded. Not recoverable by retrying
    /// with other input.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl SemdexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidArgument(_) | Self::Config(_) => ErrorKind::InvalidArgument,
            Self::Corrupt { .. } => ErrorKind::Corrupt,
            Self::ExternalFailure(_) | Self::ModelLoad(_) | Self::Io { .. } => ErrorKind::ExternalFailure,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
