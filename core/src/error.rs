use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timed out after {waited_ms}ms waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited_ms: u128 },

    #[error("Room '{name}' is not on the floor plan")]
    UnknownRoom { name: String },

    #[error("Staff member '{name}' is not on the roster")]
    UnknownStaff { name: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PresenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

pub type PresenceResult<T> = Result<T, PresenceError>;
