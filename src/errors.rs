// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevwatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Watch backend error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Live update failed for {path}: {reason}")]
    LiveUpdateFailed { path: String, reason: String },

    #[error("File watcher already started")]
    AlreadyStarted,

    #[error("File watcher is closed")]
    Closed,

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DevwatchError>;
