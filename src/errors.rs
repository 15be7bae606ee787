// src/errors.rs

//! Crate-wide error type and `Result` alias.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("cannot resolve root directory {path:?}: {source}")]
    RootDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The git tool is missing, or the root is not inside a repository.
    #[error("git: {0}")]
    Vcs(String),

    #[error("path {0:?} is not under the watch root")]
    OutsideRoot(PathBuf),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("failed to spawn {program:?}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("failed to kill process tree {pid}: {reason}")]
    Kill { pid: u32, reason: String },

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, GuardError>;
