// src/watch/mod.rs

//! Filesystem notification layer.
//!
//! This module is responsible for:
//! - Wiring up a cross-platform watcher (`notify`), native or polling.
//! - Translating raw `notify` events into [`GuardEvent`]s.
//!
//! It does **not** know about patterns or debouncing; the guard session
//! decides which events matter.

pub mod path_utils;
pub mod watcher;

use std::path::PathBuf;

use crate::types::Op;

pub use watcher::{WatchBackend, WatchStreams};

/// One filesystem change, consumed once by a guard session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardEvent {
    /// Absolute path of the changed entry.
    pub path: PathBuf,
    pub is_dir: bool,
    pub op: Op,
}
