// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`runner`] spawns guarded commands with `tokio::process::Command`,
//!   merging stdout/stderr into one prefixed stream.
//! - [`output`] holds the shared output sink and prefix rendering.
//! - [`kill`] terminates a command together with its descendants.
//! - `pty` runs commands in raw mode behind a pseudo-terminal.

pub mod kill;
pub mod output;
mod pty;
pub mod runner;

pub use kill::ProcessHandle;
pub use output::{default_prefix, format_prefix, OutputSink, PrefixWriter};
pub use runner::{ExitOutcome, ProcessOptions, ProcessRunner, RunningProcess};
