// src/exec/kill.rs

//! Process-tree termination.
//!
//! Every guarded command is started as the leader of its own process group
//! (or pty session), so signalling the group reaches the grandchildren too.

use crate::errors::{GuardError, Result};

/// OS-level handle for a spawned process tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: u32,
}

impl ProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Ask the whole tree to terminate.
    pub fn kill_tree(&self) -> Result<()> {
        imp::terminate(self.pid)
    }

    /// Forcibly kill the whole tree.
    pub fn force_kill_tree(&self) -> Result<()> {
        imp::force(self.pid)
    }
}

#[cfg(unix)]
mod imp {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    use super::*;

    pub(super) fn terminate(pid: u32) -> Result<()> {
        signal_group(pid, Signal::SIGTERM)
    }

    pub(super) fn force(pid: u32) -> Result<()> {
        signal_group(pid, Signal::SIGKILL)
    }

    fn signal_group(pid: u32, signal: Signal) -> Result<()> {
        let pgid = i32::try_from(pid).map_err(|_| GuardError::Kill {
            pid,
            reason: "pid out of range".to_string(),
        })?;
        match killpg(Pid::from_raw(pgid), signal) {
            // The group is already empty.
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(GuardError::Kill {
                pid,
                reason: format!("{signal}: {errno}"),
            }),
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::process::{Command, Stdio};

    use super::*;

    pub(super) fn terminate(pid: u32) -> Result<()> {
        taskkill(pid)
    }

    pub(super) fn force(pid: u32) -> Result<()> {
        taskkill(pid)
    }

    fn taskkill(pid: u32) -> Result<()> {
        let status = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| GuardError::Kill {
                pid,
                reason: format!("cannot run taskkill: {e}"),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(GuardError::Kill {
                pid,
                reason: format!("taskkill exited with {status}"),
            })
        }
    }
}
