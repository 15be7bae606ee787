// src/exec/runner.rs

//! Spawning guarded commands.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{GuardError, Result};
use crate::exec::kill::ProcessHandle;
use crate::exec::output::OutputSink;
use crate::exec::pty::{spawn_raw, RawTerminal};

/// How long output pumps may keep draining after the process exited.
const DRAIN_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);

/// Options for a single spawn.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Working directory (inherits the guard's when `None`).
    pub dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Start from an empty environment instead of the inherited one.
    pub clear_env: bool,
    /// Already-rendered prefix written before every output line.
    pub prefix: String,
    /// Run inside a pseudo-terminal with the controlling terminal in raw mode.
    pub raw: bool,
}

/// Exit status of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, when the process exited normally.
    pub code: Option<i32>,
    pub success: bool,
}

/// A process that has been started and not yet reaped.
#[derive(Debug)]
pub struct RunningProcess {
    handle: ProcessHandle,
    done: oneshot::Receiver<Result<ExitOutcome>>,
}

impl RunningProcess {
    pub(crate) fn new(handle: ProcessHandle, done: oneshot::Receiver<Result<ExitOutcome>>) -> Self {
        Self { handle, done }
    }

    pub fn handle(&self) -> ProcessHandle {
        self.handle
    }

    /// Wait for the process to exit.
    pub async fn wait(self) -> Result<ExitOutcome> {
        match self.done.await {
            Ok(res) => res,
            Err(_) => Err(GuardError::Other(anyhow::anyhow!(
                "process {} was abandoned before it was reaped",
                self.handle.pid()
            ))),
        }
    }
}

/// Spawns commands with merged, prefixed output.
///
/// Clones share the output sink and the raw-terminal lock, so one runner can
/// serve several guards without two of them putting the terminal into raw
/// mode at the same time.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    output: OutputSink,
    terminal: RawTerminal,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner writing to a custom sink (tests capture output this way).
    pub fn with_output(output: OutputSink) -> Self {
        Self {
            output,
            terminal: RawTerminal::default(),
        }
    }

    pub fn output(&self) -> &OutputSink {
        &self.output
    }

    /// Start `args[0]` with the remaining arguments.
    ///
    /// Returns an error right away when the program cannot be started (e.g.
    /// it does not exist); such a failure never produces a `RunningProcess`.
    pub async fn spawn(&self, args: &[String], opts: &ProcessOptions) -> Result<RunningProcess> {
        let Some(program) = args.first() else {
            return Err(GuardError::ConfigError("empty command".to_string()));
        };

        if opts.raw {
            return spawn_raw(args, opts, self.output.clone(), &self.terminal).await;
        }

        let mut cmd = Command::new(program);
        cmd.args(&args[1..]);
        if let Some(dir) = &opts.dir {
            cmd.current_dir(dir);
        }
        if opts.clear_env {
            cmd.env_clear();
        }
        cmd.envs(opts.env.iter().map(|(k, v)| (k, v)));

        // Background process groups reading the terminal would be stopped by
        // SIGTTIN, so only raw runs get stdin.
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| GuardError::Spawn {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let pid = child.id().ok_or_else(|| GuardError::Spawn {
            program: program.clone(),
            reason: "process exited before its pid was read".to_string(),
        })?;
        debug!(pid, program = %program, "spawned process");

        let pumps = [
            child.stdout.take().map(|s| pump(s, opts.prefix.clone(), self.output.clone())),
            child.stderr.take().map(|s| pump(s, opts.prefix.clone(), self.output.clone())),
        ];

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let status = child.wait().await;
            for handle in pumps.into_iter().flatten() {
                if tokio::time::timeout(DRAIN_TIMEOUT, handle).await.is_err() {
                    // A grandchild still holds the pipe open.
                    debug!(pid, "output pump still busy after exit; detaching");
                }
            }
            let outcome = status
                .map(|status| ExitOutcome {
                    code: status.code(),
                    success: status.success(),
                })
                .map_err(GuardError::from);
            let _ = done_tx.send(outcome);
        });

        Ok(RunningProcess::new(ProcessHandle::new(pid), done_rx))
    }
}

/// Copy `reader` to the sink line by line.
fn pump<R>(reader: R, prefix: String, sink: OutputSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    if let Err(err) = sink.write_prefixed(&prefix, &line) {
                        warn!(error = %err, "failed to write command output");
                        break;
                    }
                }
                Err(err) => {
                    debug!(error = %err, "output stream closed");
                    break;
                }
            }
        }
    })
}
