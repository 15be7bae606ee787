// src/exec/pty.rs

//! Raw-mode runs: the command gets a pseudo-terminal, the controlling
//! terminal is switched to raw mode, and stdin is proxied to the pty.

use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossterm::terminal;
use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use tokio::sync::{oneshot, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::errors::{GuardError, Result};
use crate::exec::kill::ProcessHandle;
use crate::exec::output::{OutputSink, PrefixWriter};
use crate::exec::runner::{ExitOutcome, ProcessOptions, RunningProcess};

type StdinTarget = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

/// The controlling terminal, shared by every runner clone.
///
/// Only one raw session may exist at a time; `lock` enforces that. A single
/// thread forwards stdin to whichever pty is currently attached.
#[derive(Clone, Default)]
pub(crate) struct RawTerminal {
    lock: Arc<tokio::sync::Mutex<()>>,
    stdin_target: StdinTarget,
    stdin_started: Arc<AtomicBool>,
}

impl fmt::Debug for RawTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTerminal").finish_non_exhaustive()
    }
}

impl RawTerminal {
    fn attach_stdin(&self, writer: Box<dyn Write + Send>) {
        *lock(&self.stdin_target) = Some(writer);

        if !self.stdin_started.swap(true, Ordering::SeqCst) {
            let target = Arc::clone(&self.stdin_target);
            std::thread::spawn(move || forward_stdin(target));
        }
    }

    fn detach_stdin(&self) {
        *lock(&self.stdin_target) = None;
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn forward_stdin(target: StdinTarget) {
    let mut stdin = std::io::stdin();
    let mut buf = [0u8; 1024];
    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        if let Some(writer) = lock(&target).as_mut() {
            let _ = writer.write_all(&buf[..n]).and_then(|_| writer.flush());
        }
    }
}

/// Puts the terminal in raw mode for as long as it lives.
struct RawModeGuard {
    _lock: OwnedMutexGuard<()>,
}

impl RawModeGuard {
    fn enable(lock: OwnedMutexGuard<()>) -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self { _lock: lock })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = terminal::disable_raw_mode() {
            warn!(error = %err, "failed to restore terminal mode");
        }
    }
}

fn current_size() -> PtySize {
    let (cols, rows) = terminal::size().unwrap_or((80, 24));
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

pub(crate) async fn spawn_raw(
    args: &[String],
    opts: &ProcessOptions,
    sink: OutputSink,
    term: &RawTerminal,
) -> Result<RunningProcess> {
    let program = args.first().cloned().unwrap_or_default();
    let spawn_err = |reason: String| GuardError::Spawn {
        program: program.clone(),
        reason,
    };

    let exclusive = Arc::clone(&term.lock).lock_owned().await;

    let pair = native_pty_system()
        .openpty(current_size())
        .map_err(|e| spawn_err(format!("cannot open pty: {e}")))?;

    let mut cmd = CommandBuilder::new(&program);
    cmd.args(&args[1..]);
    if let Some(dir) = &opts.dir {
        cmd.cwd(dir);
    }
    if opts.clear_env {
        cmd.env_clear();
    }
    for (k, v) in &opts.env {
        cmd.env(k, v);
    }

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| spawn_err(e.to_string()))?;
    drop(pair.slave);

    let pid = child
        .process_id()
        .ok_or_else(|| spawn_err("pty child has no pid".to_string()))?;
    debug!(pid, program = %program, "spawned raw process");

    let mut reader = pair.master.try_clone_reader()?;
    let writer = pair.master.take_writer()?;
    let raw = RawModeGuard::enable(exclusive)?;
    term.attach_stdin(writer);

    let prefix = opts.prefix.clone();
    let output = std::thread::spawn(move || {
        let mut out = PrefixWriter::new(sink, prefix);
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if out.write_all(&buf[..n]).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let (stop_resize, resize_done) = oneshot::channel::<()>();
    let master = follow_resizes(pair.master, resize_done);

    let term = term.clone();
    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(async move {
        let status = tokio::task::spawn_blocking(move || child.wait()).await;

        let _ = stop_resize.send(());
        // Closing the master lets the output thread see EOF.
        if let Ok(master) = master.await {
            drop(master);
        }
        let _ = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            tokio::task::spawn_blocking(move || output.join()),
        )
        .await;

        term.detach_stdin();
        drop(raw);

        let outcome = match status {
            Ok(Ok(status)) => Ok(ExitOutcome {
                code: i32::try_from(status.exit_code()).ok(),
                success: status.success(),
            }),
            Ok(Err(err)) => Err(GuardError::from(err)),
            Err(join) => Err(GuardError::Other(anyhow::anyhow!("wait task failed: {join}"))),
        };
        let _ = done_tx.send(outcome);
    });

    Ok(RunningProcess::new(ProcessHandle::new(pid), done_rx))
}

/// Keep the pty size in step with the terminal until `stop` fires, then hand
/// the master back.
fn follow_resizes(
    master: Box<dyn MasterPty + Send>,
    mut stop: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<Box<dyn MasterPty + Send>> {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::window_change()) {
                Ok(mut winch) => loop {
                    tokio::select! {
                        _ = &mut stop => break,
                        Some(()) = winch.recv() => {
                            if let Err(err) = master.resize(current_size()) {
                                debug!(error = %err, "pty resize failed");
                            }
                        }
                    }
                },
                Err(err) => {
                    debug!(error = %err, "cannot listen for window changes");
                    let _ = stop.await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = stop.await;
        }
        master
    })
}
