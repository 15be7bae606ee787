// src/guard/session.rs

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::exec::{ExitOutcome, ProcessHandle, ProcessOptions, ProcessRunner};
use crate::matcher::Matcher;
use crate::types::StopPolicy;
use crate::walk::{WalkOptions, Walker};
use crate::watch::path_utils::relative_or_parent;
use crate::watch::{GuardEvent, WatchBackend, WatchStreams};

use super::completion::{run_completion, RunCompletion};
use super::core::{GuardCommand, GuardCore};
use super::template::{display_args, render_args, Trigger};
use super::{RunEvent, RunReport};

/// How many watched paths the registration summary names.
const SAMPLE_SIZE: usize = 10;

/// Everything a session needs to start a run.
#[derive(Debug, Clone)]
pub(crate) struct RunSettings {
    pub args: Vec<String>,
    pub process: ProcessOptions,
    pub clear_screen: bool,
    pub kill_timeout: Duration,
    pub stop_policy: StopPolicy,
    pub walk: WalkOptions,
}

struct InFlightRun {
    seq: u64,
    /// `None` when the program failed to start.
    handle: Option<ProcessHandle>,
    completion: RunCompletion,
}

/// Async IO shell around [`GuardCore`].
///
/// Owns the matcher and the watcher; the only code that touches them is the
/// session's own event loop, so the matcher's lazy caches need no lock.
pub(crate) struct Session {
    core: GuardCore,
    matcher: Matcher,
    backend: Option<WatchBackend>,
    streams: WatchStreams,
    runner: ProcessRunner,
    settings: RunSettings,
    in_flight: Option<InFlightRun>,
    watched: HashSet<PathBuf>,
    run_events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("core", &self.core)
            .field("root", &self.matcher.root())
            .field("watched", &self.watched.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(
        core: GuardCore,
        matcher: Matcher,
        backend: WatchBackend,
        streams: WatchStreams,
        runner: ProcessRunner,
        settings: RunSettings,
        run_events: Option<mpsc::UnboundedSender<RunEvent>>,
    ) -> Self {
        Self {
            core,
            matcher,
            backend: Some(backend),
            streams,
            runner,
            settings,
            in_flight: None,
            watched: HashSet::new(),
            run_events,
        }
    }

    /// Idle → Watching: register watches and launch the initial run.
    pub(crate) async fn start(&mut self) {
        for command in self.core.start() {
            self.execute(command).await;
        }
    }

    /// Main event loop.
    ///
    /// Waits on three sources at once: translated watch events, watcher
    /// errors, and the stop request. Returns once stopped or once the watch
    /// stream closes.
    pub(crate) async fn run(mut self, mut stop_rx: oneshot::Receiver<StopPolicy>) -> Result<()> {
        info!(root = ?self.matcher.root(), "guard watching");

        loop {
            tokio::select! {
                maybe = self.streams.events.recv() => {
                    let Some(event) = maybe else {
                        info!("watch event stream closed; exiting");
                        break;
                    };
                    self.handle_event(event).await;
                }
                Some(err) = self.streams.errors.recv() => {
                    warn!(error = %err, "file watch error");
                }
                request = &mut stop_rx => {
                    // A dropped handle counts as a stop with the configured policy.
                    let policy = request.unwrap_or(self.settings.stop_policy);
                    info!(?policy, "guard stopping");
                    for command in self.core.stop(policy) {
                        self.execute(command).await;
                    }
                    break;
                }
            }
        }

        debug!(runs = self.core.runs_started(), "guard event loop finished");
        Ok(())
    }

    async fn handle_event(&mut self, event: GuardEvent) {
        let result = match self.matcher.is_match(&event.path, event.is_dir) {
            Ok(result) => result,
            Err(err) => {
                warn!(path = ?event.path, error = %err, "skipping event");
                return;
            }
        };
        debug!(?event, ?result, "classified event");

        for command in self.core.on_event(event, result, Instant::now()) {
            self.execute(command).await;
        }
    }

    async fn execute(&mut self, command: GuardCommand) {
        match command {
            GuardCommand::RegisterRoot => {
                let root = self.matcher.root().to_path_buf();
                self.register_tree(&root);
                for path in self.matcher.external_literals() {
                    self.add_watch(path);
                }
            }
            GuardCommand::RegisterTree(dir) => self.register_tree(&dir),
            GuardCommand::RegisterFile(path) => {
                if let Some(parent) = path.parent() {
                    self.add_watch(parent.to_path_buf());
                }
            }
            GuardCommand::ForgetPath(path) => self.forget(&path),
            GuardCommand::StopPrevious { seq } => self.stop_previous(seq).await,
            GuardCommand::StartRun { seq, trigger } => self.start_run(seq, trigger).await,
            GuardCommand::CloseWatcher => {
                self.backend = None;
                self.watched.clear();
            }
        }
    }

    /// Walk `dir` and watch every directory that was not pruned.
    fn register_tree(&mut self, dir: &Path) {
        let opts = WalkOptions {
            all_dirs: true,
            ..self.settings.walk
        };

        let mut dirs = Vec::new();
        let mut matched = Vec::new();
        for entry in Walker::under(&mut self.matcher, dir, opts) {
            match entry {
                Ok(entry) => {
                    if entry.matched {
                        matched.push(entry.path.clone());
                    }
                    if entry.is_dir {
                        dirs.push(entry.path);
                    }
                }
                Err(err) => warn!(dir = ?dir, error = %err, "walk error during registration"),
            }
        }

        let before = self.watched.len();
        for path in dirs {
            self.add_watch(path);
        }

        let mut sample: Vec<String> = matched
            .iter()
            .take(SAMPLE_SIZE)
            .filter_map(|p| self.matcher.relative(p))
            .collect();
        if matched.len() > SAMPLE_SIZE {
            sample.push("...".to_string());
        }
        info!(
            dir = ?dir,
            count = matched.len(),
            watches = self.watched.len() - before,
            sample = %sample.join(", "),
            "registered paths"
        );
    }

    fn add_watch(&mut self, path: PathBuf) {
        if self.watched.contains(&path) {
            return;
        }
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        match backend.add(&path) {
            Ok(()) => {
                self.watched.insert(path);
            }
            Err(err) => warn!(path = ?path, error = %err, "cannot watch path"),
        }
    }

    fn forget(&mut self, path: &Path) {
        let gone: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        for p in gone {
            self.watched.remove(&p);
            if let Some(backend) = self.backend.as_mut() {
                // The OS usually dropped the watch already.
                if let Err(err) = backend.remove(&p) {
                    debug!(path = ?p, error = %err, "unwatch failed");
                }
            }
        }
    }

    /// Kill the in-flight run's process tree and wait for its completion
    /// signal. Returns only after the signal arrived.
    ///
    /// The group is signalled even when the leader already exited: background
    /// children it left behind still belong to that group.
    async fn stop_previous(&mut self, seq: u64) {
        let Some(mut run) = self.in_flight.take() else {
            return;
        };
        if run.seq != seq {
            debug!(expected = seq, in_flight = run.seq, "stopping a different run than requested");
        }
        let complete = run.completion.is_complete();

        if let Some(handle) = run.handle {
            if complete {
                debug!(seq = run.seq, pgid = handle.pid(), "reaping leftovers of previous run");
            } else {
                info!(seq = run.seq, pid = handle.pid(), "killing previous run");
            }
            if let Err(err) = handle.kill_tree() {
                warn!(seq = run.seq, error = %err, "kill failed");
            }
        }

        if complete || run.completion.wait_timeout(self.settings.kill_timeout).await {
            return;
        }

        warn!(
            seq = run.seq,
            timeout = ?self.settings.kill_timeout,
            "previous run still alive; forcing kill"
        );
        if let Some(handle) = run.handle {
            if let Err(err) = handle.force_kill_tree() {
                warn!(seq = run.seq, error = %err, "forced kill failed");
            }
        }
        run.completion.wait().await;
    }

    async fn start_run(&mut self, seq: u64, trigger: Option<GuardEvent>) {
        if self.settings.clear_screen {
            clear_screen();
        }

        // External literals live outside the root and render as `../...`.
        let trigger = trigger.map(|event| Trigger {
            rel_path: relative_or_parent(self.matcher.root(), &event.path),
            abs_path: event.path,
            op: event.op,
        });
        let args = render_args(&self.settings.args, trigger.as_ref());

        info!(
            seq,
            args = %display_args(&args),
            trigger = trigger.as_ref().map(|t| t.rel_path.as_str()).unwrap_or(""),
            "run started"
        );
        self.notify(RunEvent::Started {
            seq,
            args: args.clone(),
        });

        let (signal, completion) = run_completion(seq);

        match self.runner.spawn(&args, &self.settings.process).await {
            Ok(process) => {
                let handle = process.handle();
                let run_events = self.run_events.clone();
                tokio::spawn(async move {
                    let outcome = process.wait().await.map_err(|e| e.to_string());
                    log_finished(seq, &args, &outcome);
                    if let Some(tx) = run_events {
                        let _ = tx.send(RunEvent::Finished(RunReport { seq, args, outcome }));
                    }
                    signal.complete();
                });
                self.in_flight = Some(InFlightRun {
                    seq,
                    handle: Some(handle),
                    completion,
                });
            }
            Err(err) => {
                let outcome = Err(err.to_string());
                log_finished(seq, &args, &outcome);
                self.notify(RunEvent::Finished(RunReport { seq, args, outcome }));
                signal.complete();
                self.in_flight = Some(InFlightRun {
                    seq,
                    handle: None,
                    completion,
                });
            }
        }
    }

    fn notify(&self, event: RunEvent) {
        if let Some(tx) = &self.run_events {
            let _ = tx.send(event);
        }
    }
}

fn log_finished(seq: u64, args: &[String], outcome: &std::result::Result<ExitOutcome, String>) {
    match outcome {
        Ok(exit) if exit.success => info!(seq, success = true, "run finished"),
        Ok(exit) => warn!(
            seq,
            success = false,
            code = exit.code.unwrap_or(-1),
            args = %display_args(args),
            "run failed"
        ),
        Err(err) => error!(
            seq,
            success = false,
            error = %err,
            args = %display_args(args),
            "run failed"
        ),
    }
}

fn clear_screen() {
    if let Err(err) = execute!(std::io::stdout(), Clear(ClearType::All), MoveTo(0, 0)) {
        debug!(error = %err, "cannot clear screen");
    }
}
