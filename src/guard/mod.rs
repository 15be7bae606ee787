// src/guard/mod.rs

//! Watch a pattern set and restart a command whenever a matching path
//! changes.
//!
//! - [`core`] is the pure state machine (debounce, restart sequencing).
//! - `session` is the async shell that owns the matcher, the watcher and the
//!   run in flight.
//! - [`completion`] is the rendezvous that keeps two runs from overlapping.
//! - [`template`] substitutes `{{path}}`/`{{op}}`/`{{file}}` per run.

pub mod completion;
pub mod core;
mod session;
pub mod template;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::{GuardError, Result};
use crate::exec::{default_prefix, format_prefix, ExitOutcome, ProcessOptions, ProcessRunner};
use crate::matcher::{default_patterns, Matcher};
use crate::types::{StopPolicy, WatcherMode};
use crate::walk::WalkOptions;
use crate::watch::WatchBackend;

use self::core::GuardCore;
use session::{RunSettings, Session};

/// Options for one guarded command.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Watch root; also the working directory of every run.
    pub dir: PathBuf,
    /// Output prefix, optionally with a colour: `"app |@green"`.
    pub prefix: Option<String>,
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub no_init_run: bool,
    pub clear_screen: bool,
    pub raw: bool,
    pub watcher: WatcherMode,
    pub stop_policy: StopPolicy,
    /// Grace period between the polite and the forced kill.
    pub kill_timeout: Duration,
    pub env: Vec<(String, String)>,
    pub follow_links: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            prefix: None,
            poll_interval: Duration::from_millis(300),
            debounce: Duration::from_millis(300),
            no_init_run: false,
            clear_screen: false,
            raw: false,
            watcher: WatcherMode::Auto,
            stop_policy: StopPolicy::LetFinish,
            kill_timeout: Duration::from_secs(5),
            env: Vec::new(),
            follow_links: false,
        }
    }
}

/// Progress notifications for embedders and tests.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Started { seq: u64, args: Vec<String> },
    Finished(RunReport),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub seq: u64,
    pub args: Vec<String>,
    /// Exit status, or the reason the run could not be started or reaped.
    pub outcome: std::result::Result<ExitOutcome, String>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        matches!(self.outcome, Ok(ExitOutcome { success: true, .. }))
    }
}

/// A guarded command that has not been started yet.
#[derive(Debug)]
pub struct Guard {
    args: Vec<String>,
    patterns: Vec<String>,
    config: GuardConfig,
    runner: ProcessRunner,
    run_events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl Guard {
    /// `patterns` empty means [`default_patterns`].
    pub fn new(args: Vec<String>, patterns: Vec<String>, config: GuardConfig) -> Self {
        Self {
            args,
            patterns,
            config,
            runner: ProcessRunner::new(),
            run_events: None,
        }
    }

    /// Use a shared runner (one output sink and raw-terminal lock for
    /// several guards).
    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Subscribe to run notifications. Call before [`start`](Self::start).
    pub fn run_events(&mut self) -> mpsc::UnboundedReceiver<RunEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.run_events = Some(tx);
        rx
    }

    /// Build the matcher, register watches and launch the event loop.
    ///
    /// Matcher failures (bad root, bad glob, git unavailable for the VCS
    /// sentinel) are returned here and nothing is watched.
    pub async fn start(self) -> Result<GuardHandle> {
        if self.args.first().is_none_or(|p| p.is_empty()) {
            return Err(GuardError::ConfigError("guard needs a command to run".to_string()));
        }

        let patterns = if self.patterns.is_empty() {
            default_patterns()
        } else {
            self.patterns
        };
        let matcher = Matcher::new(&self.config.dir, &patterns)?;
        let root = matcher.root().to_path_buf();

        let (backend, streams) = WatchBackend::new(self.config.watcher, self.config.poll_interval)?;

        let prefix = match &self.config.prefix {
            Some(spec) => format_prefix(spec),
            None => default_prefix(&self.args),
        };
        let settings = RunSettings {
            args: self.args,
            process: ProcessOptions {
                dir: Some(root.clone()),
                env: self.config.env.clone(),
                clear_env: false,
                prefix,
                raw: self.config.raw,
            },
            clear_screen: self.config.clear_screen,
            kill_timeout: self.config.kill_timeout,
            stop_policy: self.config.stop_policy,
            walk: WalkOptions {
                follow_links: self.config.follow_links,
                ..WalkOptions::default()
            },
        };

        info!(root = ?root, patterns = ?patterns, args = ?settings.args, "starting guard");

        let core = GuardCore::new(self.config.debounce, self.config.no_init_run);
        let mut session = Session::new(
            core,
            matcher,
            backend,
            streams,
            self.runner,
            settings,
            self.run_events,
        );
        session.start().await;

        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(session.run(stop_rx));

        Ok(GuardHandle {
            stop_tx: Some(stop_tx),
            stop_policy: self.config.stop_policy,
            join,
        })
    }

    /// Start, then run until `stop` resolves.
    pub async fn run_until<F>(self, stop: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut handle = self.start().await?;
        stop.await;
        handle.stop();
        handle.wait().await
    }
}

/// Handle to a running guard.
#[derive(Debug)]
pub struct GuardHandle {
    stop_tx: Option<oneshot::Sender<StopPolicy>>,
    stop_policy: StopPolicy,
    join: JoinHandle<Result<()>>,
}

impl GuardHandle {
    /// Stop with the configured [`StopPolicy`].
    pub fn stop(&mut self) {
        self.stop_with(self.stop_policy);
    }

    pub fn stop_with(&mut self, policy: StopPolicy) {
        if let Some(tx) = self.stop_tx.take() {
            if tx.send(policy).is_err() {
                debug!("guard already stopped");
            }
        }
    }

    /// Wait for the event loop to finish.
    pub async fn wait(self) -> Result<()> {
        // Keep the stop sender alive: dropping it stops the guard.
        let GuardHandle { stop_tx, join, .. } = self;
        let res = join.await;
        drop(stop_tx);
        match res {
            Ok(res) => res,
            Err(err) => Err(GuardError::Other(anyhow::anyhow!("guard task failed: {err}"))),
        }
    }

    pub async fn stop_and_wait(mut self) -> Result<()> {
        self.stop();
        self.wait().await
    }
}

/// Guard `args` until Ctrl-C.
pub async fn guard(args: Vec<String>, patterns: Vec<String>, config: GuardConfig) -> Result<()> {
    Guard::new(args, patterns, config)
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
}
