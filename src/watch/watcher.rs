// src/watch/watcher.rs

use std::fmt;
use std::path::Path;
use std::time::Duration;

use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind};
use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::{GuardError, Result};
use crate::types::{Op, WatcherMode};
use crate::watch::GuardEvent;

/// Receiving ends of a backend: translated events and watcher errors.
#[derive(Debug)]
pub struct WatchStreams {
    pub events: mpsc::UnboundedReceiver<GuardEvent>,
    pub errors: mpsc::UnboundedReceiver<notify::Error>,
}

enum Inner {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

/// Owns the underlying `notify` watcher. Dropping it stops delivery, which
/// closes the event stream.
///
/// Paths are registered one by one and non-recursively; the guard session
/// decides which directories deserve a watch.
pub struct WatchBackend {
    inner: Inner,
}

impl fmt::Debug for WatchBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchBackend")
            .field("polling", &self.is_polling())
            .finish()
    }
}

impl WatchBackend {
    /// Create a backend. In [`WatcherMode::Auto`] a native watcher that cannot
    /// be created is replaced by a polling one.
    pub fn new(mode: WatcherMode, poll_interval: Duration) -> Result<(Self, WatchStreams)> {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();

        let inner = match mode {
            WatcherMode::Native => Inner::Native(native(&event_tx, &error_tx)?),
            WatcherMode::Poll => Inner::Poll(poll(&event_tx, &error_tx, poll_interval)?),
            WatcherMode::Auto => match native(&event_tx, &error_tx) {
                Ok(w) => Inner::Native(w),
                Err(err) => {
                    warn!(error = %err, "native file watching unavailable; falling back to polling");
                    Inner::Poll(poll(&event_tx, &error_tx, poll_interval)?)
                }
            },
        };

        let backend = Self { inner };
        info!(polling = backend.is_polling(), "file watcher created");
        Ok((backend, WatchStreams { events, errors }))
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.inner, Inner::Poll(_))
    }

    /// Watch `path` (a file, or a directory and its direct children).
    pub fn add(&mut self, path: &Path) -> Result<()> {
        match &mut self.inner {
            Inner::Native(w) => w.watch(path, RecursiveMode::NonRecursive)?,
            Inner::Poll(w) => w.watch(path, RecursiveMode::NonRecursive)?,
        }
        Ok(())
    }

    pub fn remove(&mut self, path: &Path) -> Result<()> {
        match &mut self.inner {
            Inner::Native(w) => w.unwatch(path)?,
            Inner::Poll(w) => w.unwatch(path)?,
        }
        Ok(())
    }
}

/// Closure called synchronously by notify whenever an event arrives.
fn handler(
    event_tx: &mpsc::UnboundedSender<GuardEvent>,
    error_tx: &mpsc::UnboundedSender<notify::Error>,
) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    let event_tx = event_tx.clone();
    let error_tx = error_tx.clone();
    move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for guard_event in translate(event) {
                // The receiver is gone once the session stops.
                if event_tx.send(guard_event).is_err() {
                    return;
                }
            }
        }
        Err(err) => {
            let _ = error_tx.send(err);
        }
    }
}

fn native(
    event_tx: &mpsc::UnboundedSender<GuardEvent>,
    error_tx: &mpsc::UnboundedSender<notify::Error>,
) -> Result<RecommendedWatcher> {
    RecommendedWatcher::new(handler(event_tx, error_tx), Config::default()).map_err(GuardError::from)
}

fn poll(
    event_tx: &mpsc::UnboundedSender<GuardEvent>,
    error_tx: &mpsc::UnboundedSender<notify::Error>,
    interval: Duration,
) -> Result<PollWatcher> {
    PollWatcher::new(
        handler(event_tx, error_tx),
        Config::default().with_poll_interval(interval),
    )
    .map_err(GuardError::from)
}

/// Map a raw notify event onto zero or more guard events (one per path).
pub(crate) fn translate(event: Event) -> Vec<GuardEvent> {
    let op = match event.kind {
        EventKind::Access(_) => return Vec::new(),
        EventKind::Create(_) => Op::Create,
        EventKind::Remove(_) => Op::Remove,
        EventKind::Modify(ModifyKind::Name(_)) => Op::Rename,
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)) => Op::Write,
        EventKind::Modify(ModifyKind::Metadata(_)) => Op::Chmod,
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => Op::Write,
    };
    let dir_hint = matches!(
        event.kind,
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
    );

    debug!(kind = ?event.kind, paths = ?event.paths, "notify event");

    event
        .paths
        .into_iter()
        .map(|path| {
            let is_dir = dir_hint || path.is_dir();
            GuardEvent { path, is_dir, op }
        })
        .collect()
}
