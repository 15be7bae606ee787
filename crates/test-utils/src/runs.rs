#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kitguard::guard::{RunEvent, RunReport};
use tokio::sync::mpsc;

/// In-memory writer for capturing guarded-command output.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("buffer poisoned")).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("buffer poisoned").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Collect every run event that arrives within `window`.
pub async fn collect_runs_for(
    rx: &mut mpsc::UnboundedReceiver<RunEvent>,
    window: Duration,
) -> Vec<RunEvent> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Some(ev)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        events.push(ev);
    }
    events
}

/// Wait (up to 10 s) for the next `Started` event; returns `(seq, args)`.
pub async fn next_started(rx: &mut mpsc::UnboundedReceiver<RunEvent>) -> (u64, Vec<String>) {
    loop {
        match recv(rx).await {
            RunEvent::Started { seq, args } => return (seq, args),
            RunEvent::Finished(_) => continue,
        }
    }
}

/// Wait (up to 10 s) for the next `Finished` event.
pub async fn next_finished(rx: &mut mpsc::UnboundedReceiver<RunEvent>) -> RunReport {
    loop {
        match recv(rx).await {
            RunEvent::Finished(report) => return report,
            RunEvent::Started { .. } => continue,
        }
    }
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<RunEvent>) -> RunEvent {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for a run event")
        .expect("run event channel closed")
}

/// Number of `Started` events in `events`.
pub fn started_count(events: &[RunEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, RunEvent::Started { .. }))
        .count()
}
