// src/guard/completion.rs

//! Single-slot rendezvous between a run task and the event loop.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Create the two ends for run `seq`.
pub fn run_completion(seq: u64) -> (RunSignal, RunCompletion) {
    let (tx, rx) = oneshot::channel();
    (
        RunSignal { seq, tx },
        RunCompletion {
            seq,
            rx,
            finished: false,
        },
    )
}

/// Held by the run task; consumed exactly once when the run is over.
///
/// Dropping it without calling [`complete`](Self::complete) (e.g. the run task
/// panicked) also releases the waiting side.
#[derive(Debug)]
pub struct RunSignal {
    seq: u64,
    tx: oneshot::Sender<u64>,
}

impl RunSignal {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn complete(self) {
        // The event loop may already be gone.
        let _ = self.tx.send(self.seq);
    }
}

/// Held by the event loop for the run in flight.
#[derive(Debug)]
pub struct RunCompletion {
    seq: u64,
    rx: oneshot::Receiver<u64>,
    finished: bool,
}

impl RunCompletion {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Non-blocking check.
    pub fn is_complete(&mut self) -> bool {
        if !self.finished {
            self.finished = !matches!(self.rx.try_recv(), Err(TryRecvError::Empty));
        }
        self.finished
    }

    /// Wait until the run signals completion. Cancel-safe.
    pub async fn wait(&mut self) {
        if !self.finished {
            let _ = (&mut self.rx).await;
            self.finished = true;
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`; returns whether
    /// the run completed.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> bool {
        let _ = tokio::time::timeout(timeout, self.wait()).await;
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_once_signalled() {
        let (signal, mut completion) = run_completion(7);
        assert_eq!(completion.seq(), 7);
        assert!(!completion.is_complete());
        assert!(!completion.wait_timeout(Duration::from_millis(20)).await);

        signal.complete();
        assert!(completion.wait_timeout(Duration::from_millis(20)).await);
        assert!(completion.is_complete());
        // Waiting again after completion returns immediately.
        completion.wait().await;
    }

    #[tokio::test]
    async fn dropped_signal_releases_waiter() {
        let (signal, mut completion) = run_completion(1);
        drop(signal);
        completion.wait().await;
        assert!(completion.is_complete());
    }
}
