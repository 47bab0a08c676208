use std::{sync::Arc, time::Duration};

use tokio::sync::{mpsc, watch};

/// Tracks live connection handlers so the relay can tell them to stop and
/// wait for them to finish.
///
/// Every [`DrainHandle`] holds a sender clone; once they are all dropped the
/// receiver observes the channel closing.
pub(crate) struct Drain {
    signal: Arc<watch::Sender<bool>>,
    guard: mpsc::Sender<()>,
    done: mpsc::Receiver<()>,
}

/// Tells handlers to stop without waiting for them.
pub(crate) struct DrainTrigger(Arc<watch::Sender<bool>>);

#[derive(Clone)]
pub(crate) struct DrainHandle {
    signal: watch::Receiver<bool>,
    _guard: mpsc::Sender<()>,
}

impl Drain {
    pub(crate) fn new() -> Self {
        let (signal, _) = watch::channel(false);
        let (guard, done) = mpsc::channel(1);
        Self {
            signal: Arc::new(signal),
            guard,
            done,
        }
    }

    pub(crate) fn handle(&self) -> DrainHandle {
        DrainHandle {
            signal: self.signal.subscribe(),
            _guard: self.guard.clone(),
        }
    }

    pub(crate) fn trigger(&self) -> DrainTrigger {
        DrainTrigger(Arc::clone(&self.signal))
    }

    /// Signals every handler and waits up to `grace` for them to exit.
    ///
    /// Returns `false` when handlers were still running at the deadline.
    pub(crate) async fn finish(self, grace: Duration) -> bool {
        let Drain {
            signal,
            guard,
            mut done,
        } = self;
        signal.send_replace(true);
        drop(guard);
        tokio::time::timeout(grace, done.recv()).await.is_ok()
    }
}

impl DrainTrigger {
    pub(crate) fn fire(&self) {
        self.0.send_replace(true);
    }
}

impl DrainHandle {
    /// Resolves once shutdown has been requested.
    pub(crate) async fn cancelled(&mut self) {
        let _ = self.signal.wait_for(|stopping| *stopping).await;
    }
}
