//! Process-wide shutdown coordination.
//!
//! A [`Shutdown`] is held by whoever owns the process lifetime (the daemon or
//! a test). Every serving loop and every session receives a cloned
//! [`ShutdownListener`] and races its blocking waits against
//! [`ShutdownListener::recv`].

use tokio::sync::watch;

/// The trigger side. Dropping it does not signal shutdown.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// The observing side, cheap to clone into each task.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownListener {
    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested.
    ///
    /// Returns immediately if it already was. If the [`Shutdown`] is dropped
    /// without triggering, this never resolves.
    pub async fn recv(&mut self) {
        if self.rx.wait_for(|&stop| stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
