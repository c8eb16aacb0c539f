//! Request-scoped cancellation.
//!
//! A [`CancellationSource`] is held by whoever owns the request (typically the
//! transport layer); every hook and store call observes the paired
//! [`CancellationSignal`] through the request context.

use crate::error::{EngineError, EngineResult};
use std::future::Future;
use tokio::sync::watch;

/// Create a connected source/signal pair.
pub fn cancellation_pair() -> (CancellationSource, CancellationSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        CancellationSource { sender },
        CancellationSignal { receiver },
    )
}

/// Owning side: requests cancellation.
#[derive(Debug)]
pub struct CancellationSource {
    sender: watch::Sender<bool>,
}

impl CancellationSource {
    /// Signal cancellation to every clone of the paired signal.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Observing side: cheap to clone, passed through the pipeline.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    receiver: watch::Receiver<bool>,
}

impl CancellationSignal {
    /// A signal that is never cancelled.
    pub fn never() -> Self {
        let (_, signal) = cancellation_pair();
        signal
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Fail with [`EngineError::Cancelled`] once cancellation has been requested.
    pub fn ensure_active(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve when cancellation is requested. Pends forever if the source is
    /// dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Drive `operation` to completion unless cancellation arrives first.
    ///
    /// A cancelled operation is dropped at its current suspension point and
    /// reported as [`EngineError::Cancelled`].
    pub async fn guard<T, F>(&self, operation: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        self.ensure_active()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(EngineError::Cancelled),
            result = operation => result,
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::never()
    }
}
