//! Contract between the shutdown orchestrator and a serving engine.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrainError {
    #[error("graceful stop already in progress")]
    AlreadyStopping,
    #[error("serving engine exited without signaling drain completion")]
    EngineGone,
}

/// Outcome of a forced stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceStopReport {
    /// Connections cut while still open. Best effort.
    pub abandoned: u64,
}

/// A serving engine whose lifecycle the orchestrator can end.
pub trait DrainController: Send + Sync {
    /// Stop accepting new work and let in-flight work finish.
    ///
    /// Must not block. The returned completion resolves once the last
    /// in-flight handler finished and listening resources are released.
    /// Only the first call succeeds.
    fn begin_graceful_stop(&self) -> Result<DrainCompletion, DrainError>;

    /// Abort every connection and in-flight handler immediately.
    ///
    /// A no-op once the engine has drained.
    fn force_stop(&self) -> ForceStopReport;
}

/// Create the two ends of a drain signal.
pub fn drain_channel() -> (DrainNotifier, DrainReceiver) {
    let (tx, rx) = watch::channel(false);
    (DrainNotifier { tx }, DrainReceiver { rx })
}

/// Engine side: fires once everything is released.
#[derive(Debug)]
pub struct DrainNotifier {
    tx: watch::Sender<bool>,
}

impl DrainNotifier {
    pub fn notify(&self) {
        self.tx.send_replace(true);
    }
}

/// Controller side: observes the drain signal.
#[derive(Debug, Clone)]
pub struct DrainReceiver {
    rx: watch::Receiver<bool>,
}

impl DrainReceiver {
    pub fn is_drained(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn completion(&self) -> DrainCompletion {
        let mut rx = self.rx.clone();
        DrainCompletion {
            inner: Box::pin(async move {
                rx.wait_for(|drained| *drained)
                    .await
                    .map(|_| ())
                    .map_err(|_| DrainError::EngineGone)
            }),
        }
    }
}

/// One-shot future resolving when the engine has drained.
///
/// Resolves to [`DrainError::EngineGone`] if the notifier was dropped first.
pub struct DrainCompletion {
    inner: Pin<Box<dyn Future<Output = Result<(), DrainError>> + Send>>,
}

impl Future for DrainCompletion {
    type Output = Result<(), DrainError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for DrainCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainCompletion").finish_non_exhaustive()
    }
}
