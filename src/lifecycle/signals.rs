//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for the configured termination signals at startup
//! - Turn the first delivery into a single [`ShutdownSignal`]
//! - Hand the signals back to the OS default action afterwards
//!
//! # Design Decisions
//! - Handlers are installed when the listener is built, so a signal that
//!   arrives before anyone waits is still delivered
//! - A second SIGTERM/SIGINT kills the process with the default action;
//!   this is the operator's escape hatch for a hung drain

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook_tokio::Signals;

/// Signal classes that may be mapped to shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Interrupt,
    Terminate,
    Hangup,
    Quit,
}

impl SignalKind {
    pub fn as_raw(self) -> i32 {
        match self {
            SignalKind::Interrupt => SIGINT,
            SignalKind::Terminate => SIGTERM,
            SignalKind::Hangup => SIGHUP,
            SignalKind::Quit => SIGQUIT,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            SIGINT => Some(SignalKind::Interrupt),
            SIGTERM => Some(SignalKind::Terminate),
            SIGHUP => Some(SignalKind::Hangup),
            SIGQUIT => Some(SignalKind::Quit),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SignalKind::Interrupt => "SIGINT",
            SignalKind::Terminate => "SIGTERM",
            SignalKind::Hangup => "SIGHUP",
            SignalKind::Quit => "SIGQUIT",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One-shot request to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSignal {
    source: Option<SignalKind>,
}

impl ShutdownSignal {
    pub fn from_kind(kind: SignalKind) -> Self {
        Self { source: Some(kind) }
    }

    /// A shutdown requested from inside the process.
    pub fn manual() -> Self {
        Self { source: None }
    }

    pub fn source(&self) -> Option<SignalKind> {
        self.source
    }
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.source {
            Some(kind) => write!(f, "{}", kind),
            None => f.write_str("manual"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("no termination signals configured")]
    Empty,
    #[error("failed to register handler for {kind}: {source}")]
    Register {
        kind: SignalKind,
        #[source]
        source: std::io::Error,
    },
}

/// Listens for the first termination request.
pub struct SignalListener {
    signals: Signals,
    kinds: Vec<SignalKind>,
    fired: Arc<AtomicBool>,
}

impl SignalListener {
    /// Install handlers for `kinds`. Fails if none are given or registration fails.
    pub fn new(kinds: &[SignalKind]) -> Result<Self, SignalError> {
        if kinds.is_empty() {
            return Err(SignalError::Empty);
        }

        let fired = Arc::new(AtomicBool::new(false));
        for &kind in kinds {
            // Order matters: the default action checks the flag before the
            // second handler sets it, so only a later delivery terminates.
            signal_hook::flag::register_conditional_default(kind.as_raw(), Arc::clone(&fired))
                .map_err(|source| SignalError::Register { kind, source })?;
            signal_hook::flag::register(kind.as_raw(), Arc::clone(&fired))
                .map_err(|source| SignalError::Register { kind, source })?;
        }

        let raw: Vec<i32> = kinds.iter().map(|k| k.as_raw()).collect();
        let signals = Signals::new(&raw).map_err(|source| SignalError::Register {
            kind: kinds[0],
            source,
        })?;

        tracing::debug!(signals = ?kinds, "Termination signal handlers installed");

        Ok(Self {
            signals,
            kinds: kinds.to_vec(),
            fired,
        })
    }

    pub fn kinds(&self) -> &[SignalKind] {
        &self.kinds
    }

    /// Wait for the first termination request.
    ///
    /// Consumes the listener; any later request runs the OS default action.
    pub async fn wait_for_termination(self) -> ShutdownSignal {
        self.wait_for_termination_or(std::future::pending()).await
    }

    /// Wait for the first termination request or `trigger`, whichever
    /// comes first.
    ///
    /// Either way the listener is disarmed afterwards, so a signal arriving
    /// during shutdown runs the OS default action.
    pub async fn wait_for_termination_or<F>(mut self, trigger: F) -> ShutdownSignal
    where
        F: Future<Output = ShutdownSignal>,
    {
        let first = tokio::select! {
            received = self.signals.next() => Ok(received),
            signal = trigger => Err(signal),
        };
        self.disarm();

        let received = match first {
            Ok(received) => received,
            Err(signal) => {
                tracing::info!(signal = %signal, "Shutdown triggered");
                return signal;
            }
        };

        match received.and_then(SignalKind::from_raw) {
            Some(kind) => {
                tracing::info!(signal = %kind, "Termination signal received");
                ShutdownSignal::from_kind(kind)
            }
            None => {
                tracing::warn!("Signal stream closed; shutting down");
                ShutdownSignal::manual()
            }
        }
    }

    fn disarm(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.signals.handle().close();
    }
}

impl std::fmt::Debug for SignalListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalListener")
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}
