//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Register signals → Bind listener → Spawn engine → Mark SERVING
//!
//! Shutdown (shutdown.rs):
//!     Signal received → NOT_SERVING → Begin graceful stop
//!         → drained within grace period  → Drained
//!         → grace period elapsed         → Force stop → Forced
//!     → Terminated
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → one ShutdownSignal
//!     second signal → default OS action (immediate exit)
//! ```
//!
//! # Design Decisions
//! - Ordered startup: signals first, then listener, then health
//! - Health flips before the drain starts
//! - Shutdown has one timeout; forced stop after the deadline
//! - Shutdown is never retried or rolled back

pub mod drain;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use drain::{drain_channel, DrainCompletion, DrainController, DrainError, DrainNotifier, DrainReceiver, ForceStopReport};
pub use shutdown::{ShutdownOrchestrator, ShutdownOutcome, ShutdownReport, ShutdownState};
pub use signals::{ShutdownSignal, SignalError, SignalKind, SignalListener};
pub use startup::{start, RunningServer, StartupError};
