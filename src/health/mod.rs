//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     configured service names → set_status(SERVING)
//!
//! Shutdown orchestrator:
//!     set_status(NOT_SERVING) per service → shutdown() latch
//!
//! Readers (http/health.rs, watchers):
//!     status(name) / subscribe(name)
//! ```
//!
//! # Design Decisions
//! - One watch channel per service name, held in a sharded map
//! - Unknown names auto-register with UNKNOWN as prior state
//! - After shutdown() the table never goes back to SERVING

pub mod reporter;
pub mod state;

pub use reporter::HealthReporter;
pub use state::HealthStatus;
