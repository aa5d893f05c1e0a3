//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking for drain)
//!     → Hand off to HTTP layer
//!
//! Connection States:
//!     Active → Draining → Closed
//!                 ↘ Abandoned (force stop)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked so drain completion is observable
//! - Dropping the listener is what stops new connections

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
