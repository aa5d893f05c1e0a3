//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, or defaults)
//!     → overrides (PORT env var, CLI flags)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; grace period never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, Overrides};
pub use schema::{
    HealthConfig, ListenerConfig, LogFormat, ObservabilityConfig, ServerConfig, ShutdownConfig,
};
pub use validation::{validate_config, ValidationError};
