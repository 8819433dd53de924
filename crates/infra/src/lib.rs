//! # Rampart Infrastructure
//!
//! Bootstrap code around the `rampart-common` resilience engine.
//!
//! This crate contains:
//! - Configuration loading (environment variables, TOML/JSON files)
//! - Registry construction from loaded configuration
//! - Tracing subscriber setup
//!
//! ```rust,no_run
//! let config = rampart_infra::config::load()?;
//! rampart_infra::observability::init_tracing(&config.log)?;
//! let registry = rampart_infra::build_registry(&config)?;
//! # Ok::<(), rampart_infra::InfraError>(())
//! ```

pub mod config;
pub mod errors;
pub mod observability;

// Re-export commonly used items
pub use config::{build_registry, ResilienceConfig};
pub use errors::{InfraError, Result};
