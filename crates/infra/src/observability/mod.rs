//! Tracing subscriber setup
//!
//! The engine itself only emits `tracing` events; binaries call
//! [`init_tracing`] once at startup to decide where they go.

pub mod logging;

pub use logging::{env_filter, init_tracing, LogConfig, LogFormat};
