//! Logging bootstrap for Janus services.
//!
//! Every Janus component logs through `tracing` macros with structured
//! fields. This crate installs the process-wide subscriber:
//!
//! - JSON lines by default, for log collectors
//! - Pretty output for local development
//! - `EnvFilter` directives for per-module levels
//!
//! # Example
//!
//! ```rust,ignore
//! use janus_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default())?;
//! tracing::info!("ready");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, flush, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
