//! Typed configuration for Janus.
//!
//! A Janus process runs an RPC listener and an HTTP listener side by side.
//! This crate holds everything both listeners are configured with:
//!
//! - [`ServiceSection`] - logical service name, registry address, shutdown bounds
//! - [`GrpcSection`] - RPC host/port, keep-alive, registry health-check timings
//! - [`HttpSection`] - HTTP host/port, TLS, entry prefix, plugins, response cache
//! - [`LoggingSection`] - log level and output format
//!
//! Both ports default to `0`. A port of `0` disables that listener; with both
//! disabled the server does nothing and returns immediately.
//!
//! # Example
//!
//! ```no_run
//! use janus_config::ConfigLoader;
//!
//! # fn main() -> Result<(), janus_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("janus.toml")?
//!     .with_env_prefix("JANUS")
//!     .load()?;
//!
//! println!("HTTP port: {}", config.http.port);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [service]
//! name = "orders"
//! registry_address = "http://127.0.0.1:8500"
//!
//! [grpc]
//! port = 9090
//! keep_alive_secs = 60
//!
//! [http]
//! port = 8080
//! entry = "/api"
//!
//! [http.cache]
//! kind = "memory"
//! ttl_secs = 30
//!
//! [[http.plugins]]
//! name = "cache"
//! paths = ["/orders/list"]
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables, e.g.
//! `JANUS__HTTP__PORT=8081` or `JANUS__SERVICE__NAME=orders`.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::JanusConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
