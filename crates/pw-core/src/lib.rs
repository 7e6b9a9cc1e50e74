//! Core configuration and errors shared across the pathwatch workspace.
//!
//! - [`Config`] and its sections ([`WatcherConfig`], [`LogConfig`])
//! - [`ConfigError`] for configuration loading and validation

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;

pub use config::{Config, LogConfig, WatcherConfig};
pub use error::ConfigError;
