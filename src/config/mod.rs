//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ListenConfig, DatabaseConfig)
//! - [`auth`]: Session and pairing lifetimes, admin bootstrap (AuthConfig, AdminBootstrap)
//! - [`defaults`]: serde default functions
//! - [`validation`]: startup checks

mod auth;
pub mod defaults;
mod types;
pub mod validation;

pub use auth::{AdminBootstrap, AuthConfig, PasswordScheme};
pub use types::{Config, ConfigError, DatabaseConfig, ListenConfig};
