//! Command line front end for Block Node upgrades
//!
//! This crate provides:
//! - `blocknode.toml` configuration loading with environment expansion
//! - the `upgrade`, `check` and `storage` commands
//! - exit code mapping for failed runs

pub mod cli;
pub mod config;

pub use cli::{exit_code, run, Cli, Command, Overrides};
pub use config::{Config, ConfigError};
