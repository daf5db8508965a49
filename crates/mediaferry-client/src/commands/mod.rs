//! Subcommand implementations.

pub mod config;
pub mod ping;
pub mod server;
pub mod upload;
