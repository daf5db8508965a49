//! CLI, MMP client, configuration
//!
//! This crate provides the `mediaferry` command-line interface: it uploads
//! media to a server, saves the processed results, and can run the server
//! itself.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod socket;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use socket::{MmpClient, UploadOutcome, result_file_name};
