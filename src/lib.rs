//! kcidb-cloud library crate.

/// Core library modules and APIs.
pub mod core;

/// CLI argument parsing (only when the `cli` feature is enabled).
#[cfg(feature = "cli")]
pub mod cli;

/// Command handlers and terminal rendering for the binary.
#[cfg(feature = "cli")]
pub mod app;

mod config;
mod error;

pub use config::*;
pub use error::*;
