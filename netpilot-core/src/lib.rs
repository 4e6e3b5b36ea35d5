//! Core library for the netpilot connection manager.
//! This crate defines the interface traits and the data model, the two
//! interface backends (shell-out and ioctl), the connection engine, and the
//! daemon-level policy that decides when and where to connect.

pub mod autoconnect;
pub mod backends;
pub mod config;
pub mod connect;
pub mod controller;
pub mod daemon;
pub mod monitor;
pub mod parsing;
pub mod profile;
pub mod scan;
pub mod status;
pub mod traits;
pub mod types;
pub mod web_server;

// Define a shared Error and Result type for the entire crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No {0} backend is loaded")]
    NoBackend(&'static str),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Scan generation {held} is stale (current is {current})")]
    StaleScan { held: u64, current: u64 },

    #[error("No network at index {0} in the current scan")]
    UnknownNetwork(usize),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Profile store error: {0}")]
    ProfileStore(String),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Web server error: {0}")]
    WebServer(#[from] axum::BoxError),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A specialized `Result` type for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;
