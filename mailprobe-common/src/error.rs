//! Error types shared across the mailprobe crates.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

use crate::secret::Leg;

/// A required field that was absent or blank in a test definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    /// Name of the test, possibly empty.
    pub test: String,
    /// One-based position of the test in the configuration.
    pub position: usize,
    /// Configuration key of the missing field.
    pub field: &'static str,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "test '{}' (#{}): {} is not specified",
            self.test, self.position, self.field
        )
    }
}

fn join_missing(fields: &[MissingField]) -> String {
    fields
        .iter()
        .map(|field| format!("\n  - {field}"))
        .collect()
}

/// Errors raised while loading or validating a run configuration.
///
/// Every variant is fatal to the run and is surfaced before any probe is sent.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML or has the wrong shape.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// One or more required fields are missing. Lists all of them.
    #[error("Invalid configuration:{}", join_missing(.0))]
    Missing(Vec<MissingField>),

    /// A secret had to be prompted for but there is no terminal to ask on.
    #[error("{leg} password for {login} is not configured and no terminal is available to ask for it")]
    NoTerminal { leg: Leg, login: String },

    /// A secret was supplied but is empty.
    #[error("Test '{test}': {leg} password must not be empty")]
    EmptySecret { test: String, leg: Leg },

    /// Reading a secret from the terminal failed.
    #[error("Failed to read password: {0}")]
    Prompt(#[source] io::Error),
}

/// Errors raised by the shared client connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TLS setup or handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The peer closed the connection.
    #[error("Connection closed unexpectedly")]
    Closed,
}
