//! Error types for the SMTP client.

use mailprobe_common::error::ConnectionError;
use thiserror::Error;

/// Errors that can occur when using the SMTP client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The underlying connection failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Failed to parse an SMTP response from the server.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
