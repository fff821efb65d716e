//! Error types for the IMAP client.

use mailprobe_common::error::ConnectionError;
use thiserror::Error;

use super::response::Status;

/// Errors that can occur when talking to an IMAP server.
#[derive(Error, Debug)]
pub enum ImapError {
    /// The underlying connection failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The server greeted with `BYE` or something that is not a greeting.
    #[error("Server refused the session: {0}")]
    Greeting(String),

    /// A command completed with `NO` or `BAD`.
    #[error("{command} failed: {status} {text}")]
    Rejected {
        command: &'static str,
        status: Status,
        text: String,
    },

    /// The server sent something this client cannot make sense of.
    #[error("Failed to parse IMAP response: {0}")]
    Parse(String),

    /// A command argument cannot be sent as an IMAP quoted string.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Specialized `Result` type for IMAP client operations.
pub type Result<T> = std::result::Result<T, ImapError>;
