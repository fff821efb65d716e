//! Inbound leg of a mail probe: a minimal async IMAP client and the
//! [`ImapVerifier`] that uses it to find, and clean up, a probe message.

pub mod client;
mod verify;

pub use verify::{ImapVerifier, Step, VerifyError};
