//! The two network legs of a probe, as seen by the orchestrator.
//!
//! Implementations perform exactly one attempt per call. Retrying, skipping
//! and aborting are decided by the caller.

use async_trait::async_trait;

use crate::config::{Inbound, Outbound};

/// Submits a tagged probe message through an outbound relay.
#[async_trait]
pub trait Submit: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send one message whose `Subject` is exactly `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay could not be reached, refused the
    /// credentials, or rejected the message.
    async fn submit(&self, outbound: &Outbound, token: &str) -> Result<(), Self::Error>;
}

/// What a mailbox search for a probe token turned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Exactly one message carries the token.
    Found,
    /// No message carries the token.
    NotFound,
    /// More than one message carries the token. Indicates stale probes or a
    /// token collision rather than a delivery problem.
    Ambiguous(usize),
}

/// Looks for a probe in an inbound mailbox.
#[async_trait]
pub trait Verify: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Search the mailbox for a message whose `Subject` equals `token`.
    ///
    /// A single match is deleted unless `leave_message` is set. The mailbox
    /// session is closed before returning, whatever the result.
    ///
    /// # Errors
    ///
    /// Returns an error if any mailbox operation fails. No partial result is
    /// reported in that case.
    async fn verify(
        &self,
        inbound: &Inbound,
        token: &str,
        leave_message: bool,
    ) -> Result<Verification, Self::Error>;
}
