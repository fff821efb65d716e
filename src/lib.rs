//! End-to-end mail delivery probe.
//!
//! Each configured test sends a message whose subject is a fresh token
//! through an SMTP relay, waits, then looks for exactly that subject in an
//! IMAP mailbox and compares what happened with what the test expected.

pub mod discovery;
pub mod orchestrator;
pub mod outcome;
pub mod report;
pub mod secret;
pub mod token;
pub mod wait;

pub use orchestrator::{Orchestrator, RunError};
pub use outcome::{RunSummary, TestOutcome};
pub use tracing;
