//! Outbound leg of a mail probe: a small async SMTP client and the
//! [`SmtpSubmitter`] that drives it to hand one tagged message to a relay.

pub mod client;
mod submit;

pub use submit::{SmtpSubmitter, Step, SubmitError};
