//! Test doubles for the two ends of a mail probe.
//!
//! [`MockSmtpServer`] accepts submissions and, when given a [`Mailbox`],
//! delivers them into it. [`MockImapServer`] serves the same [`Mailbox`]
//! over IMAP, so a probe can travel the whole path in-process.
//!
//! ```rust,no_run
//! use mailprobe_test::{Mailbox, MockImapServer, MockSmtpServer};
//!
//! # async fn example() -> std::io::Result<()> {
//! let mailbox = Mailbox::new();
//! let relay = MockSmtpServer::builder()
//!     .with_credentials("probe", "secret")
//!     .delivering_to(mailbox.clone())
//!     .build()
//!     .await?;
//! let imap = MockImapServer::builder(mailbox.clone())
//!     .with_credentials("inbox", "secret")
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod imap;
mod mailbox;
mod smtp;

pub use imap::{MockImapServer, MockImapServerBuilder};
pub use mailbox::Mailbox;
pub use smtp::{MockSmtpServer, MockSmtpServerBuilder, SmtpCommand};
