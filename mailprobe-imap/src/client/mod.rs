//! IMAP4rev1 client covering what a delivery probe needs: login, folder
//! selection, header search, header fetch, flagging and expunge.
//!
//! Commands are tagged `A0001`, `A0002`, ... and every call waits for its
//! tagged completion. Literals in server responses are read in full.

mod error;
mod imap_client;
mod response;

pub use error::{ImapError, Result};
pub use imap_client::ImapClient;
pub use response::{Completion, Response, Status, Untagged};
