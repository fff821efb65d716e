//! Pieces shared by every mailprobe crate: the run configuration and its
//! validation, secrets, logging, the TLS-capable connection used by both
//! protocol clients and the transport seams the orchestrator drives.

pub mod config;
pub mod error;
pub mod logging;
pub mod net;
pub mod secret;
pub mod traits;

pub use tracing;
