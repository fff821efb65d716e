//! Correlation tokens that tie a sent probe to the message found in the
//! mailbox.

use std::fmt;

use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Bytes of fresh entropy drawn for every token.
pub const ENTROPY_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum TokenError {
    /// The operating system could not supply randomness. Tokens are never
    /// generated from a weaker source instead.
    #[error("System entropy source unavailable: {0}")]
    Entropy(String),
}

/// A probe's correlation value: 64 lowercase hex characters, used verbatim as
/// the message subject and as the exact search key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeToken(String);

impl ProbeToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProbeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of probe tokens.
pub trait TokenSource {
    /// Draw a new token. `seed` is mixed in but never relied on for
    /// uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Entropy`] if no randomness is available.
    fn generate(&mut self, seed: &str) -> Result<ProbeToken, TokenError>;
}

/// Tokens from the OS random source, hashed together with the seed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenGenerator;

impl TokenSource for TokenGenerator {
    fn generate(&mut self, seed: &str) -> Result<ProbeToken, TokenError> {
        let mut entropy = [0u8; ENTROPY_BYTES];
        OsRng
            .try_fill_bytes(&mut entropy)
            .map_err(|e| TokenError::Entropy(e.to_string()))?;

        let digest = Sha256::new()
            .chain_update(seed.as_bytes())
            .chain_update(entropy)
            .finalize();

        Ok(ProbeToken(hex::encode(digest)))
    }
}
