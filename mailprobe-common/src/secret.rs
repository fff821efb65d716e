//! Credentials and the seam through which missing ones are obtained.

use std::fmt;

use serde::Deserialize;

use crate::error::ConfigError;

/// A password or token. Never printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for handing to a transport.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Which leg of a probe a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    Smtp,
    Imap,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smtp => f.write_str("SMTP"),
            Self::Imap => f.write_str("IMAP"),
        }
    }
}

/// A credential the configuration did not carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretRequest<'a> {
    pub test: &'a str,
    pub leg: Leg,
    pub login: &'a str,
}

/// Supplies credentials that were left out of the configuration, e.g. by
/// prompting on a terminal or reading a secret store.
pub trait SecretProvider {
    /// Resolve the secret for `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider has no way of obtaining the secret.
    fn resolve(&self, request: &SecretRequest<'_>) -> Result<Secret, ConfigError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{secret:?}"), "Secret(***)");
        assert_eq!(secret.expose(), "hunter2");
    }
}
