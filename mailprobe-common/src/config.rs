//! Run configuration.
//!
//! [`ProbeConfig`] mirrors the on-disk TOML document field for field.
//! Converting it into a [`RunConfig`] applies defaults; [`RunConfig::validate`]
//! then checks the invariants every [`TestSpec`] must satisfy before it may
//! run and asks a [`SecretProvider`] for any password the file left out.

use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::{
    error::{ConfigError, MissingField},
    secret::{Leg, Secret, SecretProvider, SecretRequest},
};

pub const DEFAULT_SMTP_PORT: u16 = 25;
pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_FOLDER: &str = "INBOX";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const fn yes() -> bool {
    true
}

/// The configuration document as written by the user.
#[derive(Debug, Default, Deserialize)]
pub struct ProbeConfig {
    /// Enables debug logging.
    #[serde(default)]
    pub debug: bool,
    #[serde(default, alias = "continue_on_error")]
    pub continue_on_errors: bool,
    #[serde(default, alias = "test")]
    pub tests: Vec<TestConfig>,
}

/// One `[[tests]]` table.
#[derive(Debug, Default, Deserialize)]
pub struct TestConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default = "yes")]
    pub should_send: bool,
    #[serde(default)]
    pub smtp_server: String,
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub send_from: String,
    #[serde(default)]
    pub send_to: String,
    #[serde(default)]
    pub sender_login: String,
    pub sender_password: Option<Secret>,
    #[serde(default)]
    pub wait_for: u64,
    #[serde(default = "yes")]
    pub should_receive: bool,
    #[serde(default)]
    pub imap_server: String,
    pub imap_port: Option<u16>,
    #[serde(default)]
    pub imap_login: String,
    pub imap_password: Option<Secret>,
    #[serde(default = "yes")]
    pub imap_tls: bool,
    pub imap_folder: Option<String>,
    #[serde(default)]
    pub leave_message: bool,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    pub timeout_secs: Option<u64>,
}

impl ProbeConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is malformed.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml(&text)
    }
}

/// Where and how the probe is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub host: String,
    pub port: u16,
    pub sender: String,
    pub recipient: String,
    pub login: String,
    pub secret: Secret,
    pub accept_invalid_certs: bool,
    pub timeout: Duration,
}

impl Outbound {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The mailbox the probe is expected to land in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub secret: Secret,
    pub tls: bool,
    pub folder: String,
    pub accept_invalid_certs: bool,
    pub timeout: Duration,
}

impl Inbound {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A single probe route, ready to be validated and run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSpec {
    pub name: String,
    pub expect_sent: bool,
    pub expect_received: bool,
    pub outbound: Outbound,
    pub inbound: Inbound,
    pub wait: Duration,
    pub leave_message: bool,
}

impl TestSpec {
    /// Required fields that are blank, in configuration order.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("smtp_server", &self.outbound.host),
            ("send_from", &self.outbound.sender),
            ("send_to", &self.outbound.recipient),
            ("sender_login", &self.outbound.login),
            ("imap_server", &self.inbound.host),
            ("imap_login", &self.inbound.login),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    fn secret_mut(&mut self, leg: Leg) -> (&str, &mut Secret) {
        match leg {
            Leg::Smtp => (&self.outbound.login, &mut self.outbound.secret),
            Leg::Imap => (&self.inbound.login, &mut self.inbound.secret),
        }
    }
}

impl From<TestConfig> for TestSpec {
    fn from(test: TestConfig) -> Self {
        let timeout = Duration::from_secs(test.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

        Self {
            name: test.name,
            expect_sent: test.should_send,
            expect_received: test.should_receive,
            outbound: Outbound {
                host: test.smtp_server,
                port: test.smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
                sender: test.send_from,
                recipient: test.send_to,
                login: test.sender_login,
                secret: test.sender_password.unwrap_or_default(),
                accept_invalid_certs: test.accept_invalid_certs,
                timeout,
            },
            inbound: Inbound {
                host: test.imap_server,
                port: test.imap_port.unwrap_or(DEFAULT_IMAP_PORT),
                login: test.imap_login,
                secret: test.imap_password.unwrap_or_default(),
                tls: test.imap_tls,
                folder: test
                    .imap_folder
                    .filter(|folder| !folder.is_empty())
                    .unwrap_or_else(|| DEFAULT_FOLDER.to_string()),
                accept_invalid_certs: test.accept_invalid_certs,
                timeout,
            },
            wait: Duration::from_secs(test.wait_for),
            leave_message: test.leave_message,
        }
    }
}

/// The ordered list of probes and the run-level failure policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    pub tests: Vec<TestSpec>,
    pub continue_on_error: bool,
}

impl From<ProbeConfig> for RunConfig {
    fn from(config: ProbeConfig) -> Self {
        Self {
            tests: config.tests.into_iter().map(TestSpec::from).collect(),
            continue_on_error: config.continue_on_errors,
        }
    }
}

impl RunConfig {
    /// Check every test and fill in missing secrets.
    ///
    /// Missing fields are collected across all tests and reported together.
    /// Secrets are only requested once the structure is known to be sound.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming every blank required field, or
    /// the provider's error if a secret could not be obtained.
    pub fn validate(&mut self, secrets: &dyn SecretProvider) -> Result<(), ConfigError> {
        let missing: Vec<MissingField> = self
            .tests
            .iter()
            .enumerate()
            .flat_map(|(index, test)| {
                test.missing_fields()
                    .into_iter()
                    .map(move |field| MissingField {
                        test: test.name.clone(),
                        position: index + 1,
                        field,
                    })
            })
            .collect();

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        for test in &mut self.tests {
            for leg in [Leg::Smtp, Leg::Imap] {
                let name = test.name.clone();
                let (login, secret) = test.secret_mut(leg);
                if !secret.is_empty() {
                    continue;
                }

                let resolved = secrets.resolve(&SecretRequest {
                    test: &name,
                    leg,
                    login,
                })?;

                if resolved.is_empty() {
                    return Err(ConfigError::EmptySecret { test: name, leg });
                }

                *secret = resolved;
            }
        }

        Ok(())
    }
}
