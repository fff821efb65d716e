//! Asking the operator for credentials the configuration left out.

use std::io::{self, IsTerminal, Write};

use mailprobe_common::{
    error::ConfigError,
    secret::{Secret, SecretProvider, SecretRequest},
};

/// Prompts on the controlling terminal with echo turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl SecretProvider for TerminalPrompt {
    fn resolve(&self, request: &SecretRequest<'_>) -> Result<Secret, ConfigError> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Err(ConfigError::NoTerminal {
                leg: request.leg,
                login: request.login.to_string(),
            });
        }

        let mut stdout = io::stdout().lock();
        write!(
            stdout,
            "Enter {} password for {}: ",
            request.leg, request.login
        )
        .and_then(|()| stdout.flush())
        .map_err(ConfigError::Prompt)?;

        let secret = rpassword::read_password().map_err(ConfigError::Prompt)?;
        Ok(Secret::new(secret))
    }
}
