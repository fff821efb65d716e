//! Submission of a probe message through an outbound relay.
//!
//! One call performs one SMTP transaction:
//! connect, greeting, EHLO, optional STARTTLS, `AUTH PLAIN`, MAIL FROM,
//! RCPT TO, DATA and QUIT. Nothing is retried here.

use std::{fmt, future::Future, time::Duration};

use async_trait::async_trait;
use mailprobe_common::{
    config::Outbound,
    net::is_loopback,
    tracing,
    traits::transport::Submit,
};
use thiserror::Error;

use crate::client::{ClientError, Response, SmtpClient};

/// Port on which relays expect TLS from the first byte.
const SMTPS_PORT: u16 = 465;

/// The point in the SMTP transaction an error occurred at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    Greeting,
    Ehlo,
    StartTls,
    Auth,
    MailFrom,
    RcptTo,
    Data,
    Message,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Greeting => "greeting",
            Self::Ehlo => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth => "AUTH",
            Self::MailFrom => "MAIL FROM",
            Self::RcptTo => "RCPT TO",
            Self::Data => "DATA",
            Self::Message => "message data",
        })
    }
}

/// Why a probe could not be handed to the relay.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{step} with {server} timed out after {after:?}")]
    Timeout {
        server: String,
        step: Step,
        after: Duration,
    },

    #[error("{step} with {server} failed: {source}")]
    Client {
        server: String,
        step: Step,
        #[source]
        source: ClientError,
    },

    #[error("{server} rejected {step}: {code} {message}")]
    Rejected {
        server: String,
        step: Step,
        code: u16,
        message: String,
    },

    #[error("{server} does not offer AUTH PLAIN")]
    AuthUnsupported { server: String },

    #[error("Refusing to send credentials to {server} over an unencrypted connection")]
    InsecureAuth { server: String },
}

/// Hands probe messages to an SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpSubmitter {
    helo_domain: String,
}

impl Default for SmtpSubmitter {
    fn default() -> Self {
        Self::new("localhost")
    }
}

impl SmtpSubmitter {
    /// `helo_domain` is the name announced in EHLO.
    #[must_use]
    pub fn new(helo_domain: impl Into<String>) -> Self {
        Self {
            helo_domain: helo_domain.into(),
        }
    }
}

#[async_trait]
impl Submit for SmtpSubmitter {
    type Error = SubmitError;

    #[tracing::instrument(level = "debug", skip_all, err, fields(server = %outbound.address()))]
    async fn submit(&self, outbound: &Outbound, token: &str) -> Result<(), SubmitError> {
        Transaction {
            outbound,
            server: outbound.address(),
            helo_domain: &self.helo_domain,
        }
        .execute(token)
        .await
    }
}

/// Whether relays on `port` expect TLS before the greeting.
const fn implicit_tls(port: u16) -> bool {
    port == SMTPS_PORT
}

/// Renders the probe: headers only, the token verbatim in `Subject`.
fn probe_message(outbound: &Outbound, token: &str) -> String {
    format!(
        "From: {}\r\nTo: {}\r\nSubject: {token}\r\nDate: {}\r\n\r\n",
        outbound.sender,
        outbound.recipient,
        chrono::Utc::now().to_rfc2822(),
    )
}

struct Transaction<'a> {
    outbound: &'a Outbound,
    server: String,
    helo_domain: &'a str,
}

impl Transaction<'_> {
    /// Run `operation` under the per-round-trip timeout.
    async fn bounded<T>(
        &self,
        step: Step,
        operation: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, SubmitError> {
        tokio::time::timeout(self.outbound.timeout, operation)
            .await
            .map_err(|_| SubmitError::Timeout {
                server: self.server.clone(),
                step,
                after: self.outbound.timeout,
            })?
            .map_err(|source| SubmitError::Client {
                server: self.server.clone(),
                step,
                source,
            })
    }

    fn expect(
        &self,
        step: Step,
        response: &Response,
        accept: fn(&Response) -> bool,
    ) -> Result<(), SubmitError> {
        if accept(response) {
            Ok(())
        } else {
            Err(SubmitError::Rejected {
                server: self.server.clone(),
                step,
                code: response.code,
                message: response.message(),
            })
        }
    }

    async fn connect(&self) -> Result<SmtpClient, SubmitError> {
        let host = self.outbound.host.clone();
        let accept_invalid_certs = self.outbound.accept_invalid_certs;

        let mut client = if implicit_tls(self.outbound.port) {
            self.bounded(
                Step::Connect,
                SmtpClient::connect_tls(&self.server, host, accept_invalid_certs),
            )
            .await?
        } else {
            self.bounded(Step::Connect, SmtpClient::connect(&self.server, host))
                .await?
                .accept_invalid_certs(accept_invalid_certs)
        };

        let greeting = self.bounded(Step::Greeting, client.read_greeting()).await?;
        self.expect(Step::Greeting, &greeting, Response::is_success)?;

        Ok(client)
    }

    async fn handshake(&self, client: &mut SmtpClient) -> Result<Response, SubmitError> {
        let mut ehlo = self
            .bounded(Step::Ehlo, client.ehlo(self.helo_domain))
            .await?;
        self.expect(Step::Ehlo, &ehlo, Response::is_success)?;

        if !client.is_tls() && ehlo.has_extension("STARTTLS") {
            let response = self.bounded(Step::StartTls, client.starttls()).await?;
            self.expect(Step::StartTls, &response, Response::is_success)?;

            ehlo = self
                .bounded(Step::Ehlo, client.ehlo(self.helo_domain))
                .await?;
            self.expect(Step::Ehlo, &ehlo, Response::is_success)?;
        }

        Ok(ehlo)
    }

    /// Credentials only travel encrypted, or to this machine.
    fn ensure_private_channel(&self, encrypted: bool) -> Result<(), SubmitError> {
        if encrypted || is_loopback(&self.outbound.host) {
            Ok(())
        } else {
            Err(SubmitError::InsecureAuth {
                server: self.server.clone(),
            })
        }
    }

    async fn authenticate(
        &self,
        client: &mut SmtpClient,
        ehlo: &Response,
    ) -> Result<(), SubmitError> {
        self.ensure_private_channel(client.is_tls())?;

        if !ehlo.auth_mechanisms().iter().any(|m| m == "PLAIN") {
            return Err(SubmitError::AuthUnsupported {
                server: self.server.clone(),
            });
        }

        let response = self
            .bounded(
                Step::Auth,
                client.auth_plain(&self.outbound.login, self.outbound.secret.expose()),
            )
            .await?;
        self.expect(Step::Auth, &response, Response::is_success)
    }

    async fn execute(self, token: &str) -> Result<(), SubmitError> {
        let mut client = self.connect().await?;
        let ehlo = self.handshake(&mut client).await?;
        self.authenticate(&mut client, &ehlo).await?;

        let response = self
            .bounded(Step::MailFrom, client.mail_from(&self.outbound.sender))
            .await?;
        self.expect(Step::MailFrom, &response, Response::is_success)?;

        let response = self
            .bounded(Step::RcptTo, client.rcpt_to(&self.outbound.recipient))
            .await?;
        self.expect(Step::RcptTo, &response, Response::is_success)?;

        let response = self.bounded(Step::Data, client.data()).await?;
        self.expect(Step::Data, &response, Response::is_intermediate)?;

        let message = probe_message(self.outbound, token);
        let response = self
            .bounded(Step::Message, client.send_data(&message))
            .await?;
        self.expect(Step::Message, &response, Response::is_success)?;

        tracing::debug!(server = %self.server, "Probe accepted by relay");

        // The message is queued at this point; a failed QUIT does not undo that.
        match tokio::time::timeout(self.outbound.timeout, client.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::warn!(server = %self.server, "QUIT failed after submission: {e}");
            }
            Err(_) => tracing::warn!(server = %self.server, "QUIT timed out after submission"),
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use mailprobe_common::secret::Secret;

    use super::*;

    fn outbound() -> Outbound {
        Outbound {
            host: "smtp.example.com".to_string(),
            port: 25,
            sender: "probe@example.com".to_string(),
            recipient: "inbox@example.net".to_string(),
            login: "probe@example.com".to_string(),
            secret: Secret::new("pw"),
            accept_invalid_certs: false,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn message_carries_token_as_subject() {
        let message = probe_message(&outbound(), "abc123");

        assert!(message.starts_with("From: probe@example.com\r\nTo: inbox@example.net\r\n"));
        assert!(message.contains("\r\nSubject: abc123\r\n"));
        assert!(message.ends_with("\r\n\r\n"));
    }

    fn transaction(outbound: &Outbound) -> Transaction<'_> {
        Transaction {
            outbound,
            server: outbound.address(),
            helo_domain: "localhost",
        }
    }

    #[test]
    fn plaintext_auth_to_remote_relay_is_refused() {
        let outbound = outbound();
        let transaction = transaction(&outbound);

        let err = transaction.ensure_private_channel(false).unwrap_err();
        assert!(
            matches!(&err, SubmitError::InsecureAuth { server } if server == "smtp.example.com:25"),
            "unexpected error: {err:?}"
        );
        assert_eq!(
            err.to_string(),
            "Refusing to send credentials to smtp.example.com:25 over an unencrypted connection"
        );

        assert!(transaction.ensure_private_channel(true).is_ok());
    }

    #[test]
    fn plaintext_auth_to_loopback_is_allowed() {
        for host in ["127.0.0.1", "localhost", "::1"] {
            let outbound = Outbound {
                host: host.to_string(),
                ..outbound()
            };
            assert!(transaction(&outbound).ensure_private_channel(false).is_ok(), "{host}");
        }
    }

    #[test]
    fn only_smtps_port_starts_with_tls() {
        assert!(implicit_tls(465));
        assert!(!implicit_tls(25));
        assert!(!implicit_tls(587));
    }

    #[test]
    fn errors_name_the_step_and_server() {
        let err = SubmitError::Rejected {
            server: "smtp.example.com:25".to_string(),
            step: Step::RcptTo,
            code: 550,
            message: "No such user".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "smtp.example.com:25 rejected RCPT TO: 550 No such user"
        );
    }
}
