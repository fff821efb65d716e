//! Verification that a probe reached its mailbox.

use std::{fmt, future::Future, time::Duration};

use async_trait::async_trait;
use mailprobe_common::{
    config::Inbound,
    tracing,
    traits::transport::{Verification, Verify},
};
use thiserror::Error;

use crate::client::{ImapClient, ImapError};

/// The mailbox operation an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    Login,
    Select,
    Search,
    Fetch,
    Store,
    Expunge,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Login => "LOGIN",
            Self::Select => "SELECT",
            Self::Search => "SEARCH",
            Self::Fetch => "FETCH",
            Self::Store => "STORE",
            Self::Expunge => "EXPUNGE",
        })
    }
}

/// Why a mailbox could not be checked for a probe.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("{step} on {server} timed out after {after:?}")]
    Timeout {
        server: String,
        step: Step,
        after: Duration,
    },

    #[error("{step} on {server} failed: {source}")]
    Imap {
        server: String,
        step: Step,
        #[source]
        source: ImapError,
    },
}

impl VerifyError {
    /// The step that failed.
    #[must_use]
    pub const fn step(&self) -> Step {
        match self {
            Self::Timeout { step, .. } | Self::Imap { step, .. } => *step,
        }
    }
}

/// Looks for probes in an IMAP mailbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapVerifier;

#[async_trait]
impl Verify for ImapVerifier {
    type Error = VerifyError;

    #[tracing::instrument(level = "debug", skip_all, err, fields(server = %inbound.address()))]
    async fn verify(
        &self,
        inbound: &Inbound,
        token: &str,
        leave_message: bool,
    ) -> Result<Verification, VerifyError> {
        let session = Session {
            inbound,
            server: inbound.address(),
        };

        let mut client = session
            .bounded(
                Step::Connect,
                ImapClient::connect(
                    &session.server,
                    &inbound.host,
                    inbound.tls,
                    inbound.accept_invalid_certs,
                ),
            )
            .await?;

        let result = session.inspect(&mut client, token, leave_message).await;
        session.release(client).await;

        result
    }
}

struct Session<'a> {
    inbound: &'a Inbound,
    server: String,
}

impl Session<'_> {
    /// Run `operation` under the per-round-trip timeout.
    async fn bounded<T>(
        &self,
        step: Step,
        operation: impl Future<Output = Result<T, ImapError>>,
    ) -> Result<T, VerifyError> {
        tokio::time::timeout(self.inbound.timeout, operation)
            .await
            .map_err(|_| VerifyError::Timeout {
                server: self.server.clone(),
                step,
                after: self.inbound.timeout,
            })?
            .map_err(|source| VerifyError::Imap {
                server: self.server.clone(),
                step,
                source,
            })
    }

    /// Everything between connect and logout. Any error leaves the session
    /// to be released by the caller.
    async fn inspect(
        &self,
        client: &mut ImapClient,
        token: &str,
        leave_message: bool,
    ) -> Result<Verification, VerifyError> {
        self.bounded(
            Step::Login,
            client.login(&self.inbound.login, self.inbound.secret.expose()),
        )
        .await?;
        self.bounded(Step::Select, client.select(&self.inbound.folder))
            .await?;

        let candidates = self
            .bounded(Step::Search, client.search_subject(token))
            .await?;
        let matches: Vec<u32> = self
            .bounded(Step::Fetch, client.fetch_subjects(&candidates))
            .await?
            .into_iter()
            .filter_map(|(id, subject)| (subject == token).then_some(id))
            .collect();

        tracing::debug!(
            candidates = candidates.len(),
            matches = matches.len(),
            "Searched for probe"
        );

        match matches.as_slice() {
            [] => Ok(Verification::NotFound),
            [id] => {
                if !leave_message {
                    self.bounded(Step::Store, client.mark_deleted(&[*id]))
                        .await?;
                    self.bounded(Step::Expunge, client.expunge()).await?;
                }
                Ok(Verification::Found)
            }
            many => Ok(Verification::Ambiguous(many.len())),
        }
    }

    /// Log out, whatever state the session is in. Failures are only logged:
    /// the verification result has already been decided.
    async fn release(&self, client: ImapClient) {
        match tokio::time::timeout(self.inbound.timeout, client.logout()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(server = %self.server, "LOGOUT failed: {e}"),
            Err(_) => tracing::debug!(server = %self.server, "LOGOUT timed out"),
        }
    }
}
