//! The probe state machine.
//!
//! A run validates every test up front, then takes each test in order
//! through token generation, sending, waiting, verifying and classification.
//! Hard failures either stop the run or are recorded and skipped past,
//! depending on the run's `continue_on_error` policy. That policy is applied
//! here and nowhere else.

use mailprobe_common::{
    config::{RunConfig, TestSpec},
    error::ConfigError,
    internal,
    secret::SecretProvider,
    traits::transport::{Submit, Verify},
};
use thiserror::Error;

use crate::{
    outcome::{
        Abort, Reception, RunSummary, Stage, TestOutcome, Verdict, classify_reception,
        classify_send,
    },
    report::{Event, Reporter},
    token::{TokenError, TokenGenerator, TokenSource},
    wait::IntervalWaiter,
};

/// Conditions that end a run without a summary.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Test '{test}': {source}")]
    Token {
        test: String,
        #[source]
        source: TokenError,
    },
}

/// Drives probes through a submitter and a verifier, reporting as it goes.
pub struct Orchestrator<S, V, R, T = TokenGenerator> {
    submitter: S,
    verifier: V,
    reporter: R,
    tokens: T,
    waiter: IntervalWaiter,
}

impl<S, V, R> Orchestrator<S, V, R>
where
    S: Submit,
    V: Verify,
    R: Reporter,
{
    pub fn new(submitter: S, verifier: V, reporter: R) -> Self {
        Self {
            submitter,
            verifier,
            reporter,
            tokens: TokenGenerator,
            waiter: IntervalWaiter::default(),
        }
    }
}

impl<S, V, R, T> Orchestrator<S, V, R, T>
where
    S: Submit,
    V: Verify,
    R: Reporter,
    T: TokenSource,
{
    /// Use a different token source.
    pub fn with_tokens<U: TokenSource>(self, tokens: U) -> Orchestrator<S, V, R, U> {
        Orchestrator {
            submitter: self.submitter,
            verifier: self.verifier,
            reporter: self.reporter,
            tokens,
            waiter: self.waiter,
        }
    }

    #[must_use]
    pub const fn with_waiter(mut self, waiter: IntervalWaiter) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn into_reporter(self) -> R {
        self.reporter
    }

    /// Validate `config`, then run its tests in order.
    ///
    /// Secrets missing from the configuration are requested from `secrets`
    /// during validation, before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Config`] if the configuration is invalid, and
    /// [`RunError::Token`] if a probe token cannot be generated. A test that
    /// fails its expectations is not an error: it is recorded in the summary.
    #[tracing::instrument(level = "debug", skip_all, fields(tests = config.tests.len()))]
    pub async fn run(
        &mut self,
        mut config: RunConfig,
        secrets: &dyn SecretProvider,
    ) -> Result<RunSummary, RunError> {
        config.validate(secrets)?;

        self.reporter.report(&Event::RunStarted {
            tests: config.tests.len(),
        });

        let mut summary = RunSummary::default();

        for test in &config.tests {
            let outcome = self.run_test(test).await?;
            let failure = outcome.failure.clone();
            summary.outcomes.push(outcome);

            if let Some((stage, reason)) = failure {
                if config.continue_on_error {
                    internal!(
                        level = INFO,
                        "Test '{}' failed at {}, continuing",
                        test.name,
                        stage
                    );
                    continue;
                }

                let abort = Abort {
                    test: test.name.clone(),
                    reason,
                };
                self.reporter.report(&Event::RunAborted { abort: &abort });
                summary.aborted = Some(abort);
                break;
            }
        }

        self.reporter.report(&Event::RunFinished { summary: &summary });
        Ok(summary)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(test = %test.name))]
    async fn run_test(&mut self, test: &TestSpec) -> Result<TestOutcome, RunError> {
        self.reporter.report(&Event::TestStarted { test });
        let mut outcome = TestOutcome::new(test.name.as_str());

        let token = self
            .tokens
            .generate(&test.outbound.host)
            .map_err(|source| RunError::Token {
                test: test.name.clone(),
                source,
            })?;
        internal!(level = DEBUG, "Probe token {}", token);

        self.reporter.report(&Event::Sending { test });
        let sent = self
            .submitter
            .submit(&test.outbound, token.as_str())
            .await
            .map_err(|e| e.to_string());

        outcome.sent = sent.is_ok();
        match &sent {
            Ok(()) => self.reporter.report(&Event::Sent {
                expected: test.expect_sent,
            }),
            Err(error) => {
                outcome.send_error = Some(error.clone());
                self.reporter.report(&Event::SendFailed {
                    error,
                    expected: test.expect_sent,
                });
            }
        }

        match classify_send(sent.as_ref().copied().map_err(String::as_str), test.expect_sent) {
            Verdict::Pass => {}
            Verdict::SoftMismatch => {
                tracing::warn!(test = %test.name, "Probe was sent although sending was expected to fail");
                outcome.soft_mismatch = true;
            }
            Verdict::HardFailure(reason) => {
                // Nothing was sent, so there is nothing to wait for or find.
                outcome.failure = Some((Stage::Send, reason));
                self.reporter.report(&Event::TestFinished { outcome: &outcome });
                return Ok(outcome);
            }
        }

        let total = test.wait;
        self.reporter.report(&Event::Waiting { total });
        let reporter = &mut self.reporter;
        self.waiter
            .wait(total, |elapsed| {
                reporter.report(&Event::WaitTick { elapsed, total });
            })
            .await;
        self.reporter.report(&Event::Waited { total });

        self.reporter.report(&Event::Verifying {
            inbound: &test.inbound,
        });
        let verified = self
            .verifier
            .verify(&test.inbound, token.as_str(), test.leave_message)
            .await
            .map_err(|e| e.to_string());

        match &verified {
            Ok(verification) => {
                outcome.reception = Reception::from(*verification);
                self.reporter.report(&Event::Verified {
                    reception: outcome.reception,
                    expected: test.expect_received,
                    folder: &test.inbound.folder,
                });
            }
            Err(error) => {
                outcome.receive_error = Some(error.clone());
                self.reporter.report(&Event::VerifyFailed { error });
            }
        }

        if let Verdict::HardFailure(reason) = classify_reception(
            verified.as_ref().copied().map_err(String::as_str),
            test.expect_received,
            &test.inbound.folder,
        ) {
            outcome.failure = Some((Stage::Verify, reason));
        }

        self.reporter.report(&Event::TestFinished { outcome: &outcome });
        Ok(outcome)
    }
}
