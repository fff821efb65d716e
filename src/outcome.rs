//! Results of individual probes and of a whole run, and the rules that
//! decide whether a result matches what the configuration expected.

use std::fmt;

use mailprobe_common::traits::transport::Verification;

/// The step of a probe a hard failure was raised at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Send,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Send => "send",
            Self::Verify => "verify",
        })
    }
}

/// What the mailbox showed for a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reception {
    Received,
    Missing,
    Ambiguous(usize),
    /// The mailbox was not checked, or could not be.
    Unverified,
}

impl From<Verification> for Reception {
    fn from(verification: Verification) -> Self {
        match verification {
            Verification::Found => Self::Received,
            Verification::NotFound => Self::Missing,
            Verification::Ambiguous(count) => Self::Ambiguous(count),
        }
    }
}

/// How one step's result compares with its expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// As expected, including expected failures.
    Pass,
    /// Sent although sending was expected to fail. Reported, not failed.
    SoftMismatch,
    /// Disagrees with the expectation; subject to the run's error policy.
    HardFailure(String),
}

/// Classify a submission attempt.
#[must_use]
pub fn classify_send(result: Result<(), &str>, expect_sent: bool) -> Verdict {
    match (result, expect_sent) {
        (Ok(()), true) | (Err(_), false) => Verdict::Pass,
        (Ok(()), false) => Verdict::SoftMismatch,
        (Err(error), true) => Verdict::HardFailure(format!("sending failed: {error}")),
    }
}

/// Classify a mailbox check.
///
/// A mailbox that could not be inspected fails whatever was expected: the
/// absence of a probe cannot be shown without a working session.
#[must_use]
pub fn classify_reception(
    result: Result<Verification, &str>,
    expect_received: bool,
    folder: &str,
) -> Verdict {
    match (result, expect_received) {
        (Err(error), _) => Verdict::HardFailure(format!("mailbox check failed: {error}")),
        (Ok(Verification::Found), true) | (Ok(Verification::NotFound), false) => Verdict::Pass,
        (Ok(Verification::Found), false) => {
            Verdict::HardFailure(format!("probe was delivered to {folder} but should not have been"))
        }
        (Ok(Verification::NotFound), true) => {
            Verdict::HardFailure(format!("probe not found in {folder}"))
        }
        (Ok(Verification::Ambiguous(count)), _) => Verdict::HardFailure(format!(
            "{count} messages in {folder} carry the probe token; remove stale probes"
        )),
    }
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub name: String,
    pub sent: bool,
    pub send_error: Option<String>,
    pub reception: Reception,
    pub receive_error: Option<String>,
    /// Sent although the configuration expected the relay to refuse.
    pub soft_mismatch: bool,
    /// Where the probe disagreed with its expectations, with the reason.
    pub failure: Option<(Stage, String)>,
}

impl TestOutcome {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: false,
            send_error: None,
            reception: Reception::Unverified,
            receive_error: None,
            soft_mismatch: false,
            failure: None,
        }
    }

    #[must_use]
    pub const fn received(&self) -> bool {
        matches!(self.reception, Reception::Received)
    }

    #[must_use]
    pub const fn matched_expectation(&self) -> bool {
        self.failure.is_none()
    }
}

/// Why a run stopped before its last test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abort {
    pub test: String,
    pub reason: String,
}

/// Everything a run produced, in test order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub outcomes: Vec<TestOutcome>,
    /// Set when a hard failure stopped the run; later tests were not run.
    pub aborted: Option<Abort>,
}

impl RunSummary {
    #[must_use]
    pub fn passed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.matched_expectation())
            .count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    /// Whether the process should exit successfully. Failures recorded under
    /// continue-on-error do not count against the run.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.aborted.is_none()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn send_matrix() {
        assert_eq!(classify_send(Ok(()), true), Verdict::Pass);
        assert_eq!(classify_send(Err("refused"), false), Verdict::Pass);
        assert_eq!(classify_send(Ok(()), false), Verdict::SoftMismatch);
        assert_eq!(
            classify_send(Err("refused"), true),
            Verdict::HardFailure("sending failed: refused".to_string())
        );
    }

    #[test]
    fn reception_matrix() {
        assert_eq!(
            classify_reception(Ok(Verification::Found), true, "INBOX"),
            Verdict::Pass
        );
        assert_eq!(
            classify_reception(Ok(Verification::NotFound), false, "INBOX"),
            Verdict::Pass
        );
        assert_eq!(
            classify_reception(Ok(Verification::NotFound), true, "INBOX"),
            Verdict::HardFailure("probe not found in INBOX".to_string())
        );
        assert!(matches!(
            classify_reception(Ok(Verification::Found), false, "INBOX"),
            Verdict::HardFailure(_)
        ));
    }

    #[test]
    fn ambiguity_never_passes() {
        for expected in [true, false] {
            assert!(matches!(
                classify_reception(Ok(Verification::Ambiguous(2)), expected, "INBOX"),
                Verdict::HardFailure(reason) if reason.starts_with("2 messages")
            ));
        }
    }

    #[test]
    fn unreachable_mailbox_fails_even_when_absence_expected() {
        assert!(matches!(
            classify_reception(Err("connection refused"), false, "INBOX"),
            Verdict::HardFailure(_)
        ));
    }

    #[test]
    fn summary_counts() {
        let mut failed = TestOutcome::new("b");
        failed.failure = Some((Stage::Verify, "probe not found in INBOX".to_string()));

        let summary = RunSummary {
            outcomes: vec![TestOutcome::new("a"), failed],
            aborted: None,
        };

        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(summary.success());
    }
}
