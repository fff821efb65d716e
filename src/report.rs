//! Run progress as events, and the console presenter that renders them.
//!
//! The orchestrator only ever calls [`Reporter::report`]; how (and whether)
//! anything is drawn is up to the reporter it was given.

use std::{
    io::{self, IsTerminal, Stdout, Write},
    time::Duration,
};

use colored::Colorize;
use mailprobe_common::config::{Inbound, TestSpec};

use crate::outcome::{Abort, Reception, RunSummary, TestOutcome};

/// Frames of the wait spinner, advanced once per wait tick.
pub const SPINNER: [&str; 8] = ["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];

/// Something that happened during a run.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    RunStarted { tests: usize },
    TestStarted { test: &'a TestSpec },
    Sending { test: &'a TestSpec },
    /// The relay accepted the probe. `expected` is false for a soft mismatch.
    Sent { expected: bool },
    SendFailed { error: &'a str, expected: bool },
    Waiting { total: Duration },
    WaitTick { elapsed: Duration, total: Duration },
    Waited { total: Duration },
    Verifying { inbound: &'a Inbound },
    Verified {
        reception: Reception,
        expected: bool,
        folder: &'a str,
    },
    VerifyFailed { error: &'a str },
    TestFinished { outcome: &'a TestOutcome },
    RunAborted { abort: &'a Abort },
    RunFinished { summary: &'a RunSummary },
}

/// Receives run events in order.
pub trait Reporter {
    fn report(&mut self, event: &Event<'_>);
}

/// How the console presenter draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    pub color: bool,
    /// Redraw the wait line with a spinner instead of printing once.
    pub spinner: bool,
}

impl Style {
    pub const PLAIN: Self = Self {
        color: false,
        spinner: false,
    };

    /// Colour and animation when stdout is an interactive terminal.
    /// `no_color` turns colour off regardless.
    #[must_use]
    pub fn detect(no_color: bool) -> Self {
        let interactive = io::stdout().is_terminal();
        Self {
            color: interactive && !no_color,
            spinner: interactive,
        }
    }

    fn ok(self) -> String {
        if self.color {
            "✔".green().to_string()
        } else {
            "✔".to_string()
        }
    }

    fn fail(self) -> String {
        if self.color {
            "✖".red().to_string()
        } else {
            "✖".to_string()
        }
    }

    fn error(self, text: &str) -> String {
        if self.color {
            text.red().to_string()
        } else {
            text.to_string()
        }
    }

    fn warning(self, text: &str) -> String {
        if self.color {
            text.yellow().to_string()
        } else {
            text.to_string()
        }
    }
}

fn seconds(duration: Duration) -> String {
    match duration.as_secs() {
        1 => "1 second".to_string(),
        n => format!("{n} seconds"),
    }
}

/// Line-oriented report for a human watching the run.
pub struct ConsoleReporter<W: Write> {
    out: W,
    style: Style,
    frame: usize,
}

impl ConsoleReporter<Stdout> {
    #[must_use]
    pub fn stdout(style: Style) -> Self {
        Self::new(io::stdout(), style)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub const fn new(out: W, style: Style) -> Self {
        Self {
            out,
            style,
            frame: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    #[allow(clippy::too_many_lines)]
    fn render(&mut self, event: &Event<'_>) -> io::Result<()> {
        let style = self.style;

        match *event {
            Event::RunStarted { .. } => {}
            Event::TestStarted { test } => {
                writeln!(self.out, "Running test \"{}\"...", test.name)?;
            }
            Event::Sending { test } => {
                write!(
                    self.out,
                    "Sending message through {} from {} to: {}... ",
                    test.outbound.address(),
                    test.outbound.sender,
                    test.outbound.recipient
                )?;
            }
            Event::Sent { expected: true } => writeln!(self.out, "{}", style.ok())?,
            Event::Sent { expected: false } => {
                writeln!(self.out, "{}", style.ok())?;
                writeln!(
                    self.out,
                    "{}",
                    style.warning("warning: message was sent although sending was expected to fail")
                )?;
            }
            Event::SendFailed {
                error,
                expected: false,
            } => {
                writeln!(self.out)?;
                writeln!(self.out, "{error}")?;
                writeln!(self.out, "Sending failed as expected {}", style.ok())?;
            }
            Event::SendFailed {
                error,
                expected: true,
            } => {
                writeln!(self.out, "{}", style.fail())?;
                writeln!(self.out, "{}", style.error(error))?;
            }
            Event::Waiting { total } => {
                self.frame = 0;
                if style.spinner {
                    write!(self.out, "\rWaiting for {}... {} ", seconds(total), SPINNER[0])?;
                } else {
                    write!(self.out, "Waiting for {}... ", seconds(total))?;
                }
            }
            Event::WaitTick { total, .. } => {
                if style.spinner {
                    self.frame = (self.frame + 1) % SPINNER.len();
                    write!(
                        self.out,
                        "\rWaiting for {}... {} ",
                        seconds(total),
                        SPINNER[self.frame]
                    )?;
                }
            }
            Event::Waited { total } => {
                if style.spinner {
                    writeln!(
                        self.out,
                        "\r{} passed. {}             ",
                        seconds(total),
                        style.ok()
                    )?;
                } else {
                    writeln!(self.out, "{}", style.ok())?;
                }
            }
            Event::Verifying { inbound } => {
                write!(
                    self.out,
                    "Checking {} on IMAP server {}... ",
                    inbound.folder,
                    inbound.address()
                )?;
            }
            Event::Verified {
                reception,
                expected,
                folder,
            } => match (reception, expected) {
                (Reception::Received, true) => {
                    writeln!(self.out, "{}", style.ok())?;
                    writeln!(self.out, "Message successfully received {}", style.ok())?;
                }
                (Reception::Missing, false) => {
                    writeln!(self.out, "{}", style.ok())?;
                    writeln!(
                        self.out,
                        "Test message not found in {folder} as expected {}",
                        style.ok()
                    )?;
                }
                (Reception::Received, false) => {
                    writeln!(self.out, "{}", style.fail())?;
                    writeln!(
                        self.out,
                        "{}",
                        style.error("Message was received but should not have been")
                    )?;
                }
                (Reception::Missing, true) => {
                    writeln!(self.out, "{}", style.fail())?;
                    writeln!(
                        self.out,
                        "{}",
                        style.error(&format!("Sent message not found in {folder}"))
                    )?;
                }
                (Reception::Ambiguous(count), _) => {
                    writeln!(self.out, "{}", style.fail())?;
                    writeln!(
                        self.out,
                        "{}",
                        style.error(&format!(
                            "Found {count} messages carrying the probe token in {folder}"
                        ))
                    )?;
                }
                (Reception::Unverified, _) => writeln!(self.out)?,
            },
            Event::VerifyFailed { error } => {
                writeln!(self.out, "{}", style.fail())?;
                writeln!(self.out, "{}", style.error(error))?;
            }
            Event::TestFinished { outcome } => match &outcome.failure {
                None => writeln!(self.out, "Test '{}' passed {}", outcome.name, style.ok())?,
                Some((_, reason)) => writeln!(
                    self.out,
                    "{}",
                    style.error(&format!("Test '{}' failed: {reason} ✖", outcome.name))
                )?,
            },
            Event::RunAborted { abort } => {
                writeln!(
                    self.out,
                    "{}",
                    style.error(&format!(
                        "Stopping after test '{}' failed; remaining tests skipped",
                        abort.test
                    ))
                )?;
            }
            Event::RunFinished { summary } => {
                writeln!(
                    self.out,
                    "{} passed, {} failed",
                    summary.passed(),
                    summary.failed()
                )?;
            }
        }

        self.out.flush()
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn report(&mut self, event: &Event<'_>) {
        if let Err(e) = self.render(event) {
            tracing::debug!("Failed to write report: {e}");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::outcome::Stage;

    fn render(style: Style, events: &[Event<'_>]) -> String {
        let mut reporter = ConsoleReporter::new(Vec::new(), style);
        for event in events {
            reporter.report(event);
        }
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn plain_wait_prints_once() {
        let total = Duration::from_secs(2);
        let output = render(
            Style::PLAIN,
            &[
                Event::Waiting { total },
                Event::WaitTick {
                    elapsed: Duration::from_millis(100),
                    total,
                },
                Event::WaitTick {
                    elapsed: Duration::from_millis(200),
                    total,
                },
                Event::Waited { total },
            ],
        );

        assert_eq!(output, "Waiting for 2 seconds... ✔\n");
    }

    #[test]
    fn spinner_advances_per_tick() {
        let total = Duration::from_secs(1);
        let style = Style {
            color: false,
            spinner: true,
        };
        let output = render(
            style,
            &[
                Event::Waiting { total },
                Event::WaitTick {
                    elapsed: Duration::from_millis(100),
                    total,
                },
                Event::WaitTick {
                    elapsed: Duration::from_millis(200),
                    total,
                },
                Event::Waited { total },
            ],
        );

        assert_eq!(
            output,
            "\rWaiting for 1 second... ⣾ \rWaiting for 1 second... ⣽ \
             \rWaiting for 1 second... ⣻ \r1 second passed. ✔             \n"
        );
    }

    #[test]
    fn expected_send_failure() {
        let output = render(
            Style::PLAIN,
            &[Event::SendFailed {
                error: "connection refused",
                expected: false,
            }],
        );

        assert_eq!(
            output,
            "\nconnection refused\nSending failed as expected ✔\n"
        );
    }

    #[test]
    fn soft_mismatch_is_a_warning() {
        let output = render(Style::PLAIN, &[Event::Sent { expected: false }]);
        assert!(output.starts_with("✔\nwarning: "));
    }

    #[test]
    fn ambiguous_reception() {
        let output = render(
            Style::PLAIN,
            &[Event::Verified {
                reception: Reception::Ambiguous(2),
                expected: true,
                folder: "INBOX",
            }],
        );

        assert_eq!(
            output,
            "✖\nFound 2 messages carrying the probe token in INBOX\n"
        );
    }

    #[test]
    fn finish_lines() {
        let passed = TestOutcome::new("relay");
        let mut failed = TestOutcome::new("backup");
        failed.failure = Some((Stage::Verify, "probe not found in INBOX".to_string()));
        let summary = RunSummary {
            outcomes: vec![passed.clone(), failed.clone()],
            aborted: None,
        };

        let output = render(
            Style::PLAIN,
            &[
                Event::TestFinished { outcome: &passed },
                Event::TestFinished { outcome: &failed },
                Event::RunFinished { summary: &summary },
            ],
        );

        assert_eq!(
            output,
            "Test 'relay' passed ✔\n\
             Test 'backup' failed: probe not found in INBOX ✖\n\
             1 passed, 1 failed\n"
        );
    }
}
