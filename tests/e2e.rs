//! Full runs against the mock relay and mailbox.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use mailprobe::{
    Orchestrator, RunSummary,
    outcome::{Reception, Stage},
    report::{ConsoleReporter, Style},
    token::{ProbeToken, TokenError, TokenGenerator, TokenSource},
};
use mailprobe_common::{
    config::{ProbeConfig, RunConfig},
    error::ConfigError,
    secret::{Secret, SecretProvider, SecretRequest},
};
use mailprobe_imap::ImapVerifier;
use mailprobe_smtp::SmtpSubmitter;
use mailprobe_test::{Mailbox, MockImapServer, MockSmtpServer};
use pretty_assertions::assert_eq;

struct NoPrompt;

impl SecretProvider for NoPrompt {
    fn resolve(&self, request: &SecretRequest<'_>) -> Result<Secret, ConfigError> {
        panic!("unexpected prompt for {}", request.login);
    }
}

/// Hands out a fixed token, to plant stale probes ahead of a run.
struct Replay(ProbeToken);

impl TokenSource for Replay {
    fn generate(&mut self, _seed: &str) -> Result<ProbeToken, TokenError> {
        Ok(self.0.clone())
    }
}

struct Route {
    mailbox: Mailbox,
    relay: MockSmtpServer,
    imap: MockImapServer,
}

impl Route {
    /// A relay that delivers into a mailbox served over IMAP.
    async fn delivering() -> Self {
        let mailbox = Mailbox::new();
        Self::with_relay(
            MockSmtpServer::builder()
                .with_credentials("probe@example.com", "smtp-secret")
                .delivering_to(mailbox.clone()),
            mailbox,
        )
        .await
    }

    /// A relay that accepts mail and loses it.
    async fn black_hole() -> Self {
        Self::with_relay(MockSmtpServer::builder(), Mailbox::new()).await
    }

    async fn with_relay(relay: mailprobe_test::MockSmtpServerBuilder, mailbox: Mailbox) -> Self {
        let relay = relay.build().await.unwrap();
        let imap = MockImapServer::builder(mailbox.clone())
            .with_credentials("inbox@example.net", "imap-secret")
            .build()
            .await
            .unwrap();
        Self {
            mailbox,
            relay,
            imap,
        }
    }

    fn test(&self, name: &str, should_send: bool, should_receive: bool) -> String {
        self.test_via(name, self.relay.addr().port(), should_send, should_receive)
    }

    fn test_via(&self, name: &str, smtp_port: u16, should_send: bool, should_receive: bool) -> String {
        format!(
            r#"
            [[tests]]
            name = "{name}"
            should_send = {should_send}
            smtp_server = "127.0.0.1"
            smtp_port = {smtp_port}
            send_from = "probe@example.com"
            send_to = "inbox@example.net"
            sender_login = "probe@example.com"
            sender_password = "smtp-secret"
            wait_for = 0
            should_receive = {should_receive}
            imap_server = "127.0.0.1"
            imap_port = {imap_port}
            imap_tls = false
            imap_login = "inbox@example.net"
            imap_password = "imap-secret"
            timeout_secs = 5
            "#,
            imap_port = self.imap.addr().port(),
        )
    }
}

fn config(continue_on_errors: bool, tests: &[String]) -> RunConfig {
    let document = format!("continue_on_errors = {continue_on_errors}\n{}", tests.concat());
    RunConfig::from(ProbeConfig::from_toml(&document).unwrap())
}

async fn run_with<T: TokenSource>(config: RunConfig, tokens: T) -> (RunSummary, String) {
    let mut orchestrator = Orchestrator::new(
        SmtpSubmitter::default(),
        ImapVerifier,
        ConsoleReporter::new(Vec::new(), Style::PLAIN),
    )
    .with_tokens(tokens);

    let summary = orchestrator.run(config, &NoPrompt).await.unwrap();
    let output = String::from_utf8(orchestrator.into_reporter().into_inner()).unwrap();
    (summary, output)
}

async fn run(config: RunConfig) -> (RunSummary, String) {
    run_with(config, TokenGenerator).await
}

async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn delivered_probe_is_found_and_removed() {
    let route = Route::delivering().await;

    let (summary, output) = run(config(false, &[route.test("relay", true, true)])).await;

    let outcome = &summary.outcomes[0];
    assert!(outcome.sent);
    assert_eq!(outcome.reception, Reception::Received);
    assert!(outcome.matched_expectation());
    assert!(summary.success());

    assert!(route.mailbox.is_empty().await, "probe should have been expunged");
    assert_eq!(route.relay.messages().await.len(), 1);

    assert!(output.starts_with("Running test \"relay\"...\nSending message through 127.0.0.1:"));
    assert!(output.contains("Message successfully received ✔\n"));
    assert!(output.ends_with("Test 'relay' passed ✔\n1 passed, 0 failed\n"));
}

#[tokio::test]
async fn unreachable_relay_and_empty_mailbox_as_expected() {
    let route = Route::delivering().await;
    let port = closed_port().await;

    let (summary, output) =
        run(config(false, &[route.test_via("negative", port, false, false)])).await;

    let outcome = &summary.outcomes[0];
    assert!(!outcome.sent);
    assert!(outcome.send_error.is_some());
    assert_eq!(outcome.reception, Reception::Missing);
    assert!(outcome.matched_expectation());
    assert!(summary.success());

    assert!(output.contains("Sending failed as expected ✔\n"));
    assert!(output.contains("Test message not found in INBOX as expected ✔\n"));
    assert!(route.imap.commands().await.contains(&"SEARCH".to_string()));
}

#[tokio::test]
async fn lost_probe_fails_and_aborts() {
    let route = Route::black_hole().await;

    let (summary, output) = run(config(false, &[route.test("lossy", true, true)])).await;

    let outcome = &summary.outcomes[0];
    assert!(outcome.sent);
    assert_eq!(outcome.reception, Reception::Missing);
    assert_eq!(
        outcome.failure,
        Some((Stage::Verify, "probe not found in INBOX".to_string()))
    );
    assert!(!summary.success());
    assert!(output.contains("Test 'lossy' failed: probe not found in INBOX ✖\n"));
}

#[tokio::test]
async fn abort_skips_remaining_tests() {
    let broken = Route::black_hole().await;
    let healthy = Route::delivering().await;

    let (summary, output) = run(config(
        false,
        &[
            broken.test("first", true, true),
            healthy.test("second", true, true),
        ],
    ))
    .await;

    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.aborted.as_ref().map(|a| a.test.as_str()), Some("first"));
    assert!(healthy.relay.commands().await.is_empty());
    assert!(healthy.imap.commands().await.is_empty());
    assert!(!output.contains("Running test \"second\""));
}

#[tokio::test]
async fn continue_on_errors_runs_everything() {
    let broken = Route::black_hole().await;
    let healthy = Route::delivering().await;

    let (summary, output) = run(config(
        true,
        &[
            broken.test("first", true, true),
            healthy.test("second", true, true),
        ],
    ))
    .await;

    assert_eq!(summary.outcomes.len(), 2);
    assert!(summary.outcomes[1].matched_expectation());
    assert!(summary.success());
    assert!(output.ends_with("1 passed, 1 failed\n"));
}

#[tokio::test]
async fn stale_probe_makes_verification_ambiguous() {
    let route = Route::delivering().await;
    let token = TokenGenerator.generate("127.0.0.1").unwrap();
    route.mailbox.insert_subject(token.as_str()).await;

    let (summary, output) =
        run_with(config(false, &[route.test("stale", true, true)]), Replay(token)).await;

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.reception, Reception::Ambiguous(2));
    assert!(!outcome.matched_expectation());
    assert_eq!(route.mailbox.len().await, 2, "ambiguous matches are left alone");
    assert!(output.contains("Found 2 messages carrying the probe token in INBOX"));
}

#[tokio::test]
async fn repeated_probes_leave_nothing_behind() {
    let route = Route::delivering().await;

    let (summary, _) = run(config(
        false,
        &[
            route.test("first", true, true),
            route.test("second", true, true),
        ],
    ))
    .await;

    assert_eq!(summary.passed(), 2);
    assert!(route.mailbox.is_empty().await);
    assert_eq!(route.relay.messages().await.len(), 2);
}
