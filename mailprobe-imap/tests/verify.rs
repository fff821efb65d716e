//! Verification against the mock IMAP server.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use mailprobe_common::{
    config::Inbound,
    secret::Secret,
    traits::transport::{Verification, Verify},
};
use mailprobe_imap::{ImapVerifier, Step, VerifyError};
use mailprobe_test::{Mailbox, MockImapServer};
use pretty_assertions::assert_eq;

const TOKEN: &str = "0c1d2e3f4a5b6c7d8e9f0a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0c1d";

async fn server(mailbox: &Mailbox) -> MockImapServer {
    MockImapServer::builder(mailbox.clone())
        .with_credentials("inbox@example.net", "s3cret \"quoted\"")
        .build()
        .await
        .unwrap()
}

fn inbound(server: &MockImapServer) -> Inbound {
    Inbound {
        host: "127.0.0.1".to_string(),
        port: server.addr().port(),
        login: "inbox@example.net".to_string(),
        secret: Secret::new("s3cret \"quoted\""),
        tls: false,
        folder: "INBOX".to_string(),
        accept_invalid_certs: false,
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn found_probe_is_deleted() {
    let mailbox = Mailbox::new();
    mailbox.insert_subject("Weekly report").await;
    mailbox.insert_subject(TOKEN).await;
    let server = server(&mailbox).await;

    let result = ImapVerifier.verify(&inbound(&server), TOKEN, false).await;

    assert_eq!(result.unwrap(), Verification::Found);
    assert_eq!(mailbox.subjects().await, vec!["Weekly report".to_string()]);
    assert_eq!(
        server.commands().await,
        vec!["LOGIN", "SELECT", "SEARCH", "FETCH", "STORE", "EXPUNGE", "LOGOUT"]
    );
}

#[tokio::test]
async fn found_probe_can_be_left_in_place() {
    let mailbox = Mailbox::new();
    mailbox.insert_subject(TOKEN).await;
    let server = server(&mailbox).await;

    let result = ImapVerifier.verify(&inbound(&server), TOKEN, true).await;

    assert_eq!(result.unwrap(), Verification::Found);
    assert_eq!(mailbox.len().await, 1);
    assert!(!server.commands().await.contains(&"STORE".to_string()));
}

#[tokio::test]
async fn missing_probe() {
    let mailbox = Mailbox::new();
    mailbox.insert_subject("Something else").await;
    let server = server(&mailbox).await;

    let result = ImapVerifier.verify(&inbound(&server), TOKEN, false).await;

    assert_eq!(result.unwrap(), Verification::NotFound);
    assert_eq!(mailbox.len().await, 1);
    assert_eq!(server.commands().await.last().map(String::as_str), Some("LOGOUT"));
}

#[tokio::test]
async fn substring_matches_are_not_the_probe() {
    let mailbox = Mailbox::new();
    mailbox.insert_subject(&format!("Re: {TOKEN}")).await;
    mailbox.insert_subject(&format!("{TOKEN}-old")).await;
    let server = server(&mailbox).await;

    let result = ImapVerifier.verify(&inbound(&server), TOKEN, false).await;

    assert_eq!(result.unwrap(), Verification::NotFound);
    assert_eq!(mailbox.len().await, 2);
}

#[tokio::test]
async fn duplicate_probes_are_ambiguous_and_kept() {
    let mailbox = Mailbox::new();
    mailbox.insert_subject(TOKEN).await;
    mailbox.insert_subject(TOKEN).await;
    let server = server(&mailbox).await;

    let result = ImapVerifier.verify(&inbound(&server), TOKEN, false).await;

    assert_eq!(result.unwrap(), Verification::Ambiguous(2));
    assert_eq!(mailbox.len().await, 2);
}

#[tokio::test]
async fn bad_login_still_logs_out() {
    let mailbox = Mailbox::new();
    mailbox.insert_subject(TOKEN).await;
    let server = server(&mailbox).await;

    let mut inbound = inbound(&server);
    inbound.secret = Secret::new("wrong");

    let err = ImapVerifier
        .verify(&inbound, TOKEN, false)
        .await
        .unwrap_err();

    assert_eq!(err.step(), Step::Login);
    assert!(matches!(err, VerifyError::Imap { .. }));
    assert_eq!(server.commands().await, vec!["LOGIN", "LOGOUT"]);
    assert_eq!(mailbox.len().await, 1);
}

#[tokio::test]
async fn unknown_folder() {
    let mailbox = Mailbox::new();
    let server = server(&mailbox).await;

    let mut inbound = inbound(&server);
    inbound.folder = "Archive".to_string();

    let err = ImapVerifier
        .verify(&inbound, TOKEN, false)
        .await
        .unwrap_err();

    assert_eq!(err.step(), Step::Select);
}

#[tokio::test]
async fn failed_delete_is_an_error() {
    let mailbox = Mailbox::new();
    mailbox.insert_subject(TOKEN).await;
    let server = MockImapServer::builder(mailbox.clone())
        .refusing("STORE")
        .build()
        .await
        .unwrap();

    let err = ImapVerifier
        .verify(&inbound(&server), TOKEN, false)
        .await
        .unwrap_err();

    assert_eq!(err.step(), Step::Store);
    assert_eq!(server.commands().await.last().map(String::as_str), Some("LOGOUT"));
}

#[tokio::test]
async fn slow_server_times_out() {
    let mailbox = Mailbox::new();
    let server = MockImapServer::builder(mailbox.clone())
        .with_response_delay(Duration::from_secs(2))
        .build()
        .await
        .unwrap();

    let mut inbound = inbound(&server);
    inbound.timeout = Duration::from_millis(200);

    let err = ImapVerifier
        .verify(&inbound, TOKEN, false)
        .await
        .unwrap_err();

    assert!(matches!(err, VerifyError::Timeout { step: Step::Login, .. }));
}
