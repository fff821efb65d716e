//! Mock IMAP server over plain TCP, serving a single [`Mailbox`] as INBOX.
//!
//! Understands the commands a probe uses: `LOGIN`, `SELECT`,
//! `SEARCH HEADER Subject`, `FETCH ... BODY.PEEK[HEADER.FIELDS (SUBJECT)]`,
//! `STORE ... +FLAGS.SILENT (\Deleted)`, `EXPUNGE` and `LOGOUT`.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

use crate::Mailbox;

#[derive(Clone)]
struct Config {
    mailbox: Mailbox,
    credentials: Option<(String, String)>,
    /// Commands answered with `NO`
    refused: Vec<String>,
    response_delay: Option<Duration>,
}

/// Mock IMAP server for tests
pub struct MockImapServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<String>>>,
    shutdown: Arc<AtomicBool>,
}

/// Split IMAP arguments into atoms and quoted strings.
fn arguments(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c == ' ' {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut value = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '"' => break,
                    c => value.push(c),
                }
            }
            args.push(value);
        } else {
            let mut value = String::new();
            while let Some(&c) = chars.peek() {
                if c == ' ' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            args.push(value);
        }
    }

    args
}

fn sequence_numbers(set: &str) -> Vec<usize> {
    set.split(',').filter_map(|id| id.parse().ok()).collect()
}

impl MockImapServer {
    #[must_use]
    pub fn builder(mailbox: Mailbox) -> MockImapServerBuilder {
        MockImapServerBuilder {
            config: Config {
                mailbox,
                credentials: None,
                refused: Vec::new(),
                response_delay: None,
            },
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Command names received so far, upper-cased, across connections
    pub async fn commands(&self) -> Vec<String> {
        self.commands.read().await.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<Config>,
        commands: Arc<RwLock<Vec<String>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut authenticated = false;
        let mut selected = false;

        writer.write_all(b"* OK Mock IMAP Server ready\r\n").await?;
        writer.flush().await?;

        loop {
            line.clear();

            let Ok(read) = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await
            else {
                return Ok(());
            };
            if read? == 0 {
                return Ok(());
            }

            let command_line = line.trim_end_matches(['\r', '\n']);
            let mut parts = command_line.splitn(3, ' ');
            let tag = parts.next().unwrap_or("*").to_string();
            let verb = parts.next().unwrap_or_default().to_ascii_uppercase();
            let args = arguments(parts.next().unwrap_or_default());

            if verb != "LOGIN" {
                tracing::debug!("Mock IMAP server received: {command_line}");
            }
            commands.write().await.push(verb.clone());

            if let Some(delay) = config.response_delay {
                tokio::time::sleep(delay).await;
            }

            let mut response = String::new();
            let completion = if config.refused.contains(&verb) {
                format!("NO {verb} refused")
            } else {
                match verb.as_str() {
                    "LOGIN" => {
                        let accepted = config.credentials.as_ref().is_none_or(|(l, s)| {
                            args.first() == Some(l) && args.get(1) == Some(s)
                        });
                        authenticated = accepted;
                        if accepted {
                            "OK LOGIN completed".to_string()
                        } else {
                            "NO [AUTHENTICATIONFAILED] Invalid credentials".to_string()
                        }
                    }
                    "SELECT" if !authenticated => "BAD Not authenticated".to_string(),
                    "SELECT" => {
                        if args.first().is_some_and(|f| f.eq_ignore_ascii_case("INBOX")) {
                            selected = true;
                            let exists = config.mailbox.len().await;
                            response.push_str(&format!("* {exists} EXISTS\r\n"));
                            "OK [READ-WRITE] SELECT completed".to_string()
                        } else {
                            "NO Mailbox does not exist".to_string()
                        }
                    }
                    "SEARCH" | "FETCH" | "STORE" | "EXPUNGE" if !selected => {
                        "BAD No mailbox selected".to_string()
                    }
                    "SEARCH" => {
                        let needle = args.last().cloned().unwrap_or_default();
                        let ids = config.mailbox.search_subject(&needle).await;
                        response.push_str("* SEARCH");
                        for id in ids {
                            response.push_str(&format!(" {id}"));
                        }
                        response.push_str("\r\n");
                        "OK SEARCH completed".to_string()
                    }
                    "FETCH" => {
                        for id in sequence_numbers(args.first().map_or("", String::as_str)) {
                            if let Some(subject) = config.mailbox.subject_at(id).await {
                                let block = format!("Subject: {subject}\r\n\r\n");
                                response.push_str(&format!(
                                    "* {id} FETCH (BODY[HEADER.FIELDS (SUBJECT)] {{{}}}\r\n{block})\r\n",
                                    block.len()
                                ));
                            }
                        }
                        "OK FETCH completed".to_string()
                    }
                    "STORE" => {
                        for id in sequence_numbers(args.first().map_or("", String::as_str)) {
                            config.mailbox.mark_deleted(id).await;
                        }
                        "OK STORE completed".to_string()
                    }
                    "EXPUNGE" => {
                        for id in config.mailbox.expunge().await {
                            response.push_str(&format!("* {id} EXPUNGE\r\n"));
                        }
                        "OK EXPUNGE completed".to_string()
                    }
                    "LOGOUT" => {
                        response.push_str(&format!(
                            "* BYE Logging out\r\n{tag} OK LOGOUT completed\r\n"
                        ));
                        writer.write_all(response.as_bytes()).await?;
                        writer.flush().await?;
                        return Ok(());
                    }
                    _ => "BAD Unknown command".to_string(),
                }
            };

            response.push_str(&format!("{tag} {completion}\r\n"));
            writer.write_all(response.as_bytes()).await?;
            writer.flush().await?;
        }
    }
}

/// Builder for configuring a [`MockImapServer`]
pub struct MockImapServerBuilder {
    config: Config,
}

impl MockImapServerBuilder {
    /// Only accept `LOGIN` with this login and secret.
    #[must_use]
    pub fn with_credentials(mut self, login: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config.credentials = Some((login.into(), secret.into()));
        self
    }

    /// Answer `command` (e.g. `"STORE"`) with `NO`.
    #[must_use]
    pub fn refusing(mut self, command: &str) -> Self {
        self.config.refused.push(command.to_ascii_uppercase());
        self
    }

    /// Delay every tagged response.
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Bind to a free loopback port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn build(self) -> Result<MockImapServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let task_commands = Arc::clone(&commands);
        let task_shutdown = Arc::clone(&shutdown);

        tokio::spawn(async move {
            while !task_shutdown.load(Ordering::Relaxed) {
                let Ok(Ok((stream, _peer))) =
                    timeout(Duration::from_millis(100), listener.accept()).await
                else {
                    continue;
                };

                let config = Arc::clone(&config);
                let commands = Arc::clone(&task_commands);
                tokio::spawn(async move {
                    if let Err(e) = MockImapServer::handle_client(stream, config, commands).await {
                        tracing::debug!("Mock IMAP client error: {e}");
                    }
                });
            }
        });

        Ok(MockImapServer {
            addr,
            commands,
            shutdown,
        })
    }
}
