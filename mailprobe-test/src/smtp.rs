//! Mock SMTP relay.
//!
//! Answers each command with a configurable response, records what it
//! received and, given a [`Mailbox`], delivers accepted messages into it.

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use base64::Engine;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

use crate::Mailbox;

/// SMTP command received by the mock relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    /// `AUTH` with the login it carried, if it decoded
    Auth(Option<String>),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content after DATA, dot-unstuffed
    MessageContent(String),
    Quit,
    StartTls,
    Other(String),
}

#[derive(Debug, Clone)]
struct Reply {
    code: u16,
    message: String,
}

impl Reply {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct Config {
    greeting: Reply,
    capabilities: Vec<String>,
    mail_from: Reply,
    rcpt_to: Reply,
    data: Reply,
    data_end: Reply,
    credentials: Option<(String, String)>,
    mailbox: Option<Mailbox>,
    response_delay: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            greeting: Reply::new(220, "Mock SMTP Server"),
            capabilities: vec![
                "localhost".to_string(),
                "AUTH PLAIN LOGIN".to_string(),
                "SIZE 10000".to_string(),
            ],
            mail_from: Reply::new(250, "OK"),
            rcpt_to: Reply::new(250, "OK"),
            data: Reply::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end: Reply::new(250, "OK: Message accepted"),
            credentials: None,
            mailbox: None,
            response_delay: None,
        }
    }
}

impl Config {
    fn ehlo_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let last = self.capabilities.len().saturating_sub(1);

        for (i, capability) in self.capabilities.iter().enumerate() {
            let separator = if i < last { '-' } else { ' ' };
            let _ = write!(&mut response, "250{separator}{capability}\r\n");
        }

        response.into_bytes()
    }

    /// Reply to `AUTH PLAIN <initial response>` and the login it named.
    fn authenticate(&self, argument: &str) -> (Reply, Option<String>) {
        let mut words = argument.split_whitespace();
        let mechanism = words.next().unwrap_or_default();
        if !mechanism.eq_ignore_ascii_case("PLAIN") {
            return (Reply::new(504, "Unrecognized authentication type"), None);
        }

        let Some(decoded) = words
            .next()
            .and_then(|b64| base64::engine::general_purpose::STANDARD.decode(b64).ok())
            .and_then(|bytes| String::from_utf8(bytes).ok())
        else {
            return (Reply::new(501, "Malformed AUTH PLAIN"), None);
        };

        let mut parts = decoded.splitn(3, '\0').skip(1);
        let login = parts.next().unwrap_or_default().to_string();
        let secret = parts.next().unwrap_or_default();

        let accepted = self
            .credentials
            .as_ref()
            .is_none_or(|(l, s)| *l == login && s == secret);

        let reply = if accepted {
            Reply::new(235, "Authentication successful")
        } else {
            Reply::new(535, "Authentication credentials invalid")
        };
        (reply, Some(login))
    }
}

/// Mock SMTP relay for tests
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: Config::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// All commands received so far, across connections
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.read().await.clone()
    }

    /// Content of each message accepted with DATA
    pub async fn messages(&self) -> Vec<String> {
        self.commands
            .read()
            .await
            .iter()
            .filter_map(|c| match c {
                SmtpCommand::MessageContent(content) => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<Config>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        writer.write_all(&config.greeting.to_bytes()).await?;
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

            let command_line = line.trim();
            tracing::debug!("Mock SMTP server received: {command_line}");

            let (verb, argument) = command_line
                .split_once(' ')
                .unwrap_or((command_line, ""));

            let (response, command) = match verb.to_ascii_uppercase().as_str() {
                "EHLO" => (config.ehlo_bytes(), SmtpCommand::Ehlo(argument.to_string())),
                "AUTH" => {
                    let (reply, login) = config.authenticate(argument);
                    (reply.to_bytes(), SmtpCommand::Auth(login))
                }
                "MAIL" => (
                    config.mail_from.to_bytes(),
                    SmtpCommand::MailFrom(argument.to_string()),
                ),
                "RCPT" => (
                    config.rcpt_to.to_bytes(),
                    SmtpCommand::RcptTo(argument.to_string()),
                ),
                "DATA" => (config.data.to_bytes(), SmtpCommand::Data),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    writer.write_all(&Reply::new(221, "Bye").to_bytes()).await?;
                    writer.flush().await?;
                    return Ok(());
                }
                "STARTTLS" => (
                    Reply::new(502, "Command not implemented").to_bytes(),
                    SmtpCommand::StartTls,
                ),
                _ => (
                    Reply::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(command_line.to_string()),
                ),
            };

            let accepting_data = matches!(command, SmtpCommand::Data) && config.data.code == 354;
            commands.write().await.push(command);

            if let Some(delay) = config.response_delay {
                tokio::time::sleep(delay).await;
            }
            writer.write_all(&response).await?;
            writer.flush().await?;

            if accepting_data {
                let content = Self::read_message(&mut reader).await?;
                commands
                    .write()
                    .await
                    .push(SmtpCommand::MessageContent(content.clone()));

                if config.data_end.code / 100 == 2
                    && let Some(mailbox) = &config.mailbox
                {
                    mailbox.deliver(content).await;
                }

                writer.write_all(&config.data_end.to_bytes()).await?;
                writer.flush().await?;
            }
        }
    }

    /// Read message lines up to the terminating dot.
    async fn read_message<R>(reader: &mut R) -> std::io::Result<String>
    where
        R: AsyncBufReadExt + Unpin,
    {
        let mut content = String::new();
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(content);
            }

            let text = line.trim_end_matches(['\r', '\n']);
            if text == "." {
                return Ok(content);
            }

            content.push_str(text.strip_prefix('.').unwrap_or(text));
            content.push_str("\r\n");
        }
    }
}

/// Builder for configuring a [`MockSmtpServer`]
pub struct MockSmtpServerBuilder {
    config: Config,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = Reply::new(code, message);
        self
    }

    /// Replace the EHLO capability lines; the first is the domain line.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.config.capabilities = capabilities.iter().map(ToString::to_string).collect();
        self
    }

    /// Only accept `AUTH PLAIN` with this login and secret.
    #[must_use]
    pub fn with_credentials(mut self, login: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config.credentials = Some((login.into(), secret.into()));
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data = Reply::new(code, message);
        self
    }

    /// Response after the terminating `<CRLF>.<CRLF>`
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end = Reply::new(code, message);
        self
    }

    /// Deliver accepted messages into `mailbox`.
    #[must_use]
    pub fn delivering_to(mut self, mailbox: Mailbox) -> Self {
        self.config.mailbox = Some(mailbox);
        self
    }

    /// Delay every response after the greeting.
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
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
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
                    if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await {
                        tracing::debug!("Mock SMTP client error: {e}");
                    }
                });
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands,
            shutdown,
        })
    }
}
