use mailparse::MailHeaderMap;
use mailprobe_common::{error::ConnectionError, incoming, net::Connection, outgoing, tracing};

use super::{
    error::{ImapError, Result},
    response::{Completion, Response, Status, Untagged, literal_length, quote, sequence_set},
};

/// Size of each read from the connection.
const READ_CHUNK: usize = 8192;

/// Upper bound on a single line or literal (4MB).
const MAX_ITEM_SIZE: usize = 4 * 1024 * 1024;

/// An IMAP session over a plain or TLS connection.
pub struct ImapClient {
    connection: Connection,
    buffer: Vec<u8>,
    next_tag: u32,
}

impl ImapClient {
    /// Connects to `addr` and reads the server greeting.
    ///
    /// With `tls` set the session is encrypted from the first byte (IMAPS);
    /// `domain` is used for certificate verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the server does not greet
    /// with `OK` or `PREAUTH`.
    pub async fn connect(
        addr: &str,
        domain: &str,
        tls: bool,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let connection = if tls {
            Connection::connect_tls(addr, domain, accept_invalid_certs).await?
        } else {
            Connection::connect(addr).await?
        };

        let mut client = Self {
            connection,
            buffer: Vec::with_capacity(READ_CHUNK),
            next_tag: 1,
        };

        let greeting = client.read_item().await?;
        incoming!("{}", greeting.text);
        let accepted = greeting
            .text
            .strip_prefix("* ")
            .and_then(|rest| rest.split(' ').next())
            .is_some_and(|status| {
                status.eq_ignore_ascii_case("OK") || status.eq_ignore_ascii_case("PREAUTH")
            });

        if accepted {
            Ok(client)
        } else {
            Err(ImapError::Greeting(greeting.text))
        }
    }

    /// Authenticates with `LOGIN`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the credentials.
    pub async fn login(&mut self, user: &str, secret: &str) -> Result<()> {
        let command = format!("LOGIN {} {}", quote(user)?, quote(secret)?);
        self.execute("LOGIN", &command, Some("LOGIN <redacted>"))
            .await
            .map(drop)
    }

    /// Opens `folder` read-write.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder does not exist or cannot be opened.
    pub async fn select(&mut self, folder: &str) -> Result<()> {
        let command = format!("SELECT {}", quote(folder)?);
        self.execute("SELECT", &command, None).await.map(drop)
    }

    /// Sequence numbers of messages whose `Subject` contains `needle`.
    ///
    /// IMAP header search is a case-insensitive substring match, so callers
    /// wanting an exact match must check the candidates with
    /// [`ImapClient::fetch_subjects`].
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub async fn search_subject(&mut self, needle: &str) -> Result<Vec<u32>> {
        let command = format!("SEARCH HEADER Subject {}", quote(needle)?);
        Ok(self.execute("SEARCH", &command, None).await?.search_ids())
    }

    /// Decoded `Subject` header of each message in `ids`.
    ///
    /// Messages without a `Subject` are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails or a header block does not parse.
    pub async fn fetch_subjects(&mut self, ids: &[u32]) -> Result<Vec<(u32, String)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let command = format!(
            "FETCH {} BODY.PEEK[HEADER.FIELDS (SUBJECT)]",
            sequence_set(ids)
        );
        let response = self.execute("FETCH", &command, None).await?;

        let mut subjects = Vec::new();
        for (id, block) in response.fetched_literals() {
            let (headers, _) = mailparse::parse_headers(block)
                .map_err(|e| ImapError::Parse(format!("Header block of message {id}: {e}")))?;
            if let Some(subject) = headers.get_first_value("Subject") {
                subjects.push((id, subject.trim().to_string()));
            }
        }

        Ok(subjects)
    }

    /// Flags the messages in `ids` as `\Deleted`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn mark_deleted(&mut self, ids: &[u32]) -> Result<()> {
        let command = format!("STORE {} +FLAGS.SILENT (\\Deleted)", sequence_set(ids));
        self.execute("STORE", &command, None).await.map(drop)
    }

    /// Permanently removes every `\Deleted` message from the selected folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the expunge fails.
    pub async fn expunge(&mut self) -> Result<()> {
        self.execute("EXPUNGE", "EXPUNGE", None).await.map(drop)
    }

    /// Ends the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not acknowledge the logout.
    pub async fn logout(mut self) -> Result<()> {
        match self.execute("LOGOUT", "LOGOUT", None).await {
            Ok(_) | Err(ImapError::Connection(ConnectionError::Closed)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Sends `command` under a fresh tag and collects the response.
    ///
    /// `redacted` replaces the command in logs.
    async fn execute(
        &mut self,
        name: &'static str,
        command: &str,
        redacted: Option<&str>,
    ) -> Result<Response> {
        let tag = format!("A{:04}", self.next_tag);
        self.next_tag += 1;

        outgoing!("{tag} {}", redacted.unwrap_or(command));
        self.connection
            .send(format!("{tag} {command}\r\n").as_bytes())
            .await?;

        let response = self.read_response(&tag).await?;
        match response.completion.status {
            Status::Ok => Ok(response),
            status => Err(ImapError::Rejected {
                command: name,
                status,
                text: response.completion.text,
            }),
        }
    }

    async fn read_response(&mut self, tag: &str) -> Result<Response> {
        let mut untagged = Vec::new();

        loop {
            let item = self.read_item().await?;
            incoming!("{}", item.text);

            if let Some(completion) = Completion::parse(&item.text, tag)? {
                return Ok(Response {
                    untagged,
                    completion,
                });
            }

            if item.text.starts_with("* ") {
                untagged.push(item);
            } else {
                tracing::debug!(line = %item.text, "Ignoring unexpected IMAP response");
            }
        }
    }

    /// Reads one logical response line, pulling in any literals it announces.
    async fn read_item(&mut self) -> Result<Untagged> {
        let mut item = Untagged {
            text: self.read_line().await?,
            literals: Vec::new(),
        };

        while let Some(length) = literal_length(&item.text) {
            item.literals.push(self.read_exact(length).await?);
            let rest = self.read_line().await?;
            item.text.push_str(&rest);
        }

        Ok(item)
    }

    async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=end).collect();
                let line = String::from_utf8_lossy(&line);
                return Ok(line.trim_end_matches(['\r', '\n']).to_string());
            }

            self.fill().await?;
        }
    }

    async fn read_exact(&mut self, length: usize) -> Result<Vec<u8>> {
        if length > MAX_ITEM_SIZE {
            return Err(ImapError::Parse(format!(
                "Literal too large ({length} bytes)"
            )));
        }

        while self.buffer.len() < length {
            self.fill().await?;
        }

        Ok(self.buffer.drain(..length).collect())
    }

    async fn fill(&mut self) -> Result<()> {
        if self.buffer.len() > MAX_ITEM_SIZE {
            return Err(ImapError::Parse(format!(
                "Response too large (exceeds {MAX_ITEM_SIZE} bytes)"
            )));
        }

        let mut chunk = [0u8; READ_CHUNK];
        let n = self.connection.read(&mut chunk).await?;
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}
