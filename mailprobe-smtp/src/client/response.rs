//! SMTP response parsing and representation.

use super::error::{ClientError, Result};

/// Represents a single line in an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line response.
    pub is_last: bool,
    /// The message text following the status code.
    pub message: String,
}

/// Represents a complete SMTP response, which may be multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code.
    pub code: u16,
    /// All message lines in the response.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns the complete message as a single string with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns `true` if this response indicates success (2xx code).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns `true` if the server is waiting for more input (3xx code).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Whether an EHLO response advertises `keyword`.
    ///
    /// The first line of an EHLO response is the server greeting, the rest
    /// are extension keywords optionally followed by parameters.
    #[must_use]
    pub fn has_extension(&self, keyword: &str) -> bool {
        self.extension(keyword).is_some()
    }

    /// SASL mechanisms listed by the `AUTH` extension of an EHLO response.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.extension("AUTH")
            .map(|params| params.split_whitespace().map(str::to_ascii_uppercase).collect())
            .unwrap_or_default()
    }

    fn extension(&self, keyword: &str) -> Option<&str> {
        self.lines.iter().skip(1).find_map(|line| {
            let (name, params) = line.split_once([' ', '=']).unwrap_or((line.as_str(), ""));
            name.eq_ignore_ascii_case(keyword).then_some(params)
        })
    }

    /// Parses a single response line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code_str = line.get(..3).ok_or_else(|| {
            ClientError::ParseError(format!("Response line too short: '{line}'"))
        })?;
        let code = code_str.parse::<u16>().map_err(|_| {
            ClientError::ParseError(format!("Invalid status code: '{code_str}'"))
        })?;

        let is_last = match line.as_bytes().get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(c) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    char::from(*c)
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: line.get(4..).unwrap_or_default().to_string(),
        })
    }

    /// Parses a complete multi-line SMTP response from the front of a buffer.
    ///
    /// Returns the parsed `Response` and the number of bytes consumed, or
    /// `None` if the buffer does not hold a complete response yet.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the response is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut lines = Vec::new();
        let mut first_code = None;
        let mut consumed = 0;

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let text = String::from_utf8_lossy(raw);
            let text = text.trim_end_matches('\r');
            if text.is_empty() {
                continue;
            }

            let parsed = Self::parse_line(text)?;
            match first_code {
                Some(code) if code != parsed.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {code}, got {}",
                        parsed.code
                    )));
                }
                Some(_) => {}
                None => first_code = Some(parsed.code),
            }

            lines.push(parsed.message);

            if parsed.is_last {
                return Ok(Some((Self::new(parsed.code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line() {
        let line = ResponseLine {
            code: 220,
            is_last: true,
            message: "mail.example.com ESMTP".to_string(),
        };
        assert_eq!(
            Response::parse_line("220 mail.example.com ESMTP").unwrap(),
            line
        );
    }

    #[test]
    fn test_parse_bare_code() {
        let line = Response::parse_line("250").unwrap();
        assert!(line.is_last);
        assert!(line.message.is_empty());
    }

    #[test]
    fn test_parse_invalid_separator() {
        assert!(Response::parse_line("250+oops").is_err());
        assert!(Response::parse_line("2x0 oops").is_err());
        assert!(Response::parse_line("25").is_err());
    }

    #[test]
    fn test_parse_multi_line_response() {
        let data = b"250-mail.example.com\r\n250-SIZE 10000000\r\n250 HELP\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();
        assert_eq!(response.code, 250);
        assert_eq!(
            response.lines,
            vec!["mail.example.com", "SIZE 10000000", "HELP"]
        );
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_parse_leaves_trailing_bytes() {
        let data = b"250 OK\r\n221 Bye\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();
        assert_eq!(response.lines, vec!["OK"]);
        assert_eq!(consumed, 8);
    }

    #[test]
    fn test_parse_incomplete_response() {
        let data = b"250-mail.example.com\r\n250-SIZE";
        assert!(Response::parse_response(data).unwrap().is_none());
    }

    #[test]
    fn test_parse_eight_bit_greeting() {
        let data = b"220 mail.example.de ESMTP Gr\xfc\xdfe\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();
        assert_eq!(response.code, 220);
        assert!(response.is_success());
        assert_eq!(response.message(), "mail.example.de ESMTP Gr\u{fffd}\u{fffd}e");
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_code_mismatch_is_rejected() {
        let data = b"250-mail.example.com\r\n251 OK\r\n";
        assert!(Response::parse_response(data).is_err());
    }

    #[test]
    fn test_ehlo_extensions() {
        let response = Response::new(
            250,
            vec![
                "mail.example.com greets you".to_string(),
                "STARTTLS".to_string(),
                "AUTH LOGIN plain".to_string(),
                "SIZE 1000".to_string(),
            ],
        );

        assert!(response.has_extension("starttls"));
        assert!(response.has_extension("SIZE"));
        assert!(!response.has_extension("PIPELINING"));
        assert_eq!(response.auth_mechanisms(), vec!["LOGIN", "PLAIN"]);
    }

    #[test]
    fn test_greeting_line_is_not_an_extension() {
        let response = Response::new(250, vec!["STARTTLS".to_string()]);
        assert!(!response.has_extension("STARTTLS"));
        assert!(response.auth_mechanisms().is_empty());
    }

    #[test]
    fn test_classification() {
        assert!(Response::new(250, vec![]).is_success());
        assert!(Response::new(354, vec![]).is_intermediate());
        assert!(!Response::new(550, vec![]).is_success());
    }
}
