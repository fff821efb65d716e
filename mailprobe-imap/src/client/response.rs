//! IMAP response representation and the parsers for the few response
//! shapes the probe consumes.

use std::fmt;

use super::error::{ImapError, Result};

/// Completion status of a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

impl Status {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
        })
    }
}

/// An untagged (`* ...`) response, with any literals it carried.
///
/// `text` keeps the literal markers (`{n}`) in place; the literal bytes are
/// in `literals`, in order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Untagged {
    pub text: String,
    pub literals: Vec<Vec<u8>>,
}

/// The tagged line that completes a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub tag: String,
    pub status: Status,
    pub text: String,
}

impl Completion {
    /// Parse `line` as the completion for `tag`.
    ///
    /// Returns `None` if the line carries a different tag.
    ///
    /// # Errors
    ///
    /// Returns [`ImapError::Parse`] if the tag matches but the status does not
    /// parse.
    pub fn parse(line: &str, tag: &str) -> Result<Option<Self>> {
        let Some(rest) = line
            .strip_prefix(tag)
            .and_then(|rest| rest.strip_prefix(' '))
        else {
            return Ok(None);
        };

        let (word, text) = rest.split_once(' ').unwrap_or((rest, ""));
        let status = Status::parse(word)
            .ok_or_else(|| ImapError::Parse(format!("Invalid completion: '{line}'")))?;

        Ok(Some(Self {
            tag: tag.to_string(),
            status,
            text: text.to_string(),
        }))
    }
}

/// Everything the server sent in answer to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub untagged: Vec<Untagged>,
    pub completion: Completion,
}

impl Response {
    /// Message sequence numbers from `* SEARCH` responses.
    #[must_use]
    pub fn search_ids(&self) -> Vec<u32> {
        self.untagged
            .iter()
            .filter_map(|item| {
                let rest = item.text.strip_prefix("* ")?;
                let (keyword, ids) = rest.split_once(' ').unwrap_or((rest, ""));
                keyword.eq_ignore_ascii_case("SEARCH").then_some(ids)
            })
            .flat_map(str::split_whitespace)
            .filter_map(|id| id.parse().ok())
            .collect()
    }

    /// `(sequence number, literal)` pairs from `* n FETCH (... {len}` responses.
    ///
    /// Used with `BODY.PEEK[HEADER.FIELDS (...)]`, whose payload is always
    /// the first literal of the response.
    #[must_use]
    pub fn fetched_literals(&self) -> Vec<(u32, &[u8])> {
        self.untagged
            .iter()
            .filter_map(|item| {
                let mut words = item.text.strip_prefix("* ")?.split(' ');
                let id = words.next()?.parse().ok()?;
                let keyword = words.next()?;
                if !keyword.eq_ignore_ascii_case("FETCH") {
                    return None;
                }
                let literal = item.literals.first()?;
                Some((id, literal.as_slice()))
            })
            .collect()
    }
}

/// Length of the literal announced at the end of `line`, if any.
///
/// Accepts both synchronising (`{12}`) and non-synchronising (`{12+}`)
/// forms.
#[must_use]
pub fn literal_length(line: &str) -> Option<usize> {
    let open = line.strip_suffix('}')?.rfind('{')?;
    line[open + 1..line.len() - 1]
        .trim_end_matches('+')
        .parse()
        .ok()
}

/// Render `value` as an IMAP quoted string.
///
/// # Errors
///
/// Returns [`ImapError::InvalidArgument`] for values containing CR, LF or
/// NUL, which a quoted string cannot carry.
pub fn quote(value: &str) -> Result<String> {
    if value.contains(['\r', '\n', '\0']) {
        return Err(ImapError::InvalidArgument(
            "line breaks are not allowed in quoted strings".to_string(),
        ));
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Ok(quoted)
}

/// Comma-separated sequence set, e.g. `3,7,9`.
#[must_use]
pub fn sequence_set(ids: &[u32]) -> String {
    ids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
