use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Stored {
    raw: String,
    deleted: bool,
}

/// An in-memory folder shared between the mock servers and the test body.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    messages: Arc<RwLock<Vec<Stored>>>,
}

/// `Subject` header of a raw message, if it has one.
pub(crate) fn subject_of(raw: &str) -> Option<&str> {
    raw.lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("Subject").then(|| value.trim())
        })
}

impl Mailbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw message.
    pub async fn deliver(&self, raw: impl Into<String>) {
        self.messages.write().await.push(Stored {
            raw: raw.into(),
            deleted: false,
        });
    }

    /// Append a minimal message with the given subject.
    pub async fn insert_subject(&self, subject: &str) {
        self.deliver(format!(
            "From: seed@example.com\r\nSubject: {subject}\r\n\r\n"
        ))
        .await;
    }

    /// Subjects of all messages, in mailbox order.
    pub async fn subjects(&self) -> Vec<String> {
        self.messages
            .read()
            .await
            .iter()
            .map(|m| subject_of(&m.raw).unwrap_or_default().to_string())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// One-based sequence numbers of messages whose subject contains
    /// `needle`, ignoring ASCII case.
    pub(crate) async fn search_subject(&self, needle: &str) -> Vec<usize> {
        let needle = needle.to_ascii_lowercase();
        self.messages
            .read()
            .await
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                subject_of(&m.raw).is_some_and(|s| s.to_ascii_lowercase().contains(&needle))
            })
            .map(|(index, _)| index + 1)
            .collect()
    }

    pub(crate) async fn subject_at(&self, id: usize) -> Option<String> {
        let messages = self.messages.read().await;
        let message = messages.get(id.checked_sub(1)?)?;
        Some(subject_of(&message.raw).unwrap_or_default().to_string())
    }

    pub(crate) async fn mark_deleted(&self, id: usize) -> bool {
        let mut messages = self.messages.write().await;
        match id.checked_sub(1).and_then(|index| messages.get_mut(index)) {
            Some(message) => {
                message.deleted = true;
                true
            }
            None => false,
        }
    }

    /// Remove deleted messages, returning their sequence numbers highest
    /// first, as EXPUNGE responses must be sent.
    pub(crate) async fn expunge(&self) -> Vec<usize> {
        let mut messages = self.messages.write().await;
        let removed: Vec<usize> = messages
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, m)| m.deleted)
            .map(|(index, _)| index + 1)
            .collect();
        messages.retain(|m| !m.deleted);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_header_is_found_in_header_block_only() {
        assert_eq!(subject_of("To: a\r\nsubject:  hi \r\n\r\n"), Some("hi"));
        assert_eq!(subject_of("To: a\r\n\r\nSubject: body"), None);
    }

    #[tokio::test]
    async fn expunge_reports_highest_first() {
        let mailbox = Mailbox::new();
        for subject in ["a", "b", "c"] {
            mailbox.insert_subject(subject).await;
        }

        assert!(mailbox.mark_deleted(1).await);
        assert!(mailbox.mark_deleted(3).await);
        assert!(!mailbox.mark_deleted(4).await);

        assert_eq!(mailbox.expunge().await, vec![3, 1]);
        assert_eq!(mailbox.subjects().await, vec!["b"]);
    }
}
