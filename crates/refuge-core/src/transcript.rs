//! Append-only message log for one chat session
//!
//! Insertion order is chronological order is display order. Entries are never
//! edited or removed; the whole log is dropped with its session.

use serde::Serialize;

use crate::annotator::extract_document_link;

/// Who produced a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// A single chat message as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageEntry {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_link: Option<String>,
}

impl MessageEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            document_link: None,
        }
    }

    pub fn agent(content: impl Into<String>, document_link: Option<String>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            document_link,
        }
    }

    /// Build an agent entry from a raw inbound frame, pulling out any document link
    pub fn from_agent_frame(raw: &str) -> Self {
        let (content, document_link) = extract_document_link(raw);
        Self::agent(content, document_link)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<MessageEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: MessageEntry) {
        self.entries.push(entry);
    }

    /// Every entry appended so far, in append order
    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    /// Owned copy of the log for readers that outlive the borrow
    pub fn snapshot(&self) -> Vec<MessageEntry> {
        self.entries.clone()
    }

    pub fn last(&self) -> Option<&MessageEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order_and_duplicates() {
        let mut transcript = Transcript::new();
        transcript.append(MessageEntry::user("hello"));
        transcript.append(MessageEntry::agent("hi", None));
        transcript.append(MessageEntry::user("hello"));

        let contents: Vec<&str> = transcript.entries().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "hi", "hello"]);
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.last().map(|e| e.role), Some(Role::User));
    }

    #[test]
    fn test_snapshot_is_independent_of_later_appends() {
        let mut transcript = Transcript::new();
        transcript.append(MessageEntry::user("one"));
        let snapshot = transcript.snapshot();
        transcript.append(MessageEntry::user("two"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn test_agent_frame_extracts_link() {
        let entry = MessageEntry::from_agent_frame("Guide: https://x.org/guide.pdf\n");
        assert_eq!(entry.role, Role::Agent);
        assert_eq!(entry.content, "Guide:");
        assert_eq!(entry.document_link.as_deref(), Some("https://x.org/guide.pdf"));
    }

    #[test]
    fn test_serializes_role_lowercase() {
        let json = serde_json::to_string(&MessageEntry::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
