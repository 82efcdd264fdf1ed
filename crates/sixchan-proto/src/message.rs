//! Message model.
//!
//! A [`Message`] is one entry of the shared history: a text post, an uploaded
//! file, or a system announcement. Messages are immutable once built; the
//! history store assigns the id exactly once via [`Message::with_id`] before
//! sharing the message behind an `Arc`.

use bytes::Bytes;
use chrono::NaiveDateTime;

/// History-wide message identifier. Strictly increasing in append order.
pub type MessageId = u32;

/// Connection identifier, assigned sequentially from 1 at accept time.
pub type ClientId = u32;

/// Sender id of system messages (join announcements, welcome).
pub const SYSTEM_SENDER: ClientId = 0;

/// Id of the synthetic welcome message. Never stored in history.
pub const WELCOME_MESSAGE_ID: MessageId = 0;

/// Longest stored file name, in bytes.
pub const FILE_NAME_MAX: usize = 31;

/// What a message carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Text post; the payload is the text as sent
    Text,
    /// Uploaded file; the payload is the file content
    File {
        /// Bounded file name, see [`FILE_NAME_MAX`]
        name: String,
    },
}

/// One history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    sender_id: ClientId,
    kind: MessageKind,
    payload: Bytes,
    timestamp: NaiveDateTime,
}

impl Message {
    /// Text post from `sender_id`. The id is unset until appended.
    pub fn text(sender_id: ClientId, payload: impl Into<Bytes>, timestamp: NaiveDateTime) -> Self {
        Self {
            id: WELCOME_MESSAGE_ID,
            sender_id,
            kind: MessageKind::Text,
            payload: payload.into(),
            timestamp,
        }
    }

    /// File upload from `sender_id`. The name is truncated to
    /// [`FILE_NAME_MAX`] bytes.
    pub fn file(
        sender_id: ClientId,
        name: &str,
        content: impl Into<Bytes>,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            id: WELCOME_MESSAGE_ID,
            sender_id,
            kind: MessageKind::File { name: bounded_file_name(name) },
            payload: content.into(),
            timestamp,
        }
    }

    /// System text message (sender 0).
    pub fn system(text: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self::text(SYSTEM_SENDER, Bytes::from(text.into()), timestamp)
    }

    /// Same message carrying `id`.
    #[must_use]
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    /// Message id (0 until appended, and for the welcome message).
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Sender id, [`SYSTEM_SENDER`] for system messages.
    pub fn sender_id(&self) -> ClientId {
        self.sender_id
    }

    /// Message kind.
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Payload bytes: the text, or the file content.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Wall-clock creation time.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// File name for file messages.
    pub fn file_name(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::File { name } => Some(name),
            MessageKind::Text => None,
        }
    }

    /// Whether this is a system message.
    pub fn is_system(&self) -> bool {
        self.sender_id == SYSTEM_SENDER
    }
}

/// Truncate `name` to at most [`FILE_NAME_MAX`] bytes on a char boundary.
pub fn bounded_file_name(name: &str) -> String {
    if name.len() <= FILE_NAME_MAX {
        return name.to_string();
    }

    let mut end = FILE_NAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_opt(12, 0, 0)).unwrap()
    }

    #[test]
    fn new_messages_are_unassigned() {
        let msg = Message::text(3, "hi", noon());
        assert_eq!(msg.id(), 0);
        assert_eq!(msg.with_id(7).id(), 7);
    }

    #[test]
    fn system_messages_have_sender_zero() {
        let msg = Message::system("joined", noon());
        assert!(msg.is_system());
        assert_eq!(msg.payload(), &Bytes::from_static(b"joined"));
    }

    #[test]
    fn file_names_are_bounded() {
        let long = "a".repeat(40);
        let msg = Message::file(1, &long, vec![1, 2, 3], noon());
        assert_eq!(msg.file_name().map(str::len), Some(FILE_NAME_MAX));
        assert_eq!(msg.len(), 3);
    }

    #[test]
    fn file_names_truncate_on_char_boundary() {
        // 15 two-byte chars = 30 bytes, the 16th would straddle the limit
        let name = "é".repeat(16);
        let bounded = bounded_file_name(&name);
        assert_eq!(bounded.len(), 30);
        assert_eq!(bounded.chars().count(), 15);
    }
}
