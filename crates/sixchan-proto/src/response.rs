//! Server responses.
//!
//! Everything the server sends outside a download is a `\0`-terminated line:
//!
//! ```text
//! #<id> [hh:mm] Anonim #<sender>: <text>\0              text post
//! #<id> [hh:mm] <text>\0                                system message
//! #<id> [hh:mm] Anonim #<sender>: File '<name>' (<size> bytes). Type '/dl <id>' to download\0
//! <notice>\0                                            upload replies
//! \0                                                    end of sync batch
//! ```
//!
//! The client side only needs the leading `#<id>` and the sender `#<n>` to
//! track its cursor and pick an accent; [`Response::parse`] extracts both.

use bytes::BufMut;

use crate::{
    DELIMITER,
    message::{ClientId, Message, MessageId, MessageKind},
};

/// Reply to an accepted upload.
pub const UPLOAD_ACCEPTED: &str = "File uploaded";

/// Reply to an upload whose declared size is over the limit.
pub const UPLOAD_REJECTED: &str = "File rejected: too large";

/// Bytes a text post gains when encoded as a history line, at most.
///
/// The header with the widest possible ids, plus the delimiter. A post whose
/// payload plus this overhead exceeds the readers' frame limit cannot be
/// delivered and must not be stored.
pub const POST_LINE_OVERHEAD: usize = "#4294967295 [hh:mm] Anonim #4294967295: ".len() + 1;

/// Encode `message` as a history line.
pub fn encode_message(message: &Message, dst: &mut impl BufMut) {
    let time = message.timestamp().format("%H:%M");
    let header = if message.is_system() {
        format!("#{} [{time}] ", message.id())
    } else {
        format!("#{} [{time}] Anonim #{}: ", message.id(), message.sender_id())
    };
    dst.put_slice(header.as_bytes());

    match message.kind() {
        MessageKind::Text => dst.put_slice(message.payload()),
        MessageKind::File { name } => {
            let line = format!(
                "File '{name}' ({} bytes). Type '/dl {}' to download",
                message.len(),
                message.id()
            );
            dst.put_slice(line.as_bytes());
        },
    }
    dst.put_u8(DELIMITER);
}

/// Encode a plain notice line.
pub fn encode_notice(text: &str, dst: &mut impl BufMut) {
    dst.put_slice(text.as_bytes());
    dst.put_u8(DELIMITER);
}

/// Encode the end-of-batch terminator.
pub fn encode_terminator(dst: &mut impl BufMut) {
    dst.put_u8(DELIMITER);
}

/// A response line as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Empty frame closing a sync batch.
    Terminator,
    /// History line.
    Message {
        /// Leading `#<id>`
        id: MessageId,
        /// Id after the second `#`, if any
        sender: Option<ClientId>,
        /// Whole line without the delimiter
        text: String,
    },
    /// Any other line.
    Notice(String),
}

impl Response {
    /// Classify one frame (trailing delimiter optional).
    pub fn parse(frame: &[u8]) -> Self {
        let body = frame.strip_suffix(&[DELIMITER]).unwrap_or(frame);
        if body.is_empty() {
            return Self::Terminator;
        }

        let text = String::from_utf8_lossy(body).into_owned();
        let Some(rest) = text.strip_prefix('#') else {
            return Self::Notice(text);
        };
        let Some(id) = leading_number(rest) else {
            return Self::Notice(text);
        };
        let sender = rest.find('#').and_then(|at| leading_number(&rest[at + 1..]));

        Self::Message { id, sender, text }
    }

    /// Whether this closes a sync batch.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::Terminator)
    }
}

fn leading_number(s: &str) -> Option<u32> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}
