//! Client requests.
//!
//! Every request starts with one `\0`-delimited frame. Uploads continue
//! outside that frame with a little-endian `u32` length and the raw body:
//!
//! ```text
//! /sync <lastId>\0          lastId = -1 for "no messages yet"
//! /dl <id>\0
//! /file <name>\0<u32 size><bytes>
//! <text>\0
//! ```
//!
//! [`RequestHead::decode`] parses the delimited frame alone and is total: any
//! byte sequence decodes to a head, nothing, or [`ProtocolError::Malformed`].
//! [`read_request`] drives a [`FrameReader`] through a complete request,
//! including the upload body.

use bytes::{BufMut, Bytes};
use tokio::io::AsyncRead;

use crate::{
    DELIMITER,
    errors::{ProtocolError, Result},
    framer::FrameReader,
    message::{MessageId, bounded_file_name},
};

const CMD_SYNC: &[u8] = b"/sync";
const CMD_DOWNLOAD: &[u8] = b"/dl";
const CMD_UPLOAD: &[u8] = b"/file";

/// Wire form of the "no messages yet" sync cursor.
pub const NO_MESSAGES: &str = "-1";

/// Name stored for uploads that arrive without one.
pub const UNNAMED_FILE: &str = "unnamed";

/// A complete client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Catch up on history after `cursor`; `None` means "no messages yet".
    Sync {
        /// Last message id the client has seen
        cursor: Option<MessageId>,
    },
    /// Download the payload of message `id`.
    Download {
        /// Requested message id
        id: MessageId,
    },
    /// Upload a file.
    Upload {
        /// File name as sent (already bounded)
        name: String,
        /// File content
        content: Bytes,
    },
    /// Post a text message.
    Post {
        /// Text bytes, verbatim
        text: Bytes,
    },
}

impl Request {
    /// Encode into `dst`, including delimiters and the upload body.
    ///
    /// Post text must not contain `\0`; callers strip it before building the
    /// request.
    pub fn encode(&self, dst: &mut impl BufMut) {
        match self {
            Self::Sync { cursor } => {
                dst.put_slice(CMD_SYNC);
                dst.put_u8(b' ');
                match cursor {
                    Some(id) => dst.put_slice(id.to_string().as_bytes()),
                    None => dst.put_slice(NO_MESSAGES.as_bytes()),
                }
                dst.put_u8(DELIMITER);
            },
            Self::Download { id } => {
                dst.put_slice(CMD_DOWNLOAD);
                dst.put_u8(b' ');
                dst.put_slice(id.to_string().as_bytes());
                dst.put_u8(DELIMITER);
            },
            Self::Upload { name, content } => {
                dst.put_slice(CMD_UPLOAD);
                dst.put_u8(b' ');
                dst.put_slice(name.as_bytes());
                dst.put_u8(DELIMITER);
                dst.put_u32_le(content.len() as u32);
                dst.put_slice(content);
            },
            Self::Post { text } => {
                debug_assert!(!text.contains(&DELIMITER));
                dst.put_slice(text);
                dst.put_u8(DELIMITER);
            },
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Request as far as the delimited frame tells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestHead {
    /// Request is complete after the frame.
    Complete(Request),
    /// Upload header; the size and body follow on the stream.
    Upload {
        /// Bounded file name
        name: String,
    },
}

impl RequestHead {
    /// Decode one delimited frame.
    ///
    /// The trailing delimiter is optional. Returns `Ok(None)` for an empty
    /// frame, which carries no request.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Malformed`] if a `/dl` or `/sync` argument is missing
    /// or not a number. The frame is consumed either way.
    pub fn decode(frame: &[u8]) -> Result<Option<Self>> {
        let body = frame.strip_suffix(&[DELIMITER]).unwrap_or(frame);
        if body.is_empty() {
            return Ok(None);
        }

        let (command, argument) = match body.iter().position(|&b| b == b' ') {
            Some(space) => (&body[..space], Some(&body[space + 1..])),
            None => (body, None),
        };

        let head = match command {
            CMD_SYNC => Self::Complete(Request::Sync { cursor: parse_cursor(argument)? }),
            CMD_DOWNLOAD => Self::Complete(Request::Download { id: parse_id(argument)? }),
            CMD_UPLOAD => {
                let name = String::from_utf8_lossy(argument.unwrap_or_default());
                let name = bounded_file_name(name.trim());
                let name = if name.is_empty() { UNNAMED_FILE.to_string() } else { name };
                Self::Upload { name }
            },
            _ => Self::Complete(Request::Post { text: Bytes::copy_from_slice(body) }),
        };

        Ok(Some(head))
    }
}

/// Read one complete request, skipping empty frames.
///
/// Uploads are bounded by the reader's `max_size`.
///
/// # Errors
///
/// - [`ProtocolError::Malformed`] for an unparsable `/dl` or `/sync`; the
///   stream stays aligned and the caller may keep reading
/// - [`ProtocolError::UploadTooLarge`] if the declared upload size exceeds the
///   maximum; the body is left unread
/// - any framer error
pub async fn read_request<R>(reader: &mut FrameReader<R>) -> Result<Request>
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = reader.read_until(DELIMITER).await?;

        match RequestHead::decode(&frame)? {
            None => continue,
            Some(RequestHead::Complete(request)) => return Ok(request),
            Some(RequestHead::Upload { name }) => {
                let size_bytes = reader.read_exact(4).await?;
                let mut size = [0u8; 4];
                size.copy_from_slice(&size_bytes);
                let size = u32::from_le_bytes(size);

                let max = reader.config().max_size;
                if size as usize > max {
                    return Err(ProtocolError::UploadTooLarge { size, max });
                }

                let content = reader.read_exact(size as usize).await?;
                return Ok(Request::Upload { name, content });
            },
        }
    }
}

fn parse_id(argument: Option<&[u8]>) -> Result<MessageId> {
    let text = argument
        .map(|a| String::from_utf8_lossy(a).trim().to_string())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ProtocolError::Malformed("missing message id".to_string()))?;

    text.parse::<MessageId>()
        .map_err(|e| ProtocolError::Malformed(format!("invalid message id '{text}': {e}")))
}

fn parse_cursor(argument: Option<&[u8]>) -> Result<Option<MessageId>> {
    let is_sentinel = argument.is_some_and(|a| a.trim_ascii() == NO_MESSAGES.as_bytes());
    if is_sentinel {
        return Ok(None);
    }
    parse_id(argument).map(Some)
}
