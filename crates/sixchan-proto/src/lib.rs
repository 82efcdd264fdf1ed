//! Sixchan wire protocol.
//!
//! The chat broker speaks a small protocol over any reliable duplex byte
//! stream (TCP or a local stream socket). There are no fixed-size messages:
//! requests and most responses are `\0`-delimited lines, and binary payloads
//! (uploads, downloads) travel behind an explicit little-endian `u32` length.
//!
//! # Components
//!
//! - [`FrameReader`]: connection-scoped buffer turning a byte stream into
//!   delimited or length-framed chunks, robust to arbitrary segmentation
//! - [`Message`]: one history entry (text, file, or system line)
//! - [`Request`] / [`read_request`]: client requests and their decoding
//! - [`encode_message`] / [`Response`]: server lines and their client-side
//!   classification
//! - [`DownloadHeader`] / [`read_download`]: binary download replies
//!
//! The crate performs no I/O of its own beyond reading from the
//! `AsyncRead` handed to a [`FrameReader`]; writers encode into any
//! [`bytes::BufMut`].

#![forbid(unsafe_code)]

pub mod errors;
pub mod framer;
pub mod header;
pub mod message;
pub mod request;
pub mod response;

pub use errors::{ProtocolError, Result};
pub use framer::{FrameReader, FramerConfig};
pub use header::{DownloadHeader, read_download};
pub use message::{
    ClientId, FILE_NAME_MAX, Message, MessageId, MessageKind, SYSTEM_SENDER, WELCOME_MESSAGE_ID,
    bounded_file_name,
};
pub use request::{NO_MESSAGES, Request, RequestHead, UNNAMED_FILE, read_request};
pub use response::{
    POST_LINE_OVERHEAD, Response, UPLOAD_ACCEPTED, UPLOAD_REJECTED, encode_message, encode_notice,
    encode_terminator,
};

/// Delimiter closing every request frame and every response line.
pub const DELIMITER: u8 = 0x00;
