//! Protocol error types.
//!
//! One enum covers every way reading or decoding a request can fail. Callers
//! decide whether to keep the connection with [`ProtocolError::is_recoverable`].

use std::io;

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced by the framer and the request codec.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Peer closed the stream in an orderly way (zero-byte read).
    #[error("end of stream")]
    EndOfStream,

    /// Underlying transport failed (connection reset, broken pipe, ...).
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// A frame grew past the framer's hard maximum without a delimiter, or a
    /// length-framed read asked for more than the maximum.
    ///
    /// The buffered bytes are discarded. The stream is no longer aligned on a
    /// frame boundary, so the connection must be dropped.
    #[error("frame too large: limit is {max} bytes")]
    FrameTooLarge {
        /// Configured hard maximum
        max: usize,
    },

    /// An upload declared a body larger than the accepted maximum.
    ///
    /// The body is left unread on the stream.
    #[error("upload too large: {size} bytes exceeds limit of {max} bytes")]
    UploadTooLarge {
        /// Declared upload size
        size: u32,
        /// Configured maximum
        max: usize,
    },

    /// Request was framed correctly but its content could not be parsed
    /// (e.g. `/dl abc`).
    #[error("malformed request: {0}")]
    Malformed(String),
}

impl ProtocolError {
    /// Returns true if the connection can keep serving after this error.
    ///
    /// Only malformed requests are recoverable: the frame was consumed in full
    /// and the stream is still aligned. Everything else leaves the stream
    /// closed or desynchronized.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_malformed_is_recoverable() {
        assert!(ProtocolError::Malformed("x".into()).is_recoverable());
        assert!(!ProtocolError::EndOfStream.is_recoverable());
        assert!(!ProtocolError::FrameTooLarge { max: 8 }.is_recoverable());
        assert!(!ProtocolError::UploadTooLarge { size: 9, max: 8 }.is_recoverable());
        assert!(
            !ProtocolError::Transport(io::Error::from(io::ErrorKind::ConnectionReset))
                .is_recoverable()
        );
    }

    #[test]
    fn display_messages() {
        assert_eq!(ProtocolError::EndOfStream.to_string(), "end of stream");
        assert_eq!(
            ProtocolError::FrameTooLarge { max: 256 }.to_string(),
            "frame too large: limit is 256 bytes"
        );
        assert_eq!(
            ProtocolError::UploadTooLarge { size: 300, max: 256 }.to_string(),
            "upload too large: 300 bytes exceeds limit of 256 bytes"
        );
    }
}
