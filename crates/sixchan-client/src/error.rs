//! Client error types.

use std::{io, path::PathBuf};

use sixchan_proto::ProtocolError;
use thiserror::Error;

/// Errors produced by the client session and its duties.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach the server.
    #[error("could not connect to {endpoint}: {source}")]
    Connect {
        /// Endpoint as given on the command line
        endpoint: String,
        /// Underlying failure
        source: io::Error,
    },

    /// Writing to the server failed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Reading or decoding a server reply failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A local file could not be read or written.
    #[error("{action} {}: {source}", path.display())]
    File {
        /// What was attempted ("could not read file", "could not save to")
        action: &'static str,
        /// Local path
        path: PathBuf,
        /// Underlying failure
        source: io::Error,
    },

    /// File is too large to describe with a 32-bit length.
    #[error("file is too large to upload: {size} bytes")]
    FileTooLarge {
        /// File size
        size: usize,
    },
}

impl ClientError {
    /// Returns true if the connection is gone and the session must stop.
    ///
    /// Local file problems are reported and the session carries on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::File { .. } | Self::FileTooLarge { .. })
    }

    /// Returns true if the server closed the connection in an orderly way.
    pub fn is_orderly_close(&self) -> bool {
        matches!(self, Self::Protocol(ProtocolError::EndOfStream))
    }
}
