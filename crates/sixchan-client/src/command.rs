//! Interactive input parsing.
//!
//! ```text
//! /q                 quit
//! /dl <id> [path]    download message or file #id
//! /file [path]       upload a file
//! /<anything else>   print help
//! <text>             post a message
//! ```

use std::path::PathBuf;

use bytes::Bytes;
use sixchan_proto::{DELIMITER, MessageId};
use thiserror::Error;

/// Longest line sent as a text post.
pub const MAX_LINE: usize = 1024;

/// Help text for unknown commands.
pub const HELP: &str = "Available commands:\r\n\
                        /file - upload file\r\n\
                        /dl <id> - download file or message by #id\r\n\
                        /q - quit";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line; nothing to do.
    Empty,
    /// Disconnect and exit.
    Quit,
    /// Download the payload of a message.
    Download {
        /// Message id
        id: MessageId,
        /// Save path; prompted for when absent
        path: Option<PathBuf>,
    },
    /// Upload a file.
    Upload {
        /// Local path; prompted for when absent
        path: Option<PathBuf>,
    },
    /// Unknown slash command.
    Help,
    /// Plain text post, without `\0` bytes.
    Post(Bytes),
}

/// Input that cannot be acted on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Line is over [`MAX_LINE`] bytes.
    #[error("Message is too long. Consider sending as a file.")]
    TooLong,

    /// `/dl` without a usable id.
    #[error("Specify file id to download.")]
    MissingId,
}

impl Command {
    /// Parse one input line (line ending already removed).
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        if line.len() > MAX_LINE {
            return Err(CommandError::TooLong);
        }
        if line.trim_matches(|c: char| c.is_whitespace() || c == '\0').is_empty() {
            return Ok(Self::Empty);
        }
        if !line.starts_with('/') {
            let text: Vec<u8> = line.bytes().filter(|&b| b != DELIMITER).collect();
            return Ok(Self::Post(Bytes::from(text)));
        }

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match command {
            "/q" => Ok(Self::Quit),
            "/dl" => {
                let (id, path) = rest.split_once(' ').unwrap_or((rest, ""));
                let id: MessageId = id.parse().map_err(|_| CommandError::MissingId)?;
                if id == 0 {
                    return Err(CommandError::MissingId);
                }
                Ok(Self::Download { id, path: optional_path(path) })
            },
            "/file" => Ok(Self::Upload { path: optional_path(rest) }),
            _ => Ok(Self::Help),
        }
    }
}

fn optional_path(arg: &str) -> Option<PathBuf> {
    let arg = arg.trim();
    (!arg.is_empty()).then(|| PathBuf::from(arg))
}
