//! Server error types.

use std::fmt;

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Bad startup settings: an unparsable bind address or a zero client
    /// ceiling. The server refuses to start.
    Config(String),

    /// Socket failure: binding, accepting, or writing a response.
    ///
    /// At startup this stops the server. On a live connection it ends only
    /// that connection.
    Transport(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_transport() {
        let err = ServerError::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(matches!(err, ServerError::Transport(_)));
        assert!(err.to_string().starts_with("transport error: "));
    }
}
