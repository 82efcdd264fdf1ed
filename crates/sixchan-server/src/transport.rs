//! Stream listeners.
//!
//! The broker accepts connections over TCP or, on Unix, over a local stream
//! socket (the "pipe" deployment: one host, no network exposure). Both hand
//! out plain duplex byte streams; nothing above this module knows which one
//! it is talking to.

use std::{net::SocketAddr, time::Duration};
#[cfg(unix)]
use std::path::PathBuf;

use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::error::ServerError;

/// Where to listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindTarget {
    /// TCP address, e.g. `127.0.0.1:5000`
    Tcp(String),
    /// Local stream socket path
    #[cfg(unix)]
    Local(PathBuf),
}

impl Default for BindTarget {
    fn default() -> Self {
        Self::Tcp("127.0.0.1:5000".to_string())
    }
}

/// A freshly accepted stream.
pub enum Accepted {
    /// TCP peer
    Tcp(TcpStream, SocketAddr),
    /// Local socket peer
    #[cfg(unix)]
    Local(UnixStream),
}

/// Bound listener.
pub enum Listener {
    /// TCP listener
    Tcp(TcpListener),
    /// Local socket listener; the socket file is removed on drop
    #[cfg(unix)]
    Local(UnixListener, PathBuf),
}

impl Listener {
    /// Bind to `target`.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` if the TCP address does not parse
    /// - `ServerError::Transport` if binding fails (address in use, stale
    ///   socket file, permissions)
    pub async fn bind(target: &BindTarget) -> Result<Self, ServerError> {
        match target {
            BindTarget::Tcp(address) => {
                let addr: SocketAddr = address.parse().map_err(|e| {
                    ServerError::Config(format!("invalid bind address '{address}': {e}"))
                })?;
                let listener = TcpListener::bind(addr).await.map_err(|e| {
                    ServerError::Transport(format!("failed to bind {addr}: {e}"))
                })?;
                Ok(Self::Tcp(listener))
            },
            #[cfg(unix)]
            BindTarget::Local(path) => {
                let listener = UnixListener::bind(path).map_err(|e| {
                    ServerError::Transport(format!("failed to bind {}: {e}", path.display()))
                })?;
                Ok(Self::Local(listener, path.clone()))
            },
        }
    }

    /// Wait for the next connection.
    pub async fn accept(&self) -> Result<Accepted, ServerError> {
        match self {
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok(Accepted::Tcp(stream, peer))
            },
            #[cfg(unix)]
            Self::Local(listener, _) => {
                let (stream, _) = listener.accept().await?;
                Ok(Accepted::Local(stream))
            },
        }
    }

    /// Human-readable listening address.
    pub fn local_addr(&self) -> Result<String, ServerError> {
        match self {
            Self::Tcp(listener) => Ok(listener.local_addr()?.to_string()),
            #[cfg(unix)]
            Self::Local(_, path) => Ok(path.display().to_string()),
        }
    }
}

/// Delay between failed accepts.
///
/// Accept failures such as descriptor exhaustion persist until some
/// connection closes, so retrying at once would spin. The delay doubles per
/// consecutive failure up to [`AcceptBackoff::MAX`] and resets on success.
#[derive(Debug, Default)]
pub struct AcceptBackoff {
    failures: u32,
}

impl AcceptBackoff {
    /// First delay after a failure.
    pub const INITIAL: Duration = Duration::from_millis(10);

    /// Longest delay.
    pub const MAX: Duration = Duration::from_secs(1);

    /// Record a failed accept and return how long to pause.
    pub fn failed(&mut self) -> Duration {
        let delay = Self::INITIAL.saturating_mul(1 << self.failures.min(16));
        self.failures = self.failures.saturating_add(1);
        delay.min(Self::MAX)
    }

    /// Record a successful accept.
    pub fn succeeded(&mut self) {
        self.failures = 0;
    }

    /// Failures since the last successful accept.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        if let Self::Local(_, path) = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unparsable_address() {
        let result = Listener::bind(&BindTarget::Tcp("not an address".into())).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn tcp_reports_bound_port() {
        let listener = Listener::bind(&BindTarget::Tcp("127.0.0.1:0".into())).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.starts_with("127.0.0.1:"));
        assert!(!addr.ends_with(":0"));
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut backoff = AcceptBackoff::default();
        assert_eq!(backoff.failed(), Duration::from_millis(10));
        assert_eq!(backoff.failed(), Duration::from_millis(20));
        assert_eq!(backoff.failed(), Duration::from_millis(40));

        for _ in 0..40 {
            assert!(backoff.failed() <= AcceptBackoff::MAX);
        }
        assert_eq!(backoff.failed(), AcceptBackoff::MAX);
    }

    #[test]
    fn backoff_resets_after_success() {
        let mut backoff = AcceptBackoff::default();
        backoff.failed();
        backoff.failed();
        backoff.succeeded();
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.failed(), AcceptBackoff::INITIAL);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_socket_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sixchan.sock");

        let listener = Listener::bind(&BindTarget::Local(path.clone())).await.unwrap();
        assert!(path.exists());
        drop(listener);
        assert!(!path.exists());
    }
}
