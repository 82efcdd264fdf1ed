//! Connecting to the broker.
//!
//! TCP or, on Unix, a local stream socket. Either way the session gets an
//! independent read half and write half, so a duty parked on a read never
//! blocks a writer.

use std::{fmt, io};
#[cfg(unix)]
use std::path::PathBuf;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::error::ClientError;

/// Boxed read half of a connection.
pub type ReadHalf = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a connection.
pub type WriteHalf = Box<dyn AsyncWrite + Send + Unpin>;

/// Where the broker listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP address, e.g. `127.0.0.1:5000`
    Tcp(String),
    /// Local stream socket path
    #[cfg(unix)]
    Local(PathBuf),
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Tcp("127.0.0.1:5000".to_string())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(address) => f.write_str(address),
            #[cfg(unix)]
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Connect to `endpoint` and split the stream.
pub async fn connect(endpoint: &Endpoint) -> Result<(ReadHalf, WriteHalf), ClientError> {
    let failed =
        |source: io::Error| ClientError::Connect { endpoint: endpoint.to_string(), source };

    match endpoint {
        Endpoint::Tcp(address) => {
            let stream = TcpStream::connect(address.as_str()).await.map_err(failed)?;
            stream.set_nodelay(true).map_err(failed)?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        },
        #[cfg(unix)]
        Endpoint::Local(path) => {
            let stream = UnixStream::connect(path).await.map_err(failed)?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        },
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn connect_failure_names_endpoint() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = connect(&Endpoint::Tcp(address.clone())).await.err().unwrap();
        assert!(matches!(&err, ClientError::Connect { endpoint, .. } if *endpoint == address));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_socket_connects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let endpoint = Endpoint::Local(path);
        let (connected, accepted) = tokio::join!(connect(&endpoint), listener.accept());
        assert!(connected.is_ok());
        assert!(accepted.is_ok());
    }
}
