//! Sixchan terminal client.
//!
//! Keeps one connection to the broker and runs three duties over it:
//!
//! - **sync** polls for history newer than the client's cursor
//! - **receive** renders everything the server sends (split mode)
//! - **send** turns input lines into posts, uploads and downloads
//!
//! The duties share a [`Session`]: two exclusion domains over the stream, the
//! sync cursor, and a one-shot stop signal. Whichever duty first sees the
//! connection fail raises the signal; [`Client::run`] then cancels the rest
//! and returns once they have all exited.

#![forbid(unsafe_code)]

pub mod command;
mod duties;
mod error;
pub mod fileshare;
pub mod render;
mod session;
mod transport;

use std::{future::Future, sync::Arc, time::Duration};

pub use command::{Command, CommandError};
pub use duties::{SyncMode, receive_duty, send_duty, sync_duty};
pub use error::ClientError;
pub use fileshare::{ConsolePicker, FilePicker, LineInput};
pub use render::{Accent, Console, Output, Renderer};
pub use session::{InboundClaim, InboundGate, Session, StopSignal, SyncCursor};
use sixchan_proto::{FrameReader, FramerConfig};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinSet,
};
pub use transport::{Endpoint, ReadHalf, WriteHalf, connect};

/// Default delay between sync requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker to connect to
    pub endpoint: Endpoint,
    /// Whether the sync duty reads its own batches
    pub sync_mode: SyncMode,
    /// Delay between sync requests
    pub poll_interval: Duration,
    /// Response framing limits; `max_size` also caps downloads
    pub framer: FramerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            sync_mode: SyncMode::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            framer: FramerConfig::default(),
        }
    }
}

/// A connected client, ready to run its duties.
pub struct Client<R, W> {
    session: Arc<Session<R, W>>,
    sync_mode: SyncMode,
    poll_interval: Duration,
}

impl<R, W> Client<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Client over an already-connected stream pair.
    pub fn new(reader: R, writer: W, renderer: Renderer, config: &ClientConfig) -> Self {
        let reader = FrameReader::with_config(reader, config.framer);
        Self {
            session: Arc::new(Session::new(reader, writer, renderer)),
            sync_mode: config.sync_mode,
            poll_interval: config.poll_interval,
        }
    }

    /// Shared session state.
    pub fn session(&self) -> &Arc<Session<R, W>> {
        &self.session
    }

    /// Run every duty until one of them stops the session.
    ///
    /// Returns after all duties have exited.
    pub async fn run<P>(self, input: LineInput, picker: P)
    where
        P: FilePicker + 'static,
    {
        let session = self.session;
        let mut duties = JoinSet::new();

        spawn_duty(
            &mut duties,
            &session,
            "sync",
            sync_duty(Arc::clone(&session), self.sync_mode, self.poll_interval),
        );
        if self.sync_mode == SyncMode::Split {
            spawn_duty(&mut duties, &session, "receive", receive_duty(Arc::clone(&session)));
        }
        spawn_duty(&mut duties, &session, "send", send_duty(Arc::clone(&session), input, picker));

        session.stop().wait().await;
        duties.shutdown().await;
        tracing::debug!("all duties stopped");
    }
}

fn spawn_duty<R, W, F>(
    duties: &mut JoinSet<()>,
    session: &Arc<Session<R, W>>,
    name: &'static str,
    duty: F,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = Result<(), ClientError>> + Send + 'static,
{
    let session = Arc::clone(session);
    duties.spawn(async move {
        let outcome = duty.await;
        let first = session.stop().raise();

        match outcome {
            Ok(()) => tracing::debug!(duty = name, "duty finished"),
            Err(e) => {
                tracing::debug!(duty = name, "duty failed: {}", e);
                if first {
                    let farewell = if e.is_orderly_close() {
                        "Disconnected from server."
                    } else {
                        "Connection reset."
                    };
                    session.renderer().notice(farewell);
                }
            },
        }
    });
}
