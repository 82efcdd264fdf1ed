//! Sixchan chat broker server.
//!
//! Accepts many concurrent clients over TCP (or a local stream socket), keeps
//! every posted message and file in one shared history, and answers pull-style
//! sync requests from each client's cursor.
//!
//! # Architecture
//!
//! The [`Dispatcher`] follows the Sans-IO pattern: it turns one connection
//! event into a list of [`ServerAction`]s and never touches a socket.
//! [`ChatService`] runs one tokio task per connection, each owning its
//! stream and its [`FrameReader`], and executes those actions. [`Server`] wires
//! the service to a real [`Listener`] and the system clock.
//!
//! # Components
//!
//! - [`HistoryStore`]: append-only log with store-assigned ids
//! - [`ClientRegistry`]: live connections in accept order, admission ceiling
//! - [`Dispatcher`]: request handling (pure logic, no I/O)
//! - [`ChatService`]: connection tasks and shutdown, generic over the stream
//! - [`Server`]: production runtime with [`SystemEnv`]

#![forbid(unsafe_code)]

mod driver;
mod env;
mod error;
pub mod history;
mod registry;
mod system_env;
mod transport;

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

pub use driver::{DispatchConfig, Dispatcher, LogLevel, ServerAction, ServerEvent};
pub use env::Environment;
pub use error::ServerError;
pub use history::{HistoryStore, SyncBatch};
pub use registry::{ClientInfo, ClientRegistry, DEFAULT_MAX_CLIENTS};
use sixchan_proto::{ClientId, FrameReader, FramerConfig, read_request};
pub use system_env::SystemEnv;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    task::JoinSet,
};
pub use transport::{AcceptBackoff, Accepted, BindTarget, Listener};

/// Log target for the operator console echo of posted messages.
pub const CONSOLE_TARGET: &str = "sixchan::console";

/// Connection-handling configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Connections admitted over the process lifetime
    pub max_clients: u32,
    /// Per-connection framing limits; `max_size` also caps uploads
    pub framer: FramerConfig,
    /// Dispatcher configuration
    pub dispatch: DispatchConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
            framer: FramerConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone, Default)]
pub struct ServerRuntimeConfig {
    /// Where to listen
    pub bind: BindTarget,
    /// Connection handling
    pub service: ServiceConfig,
}

/// Shared state for all connections.
///
/// Owns the history (through the dispatcher), the registry, and the set of
/// connection tasks. Generic over the environment so simulations can run the
/// exact same connection code with a virtual clock.
pub struct ChatService<E> {
    dispatcher: Arc<Dispatcher<E>>,
    registry: Arc<ClientRegistry>,
    framer: FramerConfig,
    tasks: Mutex<JoinSet<()>>,
}

impl<E: Environment> ChatService<E> {
    /// Create a service with an empty history.
    ///
    /// # Errors
    ///
    /// `ServerError::Config` if `max_clients` is zero.
    pub fn new(env: E, config: ServiceConfig) -> Result<Self, ServerError> {
        if config.max_clients == 0 {
            return Err(ServerError::Config("max clients must be at least 1".to_string()));
        }

        let history = Arc::new(HistoryStore::new());
        let dispatch = DispatchConfig { max_line: config.framer.max_size, ..config.dispatch };
        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(env, history, dispatch)),
            registry: Arc::new(ClientRegistry::new(config.max_clients)),
            framer: config.framer,
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    /// Shared history.
    pub fn history(&self) -> &Arc<HistoryStore> {
        self.dispatcher.history()
    }

    /// Live client registry.
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Admit an accepted stream and spawn its connection task.
    ///
    /// Returns the assigned id, or `None` if the admission ceiling has been
    /// reached, in which case the stream is dropped (closing it).
    pub fn admit<S>(&self, stream: S, address: Option<String>) -> Option<ClientId>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let Some(client_id) = self.registry.register(address.clone()) else {
            tracing::warn!(
                peer = address.as_deref().unwrap_or("local"),
                "Client limit reached, dropping connection"
            );
            return None;
        };

        // Announce before spawning so join lines follow accept order
        let accepted = ServerEvent::ClientAccepted { client_id, address };
        log_actions(client_id, self.dispatcher.process_event(accepted));

        let dispatcher = Arc::clone(&self.dispatcher);
        let registry = Arc::clone(&self.registry);
        let framer = self.framer;

        let task = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            while tasks.try_join_next().is_some() {}

            tasks.spawn(async move {
                let reason = match serve_connection(stream, client_id, &dispatcher, framer).await {
                    Ok(reason) => reason,
                    Err(e) => {
                        tracing::debug!(client_id, "Connection error: {}", e);
                        e.to_string()
                    },
                };

                registry.remove(client_id);
                let closed = ServerEvent::ClientClosed { client_id, reason };
                log_actions(client_id, dispatcher.process_event(closed));
            })
        };
        self.registry.attach(client_id, task);

        Some(client_id)
    }

    /// Force-close every live connection and wait for their tasks to end.
    ///
    /// Returns the number of connections that were still live.
    pub async fn shutdown(&self) -> usize {
        for client in self.registry.clients() {
            tracing::debug!(
                client_id = client.id,
                peer = client.address.as_deref().unwrap_or("local"),
                "Closing connection"
            );
        }
        let closed = self.registry.close_all();
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        tasks.shutdown().await;
        closed
    }
}

/// Production sixchan server.
///
/// Wraps a [`ChatService`] with a real listener and the system clock.
pub struct Server {
    listener: Listener,
    service: Arc<ChatService<SystemEnv>>,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let service = Arc::new(ChatService::new(SystemEnv::new(), config.service)?);
        let listener = Listener::bind(&config.bind).await?;
        Ok(Self { listener, service })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<String, ServerError> {
        self.listener.local_addr()
    }

    /// The connection service.
    pub fn service(&self) -> &Arc<ChatService<SystemEnv>> {
        &self.service
    }

    /// Run the server until `shutdown` resolves.
    ///
    /// On shutdown every live connection is closed and its task joined.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        tracing::info!("Server listening on {}", self.listener.local_addr()?);
        tokio::pin!(shutdown);
        let mut backoff = AcceptBackoff::default();

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(Accepted::Tcp(stream, peer)) => {
                        backoff.succeeded();
                        self.service.admit(stream, Some(peer.to_string()));
                    },
                    #[cfg(unix)]
                    Ok(Accepted::Local(stream)) => {
                        backoff.succeeded();
                        self.service.admit(stream, None);
                    },
                    Err(e) => {
                        let delay = backoff.failed();
                        tracing::error!(
                            failures = backoff.failures(),
                            "Accept error: {}, retrying in {:?}",
                            e,
                            delay
                        );
                        tokio::select! {
                            () = &mut shutdown => break,
                            () = tokio::time::sleep(delay) => {},
                        }
                    },
                },
            }
        }

        let closed = self.service.shutdown().await;
        tracing::info!(closed, "Server stopped");
        Ok(())
    }
}

/// Serve one admitted connection until it closes.
///
/// Reads requests one at a time and executes the dispatcher's actions in
/// order, so responses on one connection are strictly FIFO. The join
/// announcement is made by [`ChatService::admit`] before this starts. Returns
/// the close reason.
///
/// # Errors
///
/// `ServerError::Transport` if writing a response fails.
pub async fn serve_connection<S, E>(
    stream: S,
    client_id: ClientId,
    dispatcher: &Dispatcher<E>,
    framer: FramerConfig,
) -> Result<String, ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Environment,
{
    let mut reader = FrameReader::with_config(stream, framer);

    loop {
        let event = match read_request(&mut reader).await {
            Ok(request) => ServerEvent::RequestReceived { client_id, request },
            Err(error) => ServerEvent::ReadFailed { client_id, error },
        };

        let actions = dispatcher.process_event(event);
        if let Some(reason) = execute_actions(client_id, actions, reader.get_mut()).await? {
            return Ok(reason);
        }
    }
}

/// Execute server actions against one connection.
///
/// Returns the close reason if a `Close` action was reached.
async fn execute_actions<W>(
    client_id: ClientId,
    actions: Vec<ServerAction>,
    writer: &mut W,
) -> Result<Option<String>, ServerError>
where
    W: AsyncWrite + Unpin,
{
    for action in actions {
        match action {
            ServerAction::Send(bytes) => {
                writer.write_all(&bytes).await?;
                writer.flush().await?;
            },
            ServerAction::Close { reason } => return Ok(Some(reason)),
            other => log_action(client_id, other),
        }
    }
    Ok(None)
}

fn log_actions(client_id: ClientId, actions: Vec<ServerAction>) {
    for action in actions {
        log_action(client_id, action);
    }
}

fn log_action(client_id: ClientId, action: ServerAction) {
    match action {
        ServerAction::Echo { message_id, sender_id, text } => {
            tracing::info!(
                target: CONSOLE_TARGET,
                message_id,
                "#{message_id} | Anonim #{sender_id}: {text}"
            );
        },
        ServerAction::Log { level, message } => match level {
            LogLevel::Debug => tracing::debug!(client_id, "{}", message),
            LogLevel::Info => tracing::info!(client_id, "{}", message),
            LogLevel::Warn => tracing::warn!(client_id, "{}", message),
            LogLevel::Error => tracing::error!(client_id, "{}", message),
        },
        ServerAction::Send(bytes) => {
            tracing::debug!(client_id, len = bytes.len(), "Dropping unsent response");
        },
        ServerAction::Close { reason } => {
            tracing::debug!(client_id, "Close after exit: {}", reason);
        },
    }
}
