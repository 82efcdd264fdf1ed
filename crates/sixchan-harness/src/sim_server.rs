//! Simulation server wrapper for testing with turmoil.
//!
//! `SimServer` runs the production [`ChatService`] (the same connection tasks,
//! dispatcher and history) behind a turmoil TCP listener and a [`SimEnv`]
//! clock. Only the listener differs from the real server.

use std::{io, sync::Arc};

use sixchan_proto::ClientId;
use sixchan_server::{ChatService, ServiceConfig};
use turmoil::net::TcpListener;

use crate::SimEnv;

/// Simulation server for testing with turmoil.
pub struct SimServer {
    listener: TcpListener,
    service: Arc<ChatService<SimEnv>>,
}

impl SimServer {
    /// Create and bind a new simulation server.
    pub async fn bind(address: &str) -> io::Result<Self> {
        Self::bind_with_config(address, ServiceConfig::default()).await
    }

    /// Create and bind a new simulation server with custom config.
    pub async fn bind_with_config(address: &str, config: ServiceConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        let service = ChatService::new(SimEnv::new(), config)
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(Self { listener, service: Arc::new(service) })
    }

    /// Accept one connection and admit it.
    ///
    /// Returns `None` if the admission ceiling turned it away.
    pub async fn accept_connection(&self) -> io::Result<Option<ClientId>> {
        let (stream, peer) = self.listener.accept().await?;
        Ok(self.service.admit(stream, Some(peer.to_string())))
    }

    /// Accept connections forever.
    pub async fn run(self) -> io::Result<()> {
        loop {
            if self.accept_connection().await?.is_none() {
                tracing::debug!("simulated client turned away");
            }
        }
    }

    /// The connection service, for state assertions.
    pub fn service(&self) -> &Arc<ChatService<SimEnv>> {
        &self.service
    }
}
