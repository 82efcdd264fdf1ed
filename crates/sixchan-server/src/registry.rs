//! Client registry.
//!
//! Tracks live connections in accept order so shutdown can force-close every
//! one of them. Ids are issued sequentially from 1 and never reused. Once
//! `max_clients` ids have been issued the registry stops admitting for the
//! rest of the process lifetime; connections already admitted keep running.

use std::sync::{Mutex, PoisonError};

use sixchan_proto::ClientId;
use tokio::task::AbortHandle;

/// Default admission ceiling.
pub const DEFAULT_MAX_CLIENTS: u32 = 254;

/// One live client.
#[derive(Debug)]
struct ClientEntry {
    id: ClientId,
    /// Peer address, absent for local sockets
    address: Option<String>,
    /// Set once the connection task is spawned
    task: Option<AbortHandle>,
}

/// Information about a registered client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Assigned id
    pub id: ClientId,
    /// Peer address, if the transport has one
    pub address: Option<String>,
}

/// Registry of live clients.
#[derive(Debug)]
pub struct ClientRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    /// Insertion-ordered
    clients: Vec<ClientEntry>,
    /// Ids issued so far
    issued: u32,
    max_clients: u32,
}

impl ClientRegistry {
    /// Create a registry admitting at most `max_clients` connections over its
    /// lifetime.
    pub fn new(max_clients: u32) -> Self {
        Self {
            inner: Mutex::new(RegistryInner { clients: Vec::new(), issued: 0, max_clients }),
        }
    }

    /// Admit a new client and issue its id.
    ///
    /// Returns `None` once the ceiling has been reached.
    pub fn register(&self, address: Option<String>) -> Option<ClientId> {
        let mut inner = self.lock();
        if inner.issued >= inner.max_clients {
            return None;
        }

        inner.issued += 1;
        let id = inner.issued;
        inner.clients.push(ClientEntry { id, address, task: None });
        Some(id)
    }

    /// Attach the connection task of `id` so [`Self::close_all`] can abort it.
    ///
    /// If the client already left, the task is finished and nothing is kept.
    pub fn attach(&self, id: ClientId, task: AbortHandle) {
        let mut inner = self.lock();
        if let Some(entry) = inner.clients.iter_mut().find(|c| c.id == id) {
            entry.task = Some(task);
        }
    }

    /// Drop `id` from the registry. Returns whether it was present.
    pub fn remove(&self, id: ClientId) -> bool {
        let mut inner = self.lock();
        let before = inner.clients.len();
        inner.clients.retain(|c| c.id != id);
        inner.clients.len() != before
    }

    /// Abort every live connection task and empty the registry.
    ///
    /// Returns the number of connections closed.
    pub fn close_all(&self) -> usize {
        let clients = std::mem::take(&mut self.lock().clients);
        for task in clients.iter().filter_map(|c| c.task.as_ref()) {
            task.abort();
        }
        clients.len()
    }

    /// Live clients in accept order.
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.lock()
            .clients
            .iter()
            .map(|c| ClientInfo { id: c.id, address: c.address.clone() })
            .collect()
    }

    /// Number of live clients.
    pub fn len(&self) -> usize {
        self.lock().clients.len()
    }

    /// Whether no client is connected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CLIENTS)
    }
}
