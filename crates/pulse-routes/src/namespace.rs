//! Connection management for Pulse sockets.
//!
//! A namespace owns the connected sockets of one endpoint. New connections
//! pass through the middleware chain, are registered, and are then handed to
//! the connection handlers, which typically declare routes.

use crate::channel::Channel;
use crate::middleware::{Middleware, Next};
use crate::socket::{Handshake, Outbound, Socket};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Namespace errors.
#[derive(Debug, Error)]
pub enum NamespaceError {
    /// A middleware did not continue the chain.
    #[error("Connection rejected by middleware")]
    Rejected,

    /// Maximum connections reached.
    #[error("Maximum connections reached")]
    MaxConnectionsReached,

    /// Socket not found.
    #[error("Socket not found: {0}")]
    SocketNotFound(String),
}

/// Namespace configuration.
#[derive(Debug, Clone)]
pub struct NamespaceConfig {
    /// Maximum number of simultaneous connections.
    pub max_connections: usize,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            max_connections: 100_000,
        }
    }
}

/// Called for every accepted connection.
pub type ConnectionHandler = Arc<dyn Fn(&Arc<Socket>) + Send + Sync>;

/// A set of connected sockets sharing middleware and connection handlers.
pub struct Namespace {
    /// Sockets indexed by ID.
    sockets: DashMap<String, Arc<Socket>>,
    middleware: Vec<Middleware<Socket>>,
    handlers: Vec<ConnectionHandler>,
    config: NamespaceConfig,
}

impl Namespace {
    /// Create a namespace with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(NamespaceConfig::default())
    }

    /// Create a namespace with custom configuration.
    #[must_use]
    pub fn with_config(config: NamespaceConfig) -> Self {
        info!("Creating namespace with config: {:?}", config);
        Self {
            sockets: DashMap::new(),
            middleware: Vec::new(),
            handlers: Vec::new(),
            config,
        }
    }

    /// Append a middleware to the connection chain.
    pub fn use_middleware(
        &mut self,
        middleware: impl Fn(&Socket, Next<'_>) + Send + Sync + 'static,
    ) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Register a handler for accepted connections.
    pub fn on_connection(
        &mut self,
        handler: impl Fn(&Arc<Socket>) + Send + Sync + 'static,
    ) -> &mut Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Accept a new connection.
    ///
    /// Returns the socket and the receiver of its outbound events.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection limit is reached or a middleware
    /// rejects the connection.
    pub fn connect(
        &self,
        handshake: Handshake,
    ) -> Result<(Arc<Socket>, mpsc::UnboundedReceiver<Outbound>), NamespaceError> {
        if self.sockets.len() >= self.config.max_connections {
            warn!("Connection refused: limit of {} reached", self.config.max_connections);
            return Err(NamespaceError::MaxConnectionsReached);
        }

        let (socket, outbound) = Socket::new(handshake);

        for middleware in &self.middleware {
            let mut proceed = false;
            middleware(&socket, Next::new(&mut proceed));
            if !proceed {
                debug!(connection = %socket.id(), "Connection rejected by middleware");
                return Err(NamespaceError::Rejected);
            }
        }

        self.sockets
            .insert(socket.id().to_string(), Arc::clone(&socket));
        debug!(
            connection = %socket.id(),
            connections = self.sockets.len(),
            "Connected"
        );

        for handler in &self.handlers {
            handler(&socket);
        }

        Ok((socket, outbound))
    }

    /// Remove a socket.
    ///
    /// # Errors
    ///
    /// Returns an error if no socket has this ID.
    pub fn disconnect(&self, socket_id: &str) -> Result<Arc<Socket>, NamespaceError> {
        let (_, socket) = self
            .sockets
            .remove(socket_id)
            .ok_or_else(|| NamespaceError::SocketNotFound(socket_id.to_string()))?;
        debug!(connection = %socket_id, "Disconnected");
        Ok(socket)
    }

    /// Get a connected socket.
    #[must_use]
    pub fn socket(&self, socket_id: &str) -> Option<Arc<Socket>> {
        self.sockets.get(socket_id).map(|s| Arc::clone(s.value()))
    }

    /// IDs of all connected sockets.
    #[must_use]
    pub fn socket_ids(&self) -> Vec<String> {
        self.sockets.iter().map(|e| e.key().clone()).collect()
    }

    /// Get namespace statistics.
    #[must_use]
    pub fn stats(&self) -> NamespaceStats {
        NamespaceStats {
            connection_count: self.sockets.len(),
            middleware_count: self.middleware.len(),
            handler_count: self.handlers.len(),
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

/// Namespace statistics.
#[derive(Debug, Clone)]
pub struct NamespaceStats {
    /// Number of connected sockets.
    pub connection_count: usize,
    /// Number of middleware in the connection chain.
    pub middleware_count: usize,
    /// Number of connection handlers.
    pub handler_count: usize,
}
