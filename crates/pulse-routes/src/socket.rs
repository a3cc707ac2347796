//! In-process socket.
//!
//! [`Socket`] is the concrete [`Channel`] used by Pulse: it keeps the
//! listener table and auth context of one connection, and queues outbound
//! events on an mpsc channel that the transport drains.

use crate::channel::{Ack, AuthContext, Channel, Listener, ERROR_EVENT};
use crate::middleware::HandshakeQuery;
use crate::route::Routing;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Atomic counter keeping socket IDs unique within a process.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique socket ID.
#[must_use]
pub fn generate_socket_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("conn_{timestamp:x}_{counter}")
}

/// Connection handshake data.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    /// Query string parameters sent when connecting.
    pub query: HashMap<String, String>,
    /// Remote address, if known.
    pub remote_addr: Option<String>,
}

impl Handshake {
    /// Create a handshake from query parameters.
    #[must_use]
    pub fn new(query: HashMap<String, String>) -> Self {
        Self {
            query,
            remote_addr: None,
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Set the remote address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }
}

/// An event queued for the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub payload: Value,
}

/// One connected peer.
pub struct Socket {
    id: String,
    handshake: Handshake,
    auth: AuthContext,
    listeners: DashMap<String, Vec<Listener>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    routing: OnceLock<Routing>,
}

impl Socket {
    /// Create a socket with a generated ID.
    ///
    /// Returns the socket and the receiver of its outbound events.
    #[must_use]
    pub fn new(handshake: Handshake) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        Self::with_id(generate_socket_id(), handshake)
    }

    /// Create a socket with a specific ID.
    #[must_use]
    pub fn with_id(
        id: impl Into<String>,
        handshake: Handshake,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let socket = Arc::new(Self {
            id: id.into(),
            handshake,
            auth: AuthContext::new(),
            listeners: DashMap::new(),
            outbound,
            routing: OnceLock::new(),
        });
        (socket, rx)
    }

    /// Handshake data of this connection.
    #[must_use]
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Number of listeners registered for an event.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map(|l| l.len()).unwrap_or(0)
    }

    /// Names of events with at least one listener.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.listeners.iter().map(|e| e.key().clone()).collect()
    }

    /// Whether the transport side of this socket is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    fn listeners_for(&self, event: &str) -> Vec<Listener> {
        // Clone out of the map so no shard lock is held while listeners run.
        self.listeners
            .get(event)
            .map(|l| l.value().clone())
            .unwrap_or_default()
    }

    /// Deliver an incoming event, spawning one task per listener.
    ///
    /// Returns the task handles; an event nobody listens to yields none.
    pub fn receive(&self, event: &str, payload: Value, ack: Option<Ack>) -> Vec<JoinHandle<()>> {
        let listeners = self.listeners_for(event);
        if listeners.is_empty() {
            trace!(connection = %self.id, event = %event, "No listener for event");
        }

        listeners
            .into_iter()
            .map(|listener| tokio::spawn(listener(payload.clone(), ack.clone())))
            .collect()
    }

    /// Deliver an incoming event and wait until every listener finished.
    pub async fn dispatch(&self, event: &str, payload: Value, ack: Option<Ack>) {
        let listeners = self.listeners_for(event);
        join_all(
            listeners
                .into_iter()
                .map(|listener| listener(payload.clone(), ack.clone())),
        )
        .await;
    }
}

impl Channel for Socket {
    fn id(&self) -> &str {
        &self.id
    }

    fn auth_context(&self) -> &AuthContext {
        &self.auth
    }

    fn on(&self, event: &str, listener: Listener) {
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push(listener);
        debug!(connection = %self.id, event = %event, "Listener added");
    }

    /// Queue an event for the peer.
    ///
    /// `error` events are also delivered to local `error` listeners.
    fn emit(&self, event: &str, payload: Value) {
        if event == ERROR_EVENT {
            let listeners = self.listeners_for(ERROR_EVENT);
            if !listeners.is_empty() {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        for listener in listeners {
                            handle.spawn(listener(payload.clone(), None));
                        }
                    }
                    Err(_) => warn!(connection = %self.id, "No runtime to run error listeners"),
                }
            }
        }

        let outbound = Outbound {
            event: event.to_string(),
            payload,
        };
        if self.outbound.send(outbound).is_err() {
            trace!(connection = %self.id, event = %event, "Emit on closed socket");
        }
    }

    fn routing(&self) -> Option<&Routing> {
        self.routing.get()
    }

    fn install_routing(&self, routing: Routing) -> bool {
        self.routing.set(routing).is_ok()
    }
}

impl HandshakeQuery for Socket {
    fn query(&self, key: &str) -> Option<&str> {
        self.handshake.query.get(key).map(String::as_str)
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("events", &self.event_names())
            .field("routing", &self.routing.get().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use serde_json::json;
    use tokio::sync::oneshot;

    fn echo_listener(tx: mpsc::UnboundedSender<Value>) -> Listener {
        Arc::new(move |payload: Value, _ack: Option<Ack>| -> BoxFuture<'static, ()> {
            let tx = tx.clone();
            async move {
                let _ = tx.send(payload);
            }
            .boxed()
        })
    }

    #[test]
    fn test_socket_ids_are_unique() {
        let (a, _) = Socket::new(Handshake::default());
        let (b, _) = Socket::new(Handshake::default());
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("conn_"));
    }

    #[test]
    fn test_handshake_query() {
        let (socket, _) = Socket::new(
            Handshake::default()
                .with_query("token", "secret")
                .with_remote_addr("127.0.0.1:5000"),
        );
        assert_eq!(socket.query("token"), Some("secret"));
        assert_eq!(socket.query("missing"), None);
        assert_eq!(socket.handshake().remote_addr.as_deref(), Some("127.0.0.1:5000"));
    }

    #[test]
    fn test_routing_installs_once() {
        let (socket, _) = Socket::new(Handshake::default());
        assert!(socket.routing().is_none());
        assert!(socket.install_routing(Routing::new()));
        assert!(!socket.install_routing(Routing::new()));
        assert!(socket.routing().is_some());
    }

    #[tokio::test]
    async fn test_receive_spawns_every_listener() {
        let (socket, _) = Socket::new(Handshake::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        socket.on("msg", echo_listener(tx.clone()));
        socket.on("msg", echo_listener(tx));
        assert_eq!(socket.listener_count("msg"), 2);

        for handle in socket.receive("msg", json!("message"), None) {
            handle.await.unwrap();
        }
        assert_eq!(rx.recv().await, Some(json!("message")));
        assert_eq!(rx.recv().await, Some(json!("message")));

        assert!(socket.receive("unknown", Value::Null, None).is_empty());
    }

    #[tokio::test]
    async fn test_emit_queues_outbound() {
        let (socket, mut rx) = Socket::new(Handshake::default());
        socket.emit("success", json!("success"));

        assert_eq!(
            rx.recv().await,
            Some(Outbound {
                event: "success".to_string(),
                payload: json!("success"),
            })
        );

        drop(rx);
        assert!(socket.is_closed());
        socket.emit("ignored", Value::Null);
    }

    #[tokio::test]
    async fn test_error_reaches_local_listeners() {
        let (socket, _rx) = Socket::new(Handshake::default());
        let (tx, rx) = oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        socket.on(
            ERROR_EVENT,
            Arc::new(move |payload: Value, _ack: Option<Ack>| -> BoxFuture<'static, ()> {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(payload);
                }
                async {}.boxed()
            }),
        );

        socket.emit(ERROR_EVENT, json!({"message": "Not authorized"}));
        assert_eq!(rx.await.unwrap(), json!({"message": "Not authorized"}));
    }
}
