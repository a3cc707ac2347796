//! Channel abstraction for Pulse routes.
//!
//! A channel is one live bidirectional connection. Routing only needs to
//! attach listeners to it, emit events on it and read its auth context; the
//! connection lifecycle belongs to whoever implements [`Channel`].

use crate::error::RouteError;
use crate::route::Routing;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Name of the event used to report errors to a peer.
pub const ERROR_EVENT: &str = "error";

/// An event listener.
///
/// Listeners receive the payload and the caller's acknowledgement, if any,
/// and return a future that completes when the event has been handled.
pub type Listener = Arc<dyn Fn(Value, Option<Ack>) -> BoxFuture<'static, ()> + Send + Sync>;

type AckFn = Box<dyn FnOnce(Result<Value, RouteError>) + Send>;

/// A once-only completion callback supplied by the sender of an event.
///
/// Clones share the same callback, so when several listeners handle one
/// event only the first response is delivered.
#[derive(Clone)]
pub struct Ack {
    inner: Arc<Mutex<Option<AckFn>>>,
}

impl Ack {
    /// Wrap a callback.
    pub fn new(f: impl FnOnce(Result<Value, RouteError>) + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(f)))),
        }
    }

    /// Deliver the response.
    ///
    /// Returns `false` if a response was already delivered.
    pub fn send(&self, result: Result<Value, RouteError>) -> bool {
        let callback = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match callback {
            Some(f) => {
                f(result);
                true
            }
            None => {
                trace!("Ack already delivered, dropping response");
                false
            }
        }
    }

    /// Whether a response has already been delivered.
    #[must_use]
    pub fn is_spent(&self) -> bool {
        self.inner
            .lock()
            .map(|slot| slot.is_none())
            .unwrap_or(true)
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ack")
            .field("spent", &self.is_spent())
            .finish()
    }
}

/// Per-connection authorization attributes.
///
/// Written by connection middleware before routes fire; routing only reads.
#[derive(Debug, Default)]
pub struct AuthContext {
    attributes: DashMap<String, Value>,
}

impl AuthContext {
    /// Create an empty auth context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an attribute value.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<Value> {
        self.attributes.get(attribute).map(|v| v.value().clone())
    }

    /// Set an attribute, returning the previous value.
    pub fn insert(&self, attribute: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(attribute.into(), value)
    }

    /// Remove an attribute.
    pub fn remove(&self, attribute: &str) -> Option<Value> {
        self.attributes.remove(attribute).map(|(_, v)| v)
    }

    /// Check if an attribute is set.
    #[must_use]
    pub fn contains(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if no attribute is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// A live connection that routes can be attached to.
pub trait Channel: Send + Sync + 'static {
    /// Connection identifier.
    fn id(&self) -> &str;

    /// Authorization attributes of this connection.
    fn auth_context(&self) -> &AuthContext;

    /// Register a listener for an event.
    fn on(&self, event: &str, listener: Listener);

    /// Emit an event with a payload.
    fn emit(&self, event: &str, payload: Value);

    /// Routing configuration, if routing was installed.
    fn routing(&self) -> Option<&Routing>;

    /// Install routing. Returns `false` if it was already installed.
    fn install_routing(&self, routing: Routing) -> bool;
}
