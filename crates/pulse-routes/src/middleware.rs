//! Connection middleware.
//!
//! Middleware runs once per new connection, in registration order, before any
//! route can fire. Each middleware decides whether the chain continues by
//! calling [`Next::run`]; one that returns without calling it rejects the
//! connection.

use crate::channel::Channel;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Handshake query parameter carrying the connection token.
pub const TOKEN_PARAM: &str = "token";

/// Auth attribute set by [`token_auth`].
pub const AUTHENTICATED_ATTR: &str = "isAuthenticated";

/// Continuation handed to each middleware.
#[derive(Debug)]
pub struct Next<'a> {
    proceed: &'a mut bool,
}

impl<'a> Next<'a> {
    /// Create a continuation that records whether it ran.
    pub fn new(proceed: &'a mut bool) -> Self {
        *proceed = false;
        Self { proceed }
    }

    /// Continue with the next middleware.
    pub fn run(self) {
        *self.proceed = true;
    }
}

/// A connection middleware for channels of type `C`.
pub type Middleware<C> = Arc<dyn Fn(&C, Next<'_>) + Send + Sync>;

/// Channels that expose their handshake query.
pub trait HandshakeQuery {
    /// Look up a handshake query parameter.
    fn query(&self, key: &str) -> Option<&str>;
}

/// Middleware marking connections that present `secret` as authenticated.
///
/// When the handshake's `token` parameter equals `secret`, sets
/// `isAuthenticated = true` in the auth context. The chain always continues;
/// routes decide what an unauthenticated connection may do.
pub fn token_auth<C>(secret: impl Into<String>) -> impl Fn(&C, Next<'_>) + Send + Sync
where
    C: Channel + HandshakeQuery + ?Sized,
{
    let secret = secret.into();
    move |channel: &C, next: Next<'_>| {
        if channel.query(TOKEN_PARAM) == Some(secret.as_str()) {
            channel
                .auth_context()
                .insert(AUTHENTICATED_ATTR, Value::Bool(true));
            debug!(connection = %channel.id(), "Connection authenticated");
        } else {
            trace!(connection = %channel.id(), "No valid token presented");
        }
        next.run();
    }
}
