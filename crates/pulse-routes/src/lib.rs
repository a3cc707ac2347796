//! # tenvis-pulse-routes
//!
//! Declarative event routes for Pulse sockets.
//!
//! A route binds an event name to a work function and wraps it in guards:
//!
//! - **Auth** - required attributes of the connection's auth context
//! - **Validation** - named rules applied to payload attributes
//! - **Logging** - a hook observing every invocation with its timing
//!
//! Results, sync or async, go back through the caller's ack when one was
//! supplied. Failures without an ack are emitted as `error` events.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Namespace  │────▶│ Middleware  │────▶│   Socket    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │ route()
//!                                                ▼
//!       ┌──────┐   ┌──────────┐   ┌──────┐   ┌──────┐   ┌─────────┐
//!       │ auth │──▶│ validate │──▶│ work │──▶│ log  │──▶│ respond │
//!       └──────┘   └──────────┘   └──────┘   └──────┘   └─────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut namespace = Namespace::new();
//! namespace
//!     .use_middleware(setup_socket_route::<Socket>)
//!     .use_middleware(token_auth::<Socket>("secret"))
//!     .on_connection(|socket| {
//!         if let Ok(route) = socket.route("message") {
//!             route
//!                 .auth(json!({"isAuthenticated": true}))
//!                 .validate(json!({"email": {"isEmail": true}}))
//!                 .process(|data| data);
//!         }
//!     });
//! ```

pub mod auth;
pub mod channel;
pub mod deferred;
mod dispatch;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod namespace;
pub mod route;
pub mod rules;
pub mod socket;
pub mod validate;

pub use auth::{authorize, deep_equal, EqualityFn};
pub use channel::{Ack, AuthContext, Channel, Listener, ERROR_EVENT};
pub use deferred::Deferred;
pub use error::{BoxError, RouteError};
pub use logger::{format_elapsed, LoggerHook, NoopLogger, TracingLogger};
pub use middleware::{token_auth, HandshakeQuery, Middleware, Next, AUTHENTICATED_ATTR, TOKEN_PARAM};
pub use namespace::{Namespace, NamespaceConfig, NamespaceError, NamespaceStats};
pub use route::{route, setup_socket_route, RouteBuilder, RouteExt, Routing};
pub use rules::{Rule, RuleRegistry, Verdict};
pub use socket::{Handshake, Outbound, Socket};
pub use validate::validate;
