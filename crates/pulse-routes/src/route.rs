//! Fluent route declarations.
//!
//! ```rust,ignore
//! socket
//!     .route("user:update")?
//!     .auth(json!({"isAuthenticated": true}))
//!     .validate(json!({"email": {"isEmail": true}}))
//!     .log(TracingLogger::new())
//!     .process(|data| Ok::<_, BoxError>(data));
//! ```
//!
//! Nothing is attached to the channel until `process` is called.

use crate::auth::{deep_equal, EqualityFn};
use crate::channel::Channel;
use crate::deferred::Deferred;
use crate::dispatch::Dispatcher;
use crate::error::RouteError;
use crate::logger::{LoggerHook, NoopLogger};
use crate::middleware::Next;
use crate::rules::RuleRegistry;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Routing primitives installed on a channel: the rule registry used by
/// validation and the equality used by authorization.
#[derive(Clone)]
pub struct Routing {
    rules: Arc<RuleRegistry>,
    equality: EqualityFn,
}

impl Routing {
    /// Routing with the default rules and deep equality.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rules(RuleRegistry::default())
    }

    /// Routing with a custom rule registry.
    #[must_use]
    pub fn with_rules(rules: RuleRegistry) -> Self {
        Self {
            rules: Arc::new(rules),
            equality: deep_equal,
        }
    }

    /// Replace the equality used for auth attributes.
    #[must_use]
    pub fn with_equality(mut self, equality: EqualityFn) -> Self {
        self.equality = equality;
        self
    }

    /// The rule registry.
    #[must_use]
    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// The auth equality.
    #[must_use]
    pub fn equality(&self) -> EqualityFn {
        self.equality
    }

    /// Connection middleware installing this routing configuration.
    pub fn middleware<C: Channel + ?Sized>(self) -> impl Fn(&C, Next<'_>) + Send + Sync {
        move |channel: &C, next: Next<'_>| {
            install(channel, self.clone());
            next.run();
        }
    }
}

impl Default for Routing {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Routing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routing")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

fn install<C: Channel + ?Sized>(channel: &C, routing: Routing) {
    if channel.install_routing(routing) {
        debug!(connection = %channel.id(), "Routing installed");
    } else {
        warn!(connection = %channel.id(), "Routing already installed");
    }
}

/// Connection middleware giving a channel the `route` capability.
///
/// Installs the default [`Routing`] and always continues the chain.
pub fn setup_socket_route<C: Channel + ?Sized>(channel: &C, next: Next<'_>) {
    install(channel, Routing::new());
    next.run();
}

/// Start a route declaration for `event` on `channel`.
///
/// # Errors
///
/// Returns [`RouteError::NotInstalled`] if routing was never installed on the
/// channel.
pub fn route(channel: Arc<dyn Channel>, event: impl Into<String>) -> Result<RouteBuilder, RouteError> {
    let routing = channel.routing().ok_or(RouteError::NotInstalled)?.clone();
    Ok(RouteBuilder::new(channel, routing, event.into()))
}

/// `route` as a method on shared channels.
pub trait RouteExt {
    /// Start a route declaration for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::NotInstalled`] if routing was never installed.
    fn route(&self, event: impl Into<String>) -> Result<RouteBuilder, RouteError>;
}

impl<C: Channel> RouteExt for Arc<C> {
    fn route(&self, event: impl Into<String>) -> Result<RouteBuilder, RouteError> {
        route(self.clone(), event)
    }
}

impl RouteExt for Arc<dyn Channel> {
    fn route(&self, event: impl Into<String>) -> Result<RouteBuilder, RouteError> {
        route(self.clone(), event)
    }
}

/// Configuration accumulated by a [`RouteBuilder`].
pub(crate) struct RouteConfig {
    pub(crate) event: String,
    pub(crate) auth: Option<Value>,
    pub(crate) validation: Option<Value>,
    pub(crate) logger: Arc<dyn LoggerHook>,
}

/// Fluent declaration of one route.
///
/// Each method replaces its own setting and hands the builder back.
#[must_use = "a route does nothing until `process` is called"]
pub struct RouteBuilder {
    channel: Arc<dyn Channel>,
    routing: Routing,
    config: RouteConfig,
}

impl RouteBuilder {
    fn new(channel: Arc<dyn Channel>, routing: Routing, event: String) -> Self {
        Self {
            channel,
            routing,
            config: RouteConfig {
                event,
                auth: None,
                validation: None,
                logger: Arc::new(NoopLogger),
            },
        }
    }

    /// Event name this route handles.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.config.event
    }

    /// Require the connection's auth context to contain these attributes.
    ///
    /// Replaces any previous auth rule.
    pub fn auth(mut self, expected: Value) -> Self {
        self.config.auth = Some(expected);
        self
    }

    /// Require payload attributes to satisfy named rules.
    ///
    /// Replaces any previous validation rules.
    pub fn validate(mut self, rules: Value) -> Self {
        self.config.validation = Some(rules);
        self
    }

    /// Report every invocation to `hook`.
    ///
    /// Replaces any previous hook.
    pub fn log(mut self, hook: impl LoggerHook + 'static) -> Self {
        self.config.logger = Arc::new(hook);
        self
    }

    /// Attach the work function and start listening for the event.
    ///
    /// The work function may return anything convertible into a
    /// [`Deferred`]: a `Result`, a plain `Value`, `()`, or a `Deferred`
    /// wrapping a future.
    pub fn process<F, D>(self, work: F)
    where
        F: Fn(Value) -> D + Send + Sync + 'static,
        D: Into<Deferred>,
    {
        let event = self.config.event.clone();
        let dispatcher = Dispatcher::new(
            self.config,
            self.routing,
            Arc::downgrade(&self.channel),
            Arc::new(move |payload: Value| -> Deferred { work(payload).into() }),
        );

        self.channel.on(&event, dispatcher.into_listener());
        debug!(connection = %self.channel.id(), event = %event, "Route registered");
    }
}

impl std::fmt::Debug for RouteBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteBuilder")
            .field("connection", &self.channel.id())
            .field("event", &self.config.event)
            .field("auth", &self.config.auth)
            .field("validation", &self.config.validation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::{Handshake, Socket};
    use serde_json::json;

    #[test]
    fn test_route_requires_installation() {
        let (socket, _rx) = Socket::new(Handshake::default());
        assert!(matches!(
            socket.route("msg"),
            Err(RouteError::NotInstalled)
        ));

        let mut proceeded = false;
        setup_socket_route(&*socket, Next::new(&mut proceeded));
        assert!(proceeded);
        assert!(socket.route("msg").is_ok());
    }

    #[test]
    fn test_builder_replaces_settings() {
        let (socket, _rx) = Socket::new(Handshake::default());
        socket.install_routing(Routing::new());

        let builder = socket
            .route("msg")
            .unwrap()
            .auth(json!({"a": 1}))
            .auth(json!({"b": 2}))
            .validate(json!({"email": {"isEmail": true}}));

        assert_eq!(builder.event(), "msg");
        assert_eq!(builder.config.auth, Some(json!({"b": 2})));
        assert_eq!(
            builder.config.validation,
            Some(json!({"email": {"isEmail": true}}))
        );
        assert_eq!(socket.listener_count("msg"), 0);

        builder.process(|_| ());
        assert_eq!(socket.listener_count("msg"), 1);
    }

    #[test]
    fn test_custom_routing_middleware() {
        let mut rules = RuleRegistry::empty();
        rules.register("always", |_: &Value, _: &Value| -> crate::rules::Verdict {
            crate::rules::Verdict::Pass
        });
        let middleware = Routing::with_rules(rules).middleware::<Socket>();

        let (socket, _rx) = Socket::new(Handshake::default());
        let mut proceeded = false;
        middleware(&*socket, Next::new(&mut proceeded));

        assert!(proceeded);
        let routing = socket.routing().unwrap();
        assert!(routing.rules().contains("always"));
        assert!(!routing.rules().contains("isEmail"));
    }
}
