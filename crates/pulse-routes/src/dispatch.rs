//! The guarded listener installed by `RouteBuilder::process`.
//!
//! Per event: authorize, validate, run the work function, log, respond.
//! Each guard short-circuits the stages after it. The logger hook runs once
//! for every event, whatever the outcome.

use crate::auth::authorize;
use crate::channel::{Ack, Channel, Listener, ERROR_EVENT};
use crate::deferred::Deferred;
use crate::error::RouteError;
use crate::logger::format_elapsed;
use crate::route::{RouteConfig, Routing};
use crate::validate::validate;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Work function with its outcome normalized to a [`Deferred`].
pub(crate) type WorkFn = Arc<dyn Fn(Value) -> Deferred + Send + Sync>;

pub(crate) struct Dispatcher {
    config: RouteConfig,
    routing: Routing,
    channel: Weak<dyn Channel>,
    work: WorkFn,
}

impl Dispatcher {
    pub(crate) fn new(
        config: RouteConfig,
        routing: Routing,
        channel: Weak<dyn Channel>,
        work: WorkFn,
    ) -> Self {
        Self {
            config,
            routing,
            channel,
            work,
        }
    }

    pub(crate) fn into_listener(self) -> Listener {
        let this = Arc::new(self);
        Arc::new(move |payload: Value, ack: Option<Ack>| -> BoxFuture<'static, ()> {
            let this = Arc::clone(&this);
            // Pin the channel when the event arrives, not when the task runs.
            let channel = this.channel.upgrade();
            async move { this.dispatch(channel, payload, ack).await }.boxed()
        })
    }

    async fn dispatch(&self, channel: Option<Arc<dyn Channel>>, payload: Value, ack: Option<Ack>) {
        let started = Instant::now();

        let Some(channel) = channel else {
            debug!(event = %self.config.event, "Channel dropped before dispatch");
            let err = RouteError::ChannelClosed;
            let elapsed = format_elapsed(started.elapsed());
            self.config
                .logger
                .log(&self.config.event, &payload, Some(&err), &elapsed);
            if let Some(ack) = ack {
                ack.send(Err(err));
            }
            return;
        };

        let outcome = self.run(channel.as_ref(), &payload).await;
        let elapsed = format_elapsed(started.elapsed());

        self.config
            .logger
            .log(&self.config.event, &payload, outcome.as_ref().err(), &elapsed);

        self.respond(channel.as_ref(), outcome, ack);
    }

    async fn run(&self, channel: &dyn Channel, payload: &Value) -> Result<Value, RouteError> {
        let event = &self.config.event;

        trace!(event = %event, "Authenticating");
        if let Some(rule) = &self.config.auth {
            if !authorize(rule, channel.auth_context(), self.routing.equality()) {
                return Err(RouteError::Unauthorized);
            }
        }

        trace!(event = %event, "Validating");
        if let Some(rules) = &self.config.validation {
            validate(rules, payload, self.routing.rules())?;
        }

        trace!(event = %event, "Executing");
        let work = Arc::clone(&self.work);
        let input = payload.clone();
        let deferred = panic::catch_unwind(AssertUnwindSafe(move || work(input)))
            .map_err(panic_error)?;

        match AssertUnwindSafe(deferred).catch_unwind().await {
            Ok(result) => result.map_err(RouteError::Execution),
            Err(panicked) => Err(panic_error(panicked)),
        }
    }

    fn respond(&self, channel: &dyn Channel, outcome: Result<Value, RouteError>, ack: Option<Ack>) {
        match (ack, outcome) {
            (Some(ack), outcome) => {
                ack.send(outcome);
            }
            (None, Ok(_)) => {}
            // An `error` event would be delivered straight back to this route.
            (None, Err(err)) if self.config.event == ERROR_EVENT => {
                warn!(
                    connection = %channel.id(),
                    kind = err.kind(),
                    error = %err,
                    "Route on error event failed"
                );
            }
            // Execution errors are reported like guard failures when nobody is
            // waiting on an ack.
            (None, Err(err)) => {
                debug!(
                    connection = %channel.id(),
                    event = %self.config.event,
                    kind = err.kind(),
                    "Emitting route error"
                );
                channel.emit(ERROR_EVENT, err.to_body().into_value());
            }
        }
    }
}

fn panic_error(panicked: Box<dyn Any + Send>) -> RouteError {
    let message = panicked
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panicked.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    RouteError::execution(format!("work function panicked: {message}"))
}
