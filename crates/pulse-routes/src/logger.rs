//! Invocation logging hooks.
//!
//! A route's logger hook is called exactly once per handled event, after the
//! outcome is known and before the response is delivered.

use crate::error::RouteError;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// Observer of route invocations.
///
/// `error` is `None` only when the work function succeeded. `elapsed` is a
/// human-readable duration such as `1.27ms`.
pub trait LoggerHook: Send + Sync {
    /// Record one invocation.
    fn log(&self, event: &str, payload: &Value, error: Option<&RouteError>, elapsed: &str);
}

impl<F> LoggerHook for F
where
    F: Fn(&str, &Value, Option<&RouteError>, &str) + Send + Sync,
{
    fn log(&self, event: &str, payload: &Value, error: Option<&RouteError>, elapsed: &str) {
        self(event, payload, error, elapsed)
    }
}

/// Hook that discards everything. Routes use it until `log` is called.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl LoggerHook for NoopLogger {
    fn log(&self, _: &str, _: &Value, _: Option<&RouteError>, _: &str) {}
}

/// Hook that writes one `tracing` record per invocation.
///
/// Successes are logged at `INFO`, failures at `WARN`. Payloads are only
/// included when `with_payload` is set.
#[derive(Debug, Default, Clone)]
pub struct TracingLogger {
    include_payload: bool,
}

impl TracingLogger {
    /// Create a logger that omits payloads.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Include event payloads in log records.
    #[must_use]
    pub fn with_payload(mut self) -> Self {
        self.include_payload = true;
        self
    }
}

impl LoggerHook for TracingLogger {
    fn log(&self, event: &str, payload: &Value, error: Option<&RouteError>, elapsed: &str) {
        let payload = self.include_payload.then(|| payload.to_string());
        match error {
            None => info!(event = %event, elapsed = %elapsed, payload = ?payload, "Event handled"),
            Some(e) => warn!(
                event = %event,
                elapsed = %elapsed,
                payload = ?payload,
                kind = e.kind(),
                error = %e,
                "Event failed"
            ),
        }
    }
}

/// Format an elapsed duration for logger hooks.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{elapsed:.2?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_micros(1500)), "1.50ms");
        assert_eq!(format_elapsed(Duration::from_secs(2)), "2.00s");
        assert!(!format_elapsed(Duration::ZERO).is_empty());
    }

    #[test]
    fn test_closure_hook() {
        let seen = Mutex::new(Vec::new());
        let hook = |event: &str, _: &Value, error: Option<&RouteError>, elapsed: &str| {
            seen.lock()
                .unwrap()
                .push((event.to_string(), error.map(|e| e.to_string()), elapsed.to_string()));
        };

        hook.log("msg", &json!("message"), None, "1.00ms");
        hook.log("msg", &json!("message"), Some(&RouteError::Unauthorized), "2.00ms");

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ("msg".to_string(), None, "1.00ms".to_string()));
        assert_eq!(seen[1].1.as_deref(), Some("Not authorized"));
    }

    #[test]
    fn test_builtin_hooks_do_not_panic() {
        NoopLogger.log("msg", &Value::Null, None, "1ms");
        TracingLogger::new()
            .with_payload()
            .log("msg", &json!({"a": 1}), Some(&RouteError::InvalidData), "1ms");
    }
}
