//! Route errors.

use pulse_protocol::ErrorBody;
use serde_json::Value;
use thiserror::Error;

/// Boxed error returned by work functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while routing an event.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The socket's auth context does not match the route's auth rule.
    #[error("Not authorized")]
    Unauthorized,

    /// A validation rule rejected the payload.
    #[error("Invalid data")]
    InvalidData,

    /// A validation rule rejected the payload and reported why.
    #[error("Invalid data: {0}")]
    InvalidDataDetail(Value),

    /// The validation ruleset names an unknown rule or is malformed.
    #[error("Invalid validation rule: {0}")]
    InvalidRule(String),

    /// The work function failed.
    #[error("{0}")]
    Execution(BoxError),

    /// The channel was gone before the event could be handled.
    #[error("Channel closed")]
    ChannelClosed,

    /// `route` was called on a socket without routing installed.
    #[error("Routing is not installed on this socket")]
    NotInstalled,
}

impl RouteError {
    /// Build an execution error from any error or message.
    pub fn execution(err: impl Into<BoxError>) -> Self {
        RouteError::Execution(err.into())
    }

    /// Whether the error was raised by the auth or validation guards.
    #[must_use]
    pub fn is_guard_failure(&self) -> bool {
        matches!(
            self,
            RouteError::Unauthorized
                | RouteError::InvalidData
                | RouteError::InvalidDataDetail(_)
                | RouteError::InvalidRule(_)
        )
    }

    /// Short, stable label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RouteError::Unauthorized => "unauthorized",
            RouteError::InvalidData | RouteError::InvalidDataDetail(_) => "invalid_data",
            RouteError::InvalidRule(_) => "invalid_rule",
            RouteError::Execution(_) => "execution",
            RouteError::ChannelClosed => "channel_closed",
            RouteError::NotInstalled => "not_installed",
        }
    }

    /// Wire representation used for acks and `error` events.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        match self {
            // Keep the fixed message and carry the raw rule output separately.
            RouteError::InvalidDataDetail(detail) => {
                ErrorBody::new("Invalid data").with_data(detail.clone())
            }
            other => ErrorBody::new(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fixed_messages() {
        assert_eq!(RouteError::Unauthorized.to_string(), "Not authorized");
        assert_eq!(RouteError::InvalidData.to_string(), "Invalid data");
    }

    #[test]
    fn test_execution_message_is_unmodified() {
        let err = RouteError::execution("Invalid message");
        assert_eq!(err.to_string(), "Invalid message");
        assert!(!err.is_guard_failure());
        assert_eq!(err.to_body(), ErrorBody::new("Invalid message"));
    }

    #[test]
    fn test_detail_body() {
        let err = RouteError::InvalidDataDetail(json!({"field": "email"}));
        assert!(err.is_guard_failure());
        assert_eq!(
            err.to_body(),
            ErrorBody::new("Invalid data").with_data(json!({"field": "email"}))
        );
    }
}
