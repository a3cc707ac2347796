//! Deferred work-function outcomes.
//!
//! Work functions may answer immediately or asynchronously. Both are turned
//! into a [`Deferred`], which the dispatcher simply awaits.

use crate::error::BoxError;
use futures_util::future::{self, BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A work-function outcome that is available now or later.
pub struct Deferred {
    inner: BoxFuture<'static, Result<Value, BoxError>>,
}

impl Deferred {
    /// Wrap a future.
    pub fn new<F, T, E>(fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Into<Value> + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            inner: fut
                .map(|res| -> Result<Value, BoxError> { res.map(Into::into).map_err(Into::into) })
                .boxed(),
        }
    }

    /// An immediately available value.
    pub fn ready(value: impl Into<Value>) -> Self {
        Self {
            inner: future::ready(Ok(value.into())).boxed(),
        }
    }

    /// An immediately available failure.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self {
            inner: future::ready(Err(err.into())).boxed(),
        }
    }
}

impl Future for Deferred {
    type Output = Result<Value, BoxError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

impl From<Value> for Deferred {
    fn from(value: Value) -> Self {
        Deferred::ready(value)
    }
}

impl From<&str> for Deferred {
    fn from(value: &str) -> Self {
        Deferred::ready(value)
    }
}

impl From<String> for Deferred {
    fn from(value: String) -> Self {
        Deferred::ready(value)
    }
}

/// Work functions that only emit their own events.
impl From<()> for Deferred {
    fn from(_: ()) -> Self {
        Deferred::ready(Value::Null)
    }
}

impl<T, E> From<Result<T, E>> for Deferred
where
    T: Into<Value>,
    E: Into<BoxError>,
{
    fn from(res: Result<T, E>) -> Self {
        match res {
            Ok(value) => Deferred::ready(value),
            Err(err) => Deferred::failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ready_and_pending_resolve_alike() {
        let now: Deferred = Ok::<_, BoxError>("success").into();
        let later = Deferred::new(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, BoxError>("success")
        });

        assert_eq!(now.await.unwrap(), json!("success"));
        assert_eq!(later.await.unwrap(), json!("success"));
    }

    #[tokio::test]
    async fn test_failures_keep_their_message() {
        let now: Deferred = Err::<Value, _>("Invalid message").into();
        let later = Deferred::new(async { Err::<Value, _>("Invalid message") });

        assert_eq!(now.await.unwrap_err().to_string(), "Invalid message");
        assert_eq!(later.await.unwrap_err().to_string(), "Invalid message");
    }

    #[tokio::test]
    async fn test_unit_is_null() {
        let deferred: Deferred = ().into();
        assert_eq!(deferred.await.unwrap(), Value::Null);
    }
}
