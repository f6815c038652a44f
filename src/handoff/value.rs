//! Values that may still be resolving when the response starts.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde_json::{Map, Value};

use crate::build::ServerMode;
use crate::errors::{route_error_to_json, serialize_error, RouteError, SerializedError};

pub type DeferredResult = Result<HandoffValue, SerializedError>;
pub type DeferredFuture = Shared<BoxFuture<'static, DeferredResult>>;

/// Loader data as it travels to the client: plain JSON, a map whose entries
/// may be pending, a pending value, or a captured route error.
#[derive(Clone)]
pub enum HandoffValue {
    Json(Value),
    Map(BTreeMap<String, HandoffValue>),
    Deferred(DeferredFuture),
    Error(RouteError),
}

impl HandoffValue {
    pub fn null() -> Self {
        HandoffValue::Json(Value::Null)
    }

    pub fn deferred<F>(fut: F) -> Self
    where
        F: Future<Output = DeferredResult> + Send + 'static,
    {
        HandoffValue::Deferred(fut.boxed().shared())
    }

    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, HandoffValue)>,
        K: Into<String>,
    {
        HandoffValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Await every pending value and produce plain JSON. Rejections become
    /// serialized errors in place.
    pub fn resolve(self, mode: ServerMode) -> BoxFuture<'static, Value> {
        async move {
            match self {
                HandoffValue::Json(v) => v,
                HandoffValue::Error(e) => route_error_to_json(&e, mode),
                HandoffValue::Map(entries) => {
                    let mut out = Map::new();
                    for (k, v) in entries {
                        out.insert(k, v.resolve(mode).await);
                    }
                    Value::Object(out)
                }
                HandoffValue::Deferred(fut) => match fut.await {
                    Ok(v) => v.resolve(mode).await,
                    Err(e) => serialize_error(&e, mode),
                },
            }
        }
        .boxed()
    }

    /// JSON without waiting; pending values that have not settled become null.
    pub fn to_json_lossy(&self, mode: ServerMode) -> Value {
        match self {
            HandoffValue::Json(v) => v.clone(),
            HandoffValue::Error(e) => route_error_to_json(e, mode),
            HandoffValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json_lossy(mode)))
                    .collect(),
            ),
            HandoffValue::Deferred(fut) => match fut.peek() {
                Some(Ok(v)) => v.to_json_lossy(mode),
                Some(Err(e)) => serialize_error(e, mode),
                None => Value::Null,
            },
        }
    }
}

impl From<Value> for HandoffValue {
    fn from(value: Value) -> Self {
        HandoffValue::Json(value)
    }
}

impl From<RouteError> for HandoffValue {
    fn from(err: RouteError) -> Self {
        HandoffValue::Error(err)
    }
}

impl fmt::Debug for HandoffValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoffValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
            HandoffValue::Map(m) => f.debug_tuple("Map").field(m).finish(),
            HandoffValue::Deferred(_) => f.write_str("Deferred"),
            HandoffValue::Error(e) => f.debug_tuple("Error").field(e).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolve_awaits_nested_values() {
        let value = HandoffValue::map([
            ("ready", HandoffValue::Json(json!(1))),
            (
                "later",
                HandoffValue::deferred(async { Ok(HandoffValue::Json(json!("done"))) }),
            ),
            (
                "failed",
                HandoffValue::deferred(async { Err(SerializedError::new("nope")) }),
            ),
        ]);

        assert_eq!(value.to_json_lossy(ServerMode::Development)["later"], Value::Null);

        let resolved = value.resolve(ServerMode::Development).await;
        assert_eq!(resolved["ready"], json!(1));
        assert_eq!(resolved["later"], json!("done"));
        assert_eq!(resolved["failed"]["message"], json!("nope"));
    }
}
