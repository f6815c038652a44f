//! Streaming NDJSON encoding of hand-off values.
//!
//! # Responsibilities
//! - Emit the root value immediately, with placeholders for pending values
//! - Emit one line per settled value, in completion order
//! - Reject whatever is still pending when the timeout fires
//! - Stop as soon as the request's cancellation token fires

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::build::ServerMode;
use crate::errors::{route_error_to_json, serialize_error};

use super::value::{DeferredResult, HandoffValue};

pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_millis(4950);
pub const SERVER_TIMEOUT_MESSAGE: &str = "Server Timeout";

type Settled = BoxFuture<'static, (usize, DeferredResult)>;

struct Encoder {
    mode: ServerMode,
    next_id: usize,
    outstanding: BTreeSet<usize>,
    pending: FuturesUnordered<Settled>,
}

impl Encoder {
    fn new(mode: ServerMode) -> Self {
        Self {
            mode,
            next_id: 0,
            outstanding: BTreeSet::new(),
            pending: FuturesUnordered::new(),
        }
    }

    /// Replace pending values with placeholders and queue them.
    fn flatten(&mut self, value: HandoffValue) -> Value {
        match value {
            HandoffValue::Json(v) => v,
            HandoffValue::Error(e) => route_error_to_json(&e, self.mode),
            HandoffValue::Map(entries) => {
                let mut out = Map::new();
                for (k, v) in entries {
                    out.insert(k, self.flatten(v));
                }
                Value::Object(out)
            }
            HandoffValue::Deferred(fut) => {
                let id = self.next_id;
                self.next_id += 1;
                self.outstanding.insert(id);
                self.pending.push(fut.map(move |result| (id, result)).boxed());
                json!({ "$deferred": id })
            }
        }
    }

    fn settle(&mut self, id: usize, result: DeferredResult) -> Value {
        self.outstanding.remove(&id);
        match result {
            Ok(value) => json!({ "$resolve": id, "value": self.flatten(value) }),
            Err(err) => json!({ "$reject": id, "error": serialize_error(&err, self.mode) }),
        }
    }

    fn time_out(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.outstanding)
            .into_iter()
            .map(|id| json!({ "$reject": id, "error": { "message": SERVER_TIMEOUT_MESSAGE } }))
            .collect()
    }
}

enum Event {
    Cancelled,
    TimedOut,
    Settled(usize, DeferredResult),
    Drained,
}

fn line(value: &Value) -> String {
    let mut out = value.to_string();
    out.push('\n');
    out
}

/// Encode `value` as a streaming body.
pub fn encode(
    value: HandoffValue,
    signal: CancellationToken,
    timeout: Duration,
    mode: ServerMode,
) -> Body {
    let stream = async_stream::stream! {
        let mut encoder = Encoder::new(mode);
        let root = encoder.flatten(value);
        yield Ok::<_, Infallible>(line(&root));

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        while !encoder.outstanding.is_empty() {
            let event = tokio::select! {
                biased;
                _ = signal.cancelled() => Event::Cancelled,
                _ = &mut deadline => Event::TimedOut,
                next = encoder.pending.next() => match next {
                    Some((id, result)) => Event::Settled(id, result),
                    None => Event::Drained,
                },
            };

            match event {
                Event::Cancelled | Event::Drained => break,
                Event::TimedOut => {
                    for rejection in encoder.time_out() {
                        yield Ok(line(&rejection));
                    }
                    break;
                }
                Event::Settled(id, result) => {
                    let settled = encoder.settle(id, result);
                    yield Ok(line(&settled));
                }
            }
        }
    };
    Body::from_stream(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorResponse, RouteError, SerializedError};
    use axum::http::StatusCode;

    async fn lines(body: Body) -> Vec<Value> {
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_plain_value_is_one_line() {
        let body = encode(
            HandoffValue::Json(json!({"a": 1})),
            CancellationToken::new(),
            DEFAULT_STREAM_TIMEOUT,
            ServerMode::Test,
        );
        assert_eq!(lines(body).await, vec![json!({"a": 1})]);
    }

    #[tokio::test]
    async fn test_deferred_values_resolve_in_later_lines() {
        let value = HandoffValue::map([
            ("now", HandoffValue::Json(json!("x"))),
            (
                "soon",
                HandoffValue::deferred(async { Ok(HandoffValue::Json(json!(42))) }),
            ),
            (
                "broken",
                HandoffValue::deferred(async { Err(SerializedError::new("db down")) }),
            ),
        ]);
        let out = lines(encode(value, CancellationToken::new(), DEFAULT_STREAM_TIMEOUT, ServerMode::Production)).await;

        assert_eq!(out.len(), 3);
        assert_eq!(out[0]["now"], json!("x"));
        let soon_id = out[0]["soon"]["$deferred"].clone();
        let broken_id = out[0]["broken"]["$deferred"].clone();

        let resolved = out.iter().find(|l| l["$resolve"] == soon_id).unwrap();
        assert_eq!(resolved["value"], json!(42));
        let rejected = out.iter().find(|l| l["$reject"] == broken_id).unwrap();
        assert_eq!(rejected["error"]["message"], json!("Unexpected Server Error"));
    }

    #[tokio::test]
    async fn test_timeout_rejects_pending() {
        let value = HandoffValue::map([(
            "never",
            HandoffValue::deferred(futures_util::future::pending()),
        )]);
        let out = lines(encode(value, CancellationToken::new(), Duration::from_millis(20), ServerMode::Test)).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[1]["$reject"], json!(0));
        assert_eq!(out[1]["error"]["message"], json!(SERVER_TIMEOUT_MESSAGE));
    }

    #[tokio::test]
    async fn test_cancellation_ends_stream() {
        let token = CancellationToken::new();
        let value = HandoffValue::map([(
            "never",
            HandoffValue::deferred(futures_util::future::pending()),
        )]);
        let body = encode(value, token.clone(), Duration::from_secs(60), ServerMode::Test);
        token.cancel();
        let out = lines(body).await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_errors_are_tagged() {
        let value = HandoffValue::map([(
            "root",
            HandoffValue::Error(RouteError::Response(ErrorResponse::new(StatusCode::NOT_FOUND, "gone"))),
        )]);
        let out = lines(encode(value, CancellationToken::new(), DEFAULT_STREAM_TIMEOUT, ServerMode::Test)).await;
        assert_eq!(out[0]["root"]["__type"], json!("RouteErrorResponse"));
        assert_eq!(out[0]["root"]["status"], json!(404));
    }
}
