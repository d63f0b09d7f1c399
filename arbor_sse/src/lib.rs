//! GraphQL over Server-Sent Events (the `graphql-sse` protocol, distinct
//! connections mode) for the `arbor` crate.
//!
//! The host accepts a POST with a standard GraphQL request body, calls
//! [`handle_request`], and writes every yielded frame to a
//! `text/event-stream` response. Dropping the frame stream cancels the
//! underlying operation, so client disconnection handling is just dropping
//! the response body.
//!
//! Frames are `event: next` with a `{data, errors}` payload per execution
//! result, one final `event: complete`, or `event: error` when the request
//! fails before producing any result. Keepalives are empty comment lines.

use std::{sync::Arc, time::Duration};

use arbor::{
    http::GraphQLRequest, ExecutionOutput, GraphQLError, Schema, Services,
};
use futures::{
    future,
    stream::{self, BoxStream, StreamExt},
};

/// A stream of wire-ready SSE frames, each ending in a blank line.
pub type FrameStream = BoxStream<'static, String>;

/// Formats one execution result as a `next` event.
pub fn next_frame(payload: &ExecutionOutput) -> String {
    let data = serde_json::to_string(payload).unwrap_or_else(|_| "null".into());
    format!("event: next\ndata: {data}\n\n")
}

/// Formats the terminal `complete` event.
pub fn complete_frame() -> String {
    "event: complete\n\n".into()
}

/// Formats a request-level failure as an `error` event.
pub fn error_frame(error: &GraphQLError) -> String {
    let data = serde_json::to_string(error).unwrap_or_else(|_| "[]".into());
    format!("event: error\ndata: {data}\n\n")
}

/// The keepalive comment frame.
pub fn keepalive_frame() -> String {
    ":\n\n".into()
}

/// Executes `request` and returns its SSE frame stream.
///
/// Queries and mutations produce one `next` frame followed by `complete`;
/// subscriptions produce a `next` frame per published payload, then
/// `complete` when the source stream ends. Failures before the first
/// payload produce a single `error` frame.
pub async fn handle_request(
    schema: Arc<Schema>,
    services: Services,
    request: GraphQLRequest,
) -> FrameStream {
    let variables = request.variables();
    let operation_name = request.operation_name().map(str::to_owned);

    match arbor::execute(
        request.query(),
        operation_name.as_deref(),
        &schema,
        &variables,
        &services,
    )
    .await
    {
        Ok((data, errors)) => {
            let output = ExecutionOutput { data, errors };
            stream::iter([next_frame(&output), complete_frame()]).boxed()
        }
        Err(GraphQLError::IsSubscription) => {
            match arbor::resolve_into_stream(
                request.query(),
                operation_name.as_deref(),
                &schema,
                &variables,
                &services,
            )
            .await
            {
                Ok(outputs) => outputs
                    .map(|output| next_frame(&output))
                    .chain(stream::once(future::ready(complete_frame())))
                    .boxed(),
                Err(error) => stream::iter([error_frame(&error)]).boxed(),
            }
        }
        Err(error) => stream::iter([error_frame(&error)]).boxed(),
    }
}

/// Interleaves keepalive comment frames whenever `interval` elapses between
/// payload frames. The merged stream still ends when the payload stream
/// ends.
pub fn with_keep_alive(frames: FrameStream, interval: Duration) -> FrameStream {
    let payloads = frames.map(Some).chain(stream::once(future::ready(None)));
    let keepalives = stream::unfold((), move |()| async move {
        tokio::time::sleep(interval).await;
        Some((Some(keepalive_frame()), ()))
    });
    stream::select(payloads, keepalives)
        .take_while(|frame| future::ready(frame.is_some()))
        .filter_map(future::ready)
        .boxed()
}

#[cfg(test)]
mod test {
    use arbor::{ast, FieldDef, SchemaBuilder, SubscriptionFieldDef, SubscriptionStream, Value};
    use serde_json::json;

    use super::*;

    fn test_schema() -> Arc<Schema> {
        Arc::new(
            SchemaBuilder::new()
                .query(
                    "hello",
                    FieldDef::new(ast::string()).resolve(|_| async { Ok(Value::scalar("world")) }),
                )
                .subscription(
                    "ticks",
                    SubscriptionFieldDef::new(ast::int()).subscribe(|_| async {
                        let s: SubscriptionStream =
                            stream::iter([Ok(Value::scalar(1)), Ok(Value::scalar(2))]).boxed();
                        Ok(s)
                    }),
                )
                .build()
                .expect("test schema builds"),
        )
    }

    fn request(query: &str) -> GraphQLRequest {
        GraphQLRequest::new(query.into(), None, None)
    }

    #[tokio::test]
    async fn query_emits_one_next_then_complete() {
        let frames: Vec<String> =
            handle_request(test_schema(), Services::new(), request("{ hello }"))
                .await
                .collect()
                .await;
        assert_eq!(
            frames,
            vec![
                format!(
                    "event: next\ndata: {}\n\n",
                    json!({"data": {"hello": "world"}}),
                ),
                "event: complete\n\n".to_owned(),
            ],
        );
    }

    #[tokio::test]
    async fn subscription_emits_next_per_payload() {
        let frames: Vec<String> = handle_request(
            test_schema(),
            Services::new(),
            request("subscription { ticks }"),
        )
        .await
        .collect()
        .await;
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames[0],
            format!("event: next\ndata: {}\n\n", json!({"data": {"ticks": 1}})),
        );
        assert_eq!(
            frames[1],
            format!("event: next\ndata: {}\n\n", json!({"data": {"ticks": 2}})),
        );
        assert_eq!(frames[2], "event: complete\n\n");
    }

    #[tokio::test]
    async fn request_failures_emit_an_error_event() {
        let frames: Vec<String> =
            handle_request(test_schema(), Services::new(), request("{ nope }"))
                .await
                .collect()
                .await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("event: error\ndata: "));
        assert!(frames[0].contains("Unknown field"));
    }

    #[tokio::test(start_paused = true)]
    async fn keepalives_interleave_between_payloads() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<String>();
        let frames = with_keep_alive(rx.boxed(), Duration::from_secs(5));
        futures::pin_mut!(frames);

        tx.unbounded_send("first\n\n".into()).unwrap();
        assert_eq!(frames.next().await.unwrap(), "first\n\n");

        // With no payloads pending, the keepalive timer fires.
        assert_eq!(frames.next().await.unwrap(), ":\n\n");

        drop(tx);
        assert_eq!(frames.next().await, None);
    }
}
