//! Implementation of the [`graphql-transport-ws` GraphQL over WebSocket
//! Protocol][proto] for the `arbor` crate.
//!
//! A [`Connection`] is a [`Sink`] for incoming client messages and a
//! [`Stream`] of outgoing messages; the hosting web framework glues the real
//! socket to both ends. The protocol state machine, operation bookkeeping,
//! and keepalives all live here.
//!
//! [proto]: https://github.com/enisdenjo/graphql-ws/blob/v5.14.0/PROTOCOL.md

mod client_message;
mod server_message;
mod util;

use std::{
    collections::HashMap,
    convert::Infallible,
    error::Error,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::Arc,
    time::Duration,
};

use arbor::{ExecutionOutput, GraphQLError, Schema, Services, Value, Variables};
use futures::{
    channel::oneshot,
    future::{self, BoxFuture, Either, Future, FutureExt},
    stream::{self, BoxStream, SelectAll, StreamExt},
    task::{Context, Poll, Waker},
    Sink, Stream,
};

pub use crate::{
    client_message::{ClientMessage, SubscribePayload},
    server_message::{ErrorPayload, ServerMessage},
};

/// The default connection-init wait timeout mandated by the protocol.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection configuration, produced by the [`Init`] hook once the client
/// has introduced itself.
pub struct ConnectionConfig {
    pub(crate) services: Services,
    pub(crate) keep_alive_interval: Duration,
    pub(crate) max_in_flight_operations: usize,
}

impl ConnectionConfig {
    /// Constructs a configuration executing operations with the given
    /// services.
    pub fn new(services: Services) -> Self {
        Self {
            services,
            keep_alive_interval: Duration::from_secs(15),
            max_in_flight_operations: 0,
        }
    }

    /// Sets the keepalive interval; zero disables keepalives.
    #[must_use]
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Caps concurrent in-flight operations; zero means no limit.
    #[must_use]
    pub fn with_max_in_flight_operations(mut self, max: usize) -> Self {
        self.max_in_flight_operations = max;
        self
    }
}

/// Performs the connection handshake: receives the `connection_init`
/// payload and either accepts the connection with a [`ConnectionConfig`]
/// (often after authenticating the payload) or rejects it.
pub trait Init: Send + 'static {
    /// The rejection error; its message is sent with the 4403 close frame.
    type Error: Error;

    /// Handles the `connection_init` payload.
    fn init(
        self,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'static, Result<ConnectionConfig, Self::Error>>;
}

impl Init for ConnectionConfig {
    type Error = Infallible;

    fn init(
        self,
        _params: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'static, Result<ConnectionConfig, Self::Error>> {
        future::ready(Ok(self)).boxed()
    }
}

impl<F, Fut, E> Init for F
where
    F: FnOnce(serde_json::Map<String, serde_json::Value>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<ConnectionConfig, E>> + Send + 'static,
    E: Error + 'static,
{
    type Error = E;

    fn init(
        self,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'static, Result<ConnectionConfig, Self::Error>> {
        self(params).boxed()
    }
}

/// Possible inputs received from a client (or signaled by the host on the
/// client's behalf — raw frame-level conditions never reach the state
/// machine directly).
#[derive(Debug)]
pub enum Input {
    /// A deserialized [`ClientMessage`].
    Message(ClientMessage),
    /// Client-initiated normal closing of the connection (1000).
    Close,
    /// The host is shutting down and the connection must go away (1001).
    Shutdown,
    /// The host observed a frame-level protocol violation, e.g. a binary
    /// frame on a text-only subprotocol (1002).
    ProtocolError(String),
}

impl From<ClientMessage> for Input {
    fn from(msg: ClientMessage) -> Self {
        Self::Message(msg)
    }
}

/// The responses that should be sent to the client.
#[derive(Debug)]
pub enum Output {
    /// A message to serialize and send.
    Message(ServerMessage),
    /// Close the connection with the given code and reason. Always the last
    /// item of the output stream.
    Close {
        /// The WebSocket close code.
        code: u16,
        /// The close reason.
        message: String,
    },
}

impl Output {
    fn into_stream(self) -> BoxStream<'static, Self> {
        stream::once(future::ready(self)).boxed()
    }
}

struct ExecutionParams {
    payload: SubscribePayload,
    config: Arc<ConnectionConfig>,
    schema: Arc<Schema>,
}

impl ExecutionParams {
    fn variables(&self) -> Variables {
        self.payload
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect()
    }
}

enum ConnectionState<I: Init> {
    /// Before a `connection_init` message has been accepted.
    PreInit {
        init: I,
        schema: Arc<Schema>,
        init_done: oneshot::Sender<()>,
    },
    /// After a `connection_init` message has been accepted.
    Active {
        config: Arc<ConnectionConfig>,
        stoppers: HashMap<String, oneshot::Sender<()>>,
        schema: Arc<Schema>,
    },
    /// After the connection has been rejected or closed.
    Terminated,
}

impl<I: Init> ConnectionState<I> {
    // Each message results in a stream of zero or more reactions, e.g. a
    // Ping message results in a one-item stream with the Pong reaction.
    async fn handle_message(self, msg: ClientMessage) -> (Self, BoxStream<'static, Output>) {
        match self {
            Self::PreInit {
                init,
                schema,
                init_done,
            } => match msg {
                ClientMessage::ConnectionInit { payload } => match init.init(payload).await {
                    Ok(config) => {
                        let _ = init_done.send(());
                        let keep_alive_interval = config.keep_alive_interval;

                        let mut s = Output::Message(ServerMessage::ConnectionAck).into_stream();
                        if keep_alive_interval > Duration::from_secs(0) {
                            s = s
                                .chain(stream::unfold((), move |()| async move {
                                    tokio::time::sleep(keep_alive_interval).await;
                                    Some((Output::Message(ServerMessage::Pong), ()))
                                }))
                                .boxed();
                        }

                        (
                            Self::Active {
                                config: Arc::new(config),
                                stoppers: HashMap::new(),
                                schema,
                            },
                            s,
                        )
                    }
                    Err(e) => (
                        Self::Terminated,
                        Output::Close {
                            code: 4403,
                            message: e.to_string(),
                        }
                        .into_stream(),
                    ),
                },
                ClientMessage::Ping { .. } => (
                    Self::PreInit {
                        init,
                        schema,
                        init_done,
                    },
                    Output::Message(ServerMessage::Pong).into_stream(),
                ),
                ClientMessage::Subscribe { .. } => (
                    Self::PreInit {
                        init,
                        schema,
                        init_done,
                    },
                    Output::Close {
                        code: 4401,
                        message: "Unauthorized".into(),
                    }
                    .into_stream(),
                ),
                _ => (
                    Self::PreInit {
                        init,
                        schema,
                        init_done,
                    },
                    stream::empty().boxed(),
                ),
            },
            Self::Active {
                config,
                mut stoppers,
                schema,
            } => {
                let reactions = match msg {
                    ClientMessage::ConnectionInit { .. } => {
                        return (
                            Self::Terminated,
                            Output::Close {
                                code: 4429,
                                message: "Too many initialisation requests".into(),
                            }
                            .into_stream(),
                        );
                    }
                    ClientMessage::Subscribe { id, payload } => {
                        if stoppers.contains_key(&id) {
                            // An in-flight operation already uses this id.
                            Output::Close {
                                code: 4409,
                                message: format!("Subscriber for {id} already exists"),
                            }
                            .into_stream()
                        } else {
                            // Prune canceled stoppers before adding a new one.
                            stoppers.retain(|_, tx| !tx.is_canceled());

                            if config.max_in_flight_operations > 0
                                && stoppers.len() >= config.max_in_flight_operations
                            {
                                stream::iter(vec![
                                    Output::Message(ServerMessage::Error {
                                        id: id.clone(),
                                        payload: ErrorPayload(GraphQLError::ValidationError(
                                            vec![arbor::RuleError::new(
                                                "Too many in-flight operations.",
                                                &[],
                                            )],
                                        )),
                                    }),
                                    Output::Message(ServerMessage::Complete { id }),
                                ])
                                .boxed()
                            } else {
                                // A channel for canceling the operation.
                                let (tx, rx) = oneshot::channel::<()>();
                                stoppers.insert(id.clone(), tx);

                                // The operation stream emits Next and Error
                                // messages; the Complete is appended here.
                                let s = start(
                                    id.clone(),
                                    ExecutionParams {
                                        payload,
                                        config: config.clone(),
                                        schema: schema.clone(),
                                    },
                                )
                                .into_stream()
                                .flatten();

                                // End the stream when the oneshot fires.
                                let s = stream::unfold(
                                    (rx, s.boxed()),
                                    |(rx, mut s)| async move {
                                        let next = match future::select(rx, s.next()).await {
                                            Either::Left(_) => None,
                                            Either::Right((r, rx)) => r.map(|r| (r, rx)),
                                        };
                                        next.map(|(r, rx)| (r, (rx, s)))
                                    },
                                );

                                s.chain(
                                    Output::Message(ServerMessage::Complete { id }).into_stream(),
                                )
                                .boxed()
                            }
                        }
                    }
                    ClientMessage::Complete { id } => {
                        stoppers.remove(&id);
                        stream::empty().boxed()
                    }
                    ClientMessage::Ping { .. } => {
                        Output::Message(ServerMessage::Pong).into_stream()
                    }
                    _ => stream::empty().boxed(),
                };
                (
                    Self::Active {
                        config,
                        stoppers,
                        schema,
                    },
                    reactions,
                )
            }
            Self::Terminated => (self, stream::empty().boxed()),
        }
    }
}

/// Runs one operation: queries and mutations execute single-shot, emitting
/// one `Next`; subscriptions forward every stream element. The caller
/// appends the `Complete`.
async fn start(id: String, params: ExecutionParams) -> BoxStream<'static, Output> {
    let variables = params.variables();

    match arbor::execute(
        &params.payload.query,
        params.payload.operation_name.as_deref(),
        &params.schema,
        &variables,
        &params.config.services,
    )
    .await
    {
        Ok((data, errors)) => Output::Message(ServerMessage::Next {
            id,
            payload: ExecutionOutput { data, errors },
        })
        .into_stream(),
        Err(GraphQLError::IsSubscription) => {
            match arbor::resolve_into_stream(
                &params.payload.query,
                params.payload.operation_name.as_deref(),
                &params.schema,
                &variables,
                &params.config.services,
            )
            .await
            {
                Ok(stream) => stream
                    .map(move |payload| {
                        Output::Message(ServerMessage::Next {
                            id: id.clone(),
                            payload,
                        })
                    })
                    .boxed(),
                Err(e) => Output::Message(ServerMessage::Error {
                    id,
                    payload: ErrorPayload(e),
                })
                .into_stream(),
            }
        }
        Err(e) => Output::Message(ServerMessage::Error {
            id,
            payload: ErrorPayload(e),
        })
        .into_stream(),
    }
}

enum ConnectionSinkState<I: Init> {
    Ready {
        state: ConnectionState<I>,
    },
    HandlingMessage {
        #[allow(clippy::type_complexity)]
        result: BoxFuture<'static, (ConnectionState<I>, BoxStream<'static, Output>)>,
    },
    Closed,
}

/// Implements the `graphql-transport-ws` protocol: a sink for
/// `TryInto<Input>` messages and a stream of [`Output`] messages.
pub struct Connection<I: Init> {
    reactions: SelectAll<BoxStream<'static, Output>>,
    stream_waker: Option<Waker>,
    stream_terminated: bool,
    sink_state: ConnectionSinkState<I>,
}

// `Connection` holds no self-referential pointers, so it is always safe to
// move regardless of whether `I` itself is `Unpin`.
impl<I: Init> Unpin for Connection<I> {}

impl<I: Init> Connection<I> {
    /// Creates a new connection with the default connection-init timeout.
    ///
    /// The `init` argument provides the services and configuration for the
    /// connection. Pass a [`ConnectionConfig`] when they are known up front,
    /// or a closure to authenticate the client's `connection_init` payload.
    pub fn new(schema: Arc<Schema>, init: I) -> Self {
        Self::with_init_timeout(schema, init, DEFAULT_INIT_TIMEOUT)
    }

    /// Creates a new connection closing with 4408 if no `connection_init`
    /// arrives within `timeout`. A zero timeout disables the check.
    pub fn with_init_timeout(schema: Arc<Schema>, init: I, timeout: Duration) -> Self {
        let (init_done, init_rx) = oneshot::channel::<()>();
        let mut reactions = SelectAll::new();
        if timeout > Duration::from_secs(0) {
            reactions.push(
                stream::once(async move {
                    match future::select(Box::pin(tokio::time::sleep(timeout)), init_rx).await {
                        Either::Left(_) => Some(Output::Close {
                            code: 4408,
                            message: "Connection initialisation timeout".into(),
                        }),
                        Either::Right(_) => None,
                    }
                })
                .filter_map(future::ready)
                .boxed(),
            );
        }

        Self {
            reactions,
            stream_waker: None,
            stream_terminated: false,
            sink_state: ConnectionSinkState::Ready {
                state: ConnectionState::PreInit {
                    init,
                    schema,
                    init_done,
                },
            },
        }
    }

    /// Polls the [`Sink`] half: drives any in-flight message handling and
    /// collects its reactions.
    fn poll_sink(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), &'static str>> {
        match &mut self.sink_state {
            ConnectionSinkState::Ready { .. } => Poll::Ready(Ok(())),
            ConnectionSinkState::HandlingMessage { result } => match Pin::new(result).poll(cx) {
                Poll::Ready((state, reactions)) => {
                    self.reactions.push(reactions);
                    self.sink_state = ConnectionSinkState::Ready { state };
                    if let Some(waker) = self.stream_waker.take() {
                        waker.wake();
                    }
                    Poll::Ready(Ok(()))
                }
                Poll::Pending => Poll::Pending,
            },
            ConnectionSinkState::Closed => Poll::Ready(Err("polled after close")),
        }
    }
}

impl<I, T> Sink<T> for Connection<I>
where
    I: Init,
    T: TryInto<Input>,
    T::Error: Error,
{
    type Error = Infallible;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.poll_sink(cx)
            .map_err(|e| panic!("`Connection::poll_ready()`: {e}"))
    }

    fn start_send(self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        let s = self.get_mut();
        let state = &mut s.sink_state;
        *state = match std::mem::replace(state, ConnectionSinkState::Closed) {
            ConnectionSinkState::Ready { state } => match item.try_into() {
                Ok(Input::Message(msg)) => ConnectionSinkState::HandlingMessage {
                    // A defect while dispatching a message must terminate
                    // the connection, not unwind into the host.
                    result: AssertUnwindSafe(state.handle_message(msg))
                        .catch_unwind()
                        .map(|handled| {
                            handled.unwrap_or_else(|_| {
                                (
                                    ConnectionState::Terminated,
                                    Output::Close {
                                        code: 1011,
                                        message: "Internal error".into(),
                                    }
                                    .into_stream(),
                                )
                            })
                        })
                        .boxed(),
                },
                Ok(Input::Close) => {
                    s.reactions.push(
                        Output::Close {
                            code: 1000,
                            message: "Normal Closure".into(),
                        }
                        .into_stream(),
                    );
                    ConnectionSinkState::Closed
                }
                Ok(Input::Shutdown) => {
                    s.reactions.push(
                        Output::Close {
                            code: 1001,
                            message: "Going away".into(),
                        }
                        .into_stream(),
                    );
                    ConnectionSinkState::Closed
                }
                Ok(Input::ProtocolError(message)) => {
                    s.reactions.push(
                        Output::Close {
                            code: 1002,
                            message,
                        }
                        .into_stream(),
                    );
                    ConnectionSinkState::Closed
                }
                Err(e) => {
                    // An unparseable message closes the connection.
                    s.reactions.push(
                        Output::Close {
                            code: 4400,
                            message: e.to_string(),
                        }
                        .into_stream(),
                    );
                    ConnectionSinkState::Closed
                }
            },
            _ => panic!("`Sink::start_send()`: called when not ready"),
        };
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.poll_sink(cx).map(|_| Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.sink_state = ConnectionSinkState::Closed;
        if let Some(waker) = self.stream_waker.take() {
            // Wake up the `Stream` side so it can close too.
            waker.wake();
        }
        Poll::Ready(Ok(()))
    }
}

impl<I: Init> Stream for Connection<I> {
    type Item = Output;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream_waker = Some(cx.waker().clone());

        if self.stream_terminated {
            return Poll::Ready(None);
        }

        if !self.reactions.is_empty() {
            match Pin::new(&mut self.reactions).poll_next(cx) {
                Poll::Ready(Some(Output::Close { code, message })) => {
                    self.stream_terminated = true;
                    return Poll::Ready(Some(Output::Close { code, message }));
                }
                Poll::Ready(Some(reaction)) => return Poll::Ready(Some(reaction)),
                Poll::Ready(None) => {
                    // The reaction stream can drain, e.g. when the first
                    // message needed no reaction. Just recreate it.
                    self.reactions = SelectAll::new();
                }
                Poll::Pending => {}
            }
        }

        if let ConnectionSinkState::Closed = self.sink_state {
            return Poll::Ready(None);
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod test {
    use arbor::{ast, FieldDef, SchemaBuilder, SubscriptionFieldDef, SubscriptionStream};
    use futures::sink::SinkExt;
    use serde_json::json;

    use super::*;

    fn new_test_schema() -> Arc<Schema> {
        Arc::new(
            SchemaBuilder::new()
                .query(
                    "context",
                    FieldDef::new(ast::int()).resolve(|_| async { Ok(Value::scalar(1)) }),
                )
                .subscription(
                    "upTo",
                    SubscriptionFieldDef::new(ast::int())
                        .args(ast::structure([ast::field("limit", ast::int())]))
                        .subscribe(|rargs| async move {
                            let limit = rargs
                                .args
                                .as_object()
                                .and_then(|o| o.get_field_value("limit"))
                                .and_then(Value::as_int)
                                .unwrap_or(0);
                            let s: SubscriptionStream =
                                stream::iter((1..=limit).map(|n| Ok(Value::scalar(n)))).boxed();
                            Ok(s)
                        }),
                )
                .subscription(
                    "never",
                    SubscriptionFieldDef::new(ast::int()).subscribe(|_| async {
                        let s: SubscriptionStream = stream::pending().boxed();
                        Ok(s)
                    }),
                )
                .build()
                .expect("test schema builds"),
        )
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::new(Services::new())
            .with_keep_alive_interval(Duration::from_secs(0))
    }

    fn subscribe(id: &str, query: &str) -> ClientMessage {
        ClientMessage::Subscribe {
            id: id.into(),
            payload: SubscribePayload {
                query: query.into(),
                ..Default::default()
            },
        }
    }

    async fn next_json<I: Init>(conn: &mut Connection<I>) -> serde_json::Value {
        match conn.next().await.expect("connection yielded an output") {
            Output::Message(msg) => serde_json::to_value(&msg).unwrap(),
            close => panic!("expected a message, got {close:?}"),
        }
    }

    #[tokio::test]
    async fn init_then_single_shot_query() {
        let mut conn = Connection::new(new_test_schema(), config());

        conn.send(ClientMessage::ConnectionInit {
            payload: Default::default(),
        })
        .await
        .unwrap();
        assert_eq!(next_json(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(subscribe("foo", "{context}")).await.unwrap();
        assert_eq!(
            next_json(&mut conn).await,
            json!({
                "type": "next",
                "id": "foo",
                "payload": {"data": {"context": 1}},
            }),
        );
        assert_eq!(
            next_json(&mut conn).await,
            json!({"type": "complete", "id": "foo"}),
        );
    }

    #[tokio::test]
    async fn subscription_streams_then_completes() {
        let mut conn = Connection::new(new_test_schema(), config());

        conn.send(ClientMessage::ConnectionInit {
            payload: Default::default(),
        })
        .await
        .unwrap();
        assert_eq!(next_json(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(subscribe("s1", "subscription { upTo(limit: 2) }"))
            .await
            .unwrap();
        assert_eq!(
            next_json(&mut conn).await,
            json!({"type": "next", "id": "s1", "payload": {"data": {"upTo": 1}}}),
        );
        assert_eq!(
            next_json(&mut conn).await,
            json!({"type": "next", "id": "s1", "payload": {"data": {"upTo": 2}}}),
        );
        assert_eq!(
            next_json(&mut conn).await,
            json!({"type": "complete", "id": "s1"}),
        );
    }

    #[tokio::test]
    async fn premature_subscribe_is_unauthorized() {
        let mut conn = Connection::new(new_test_schema(), config());

        conn.send(subscribe("foo", "{context}")).await.unwrap();
        match conn.next().await.unwrap() {
            Output::Close { code, .. } => assert_eq!(code, 4401),
            other => panic!("expected a close frame, got {other:?}"),
        }
        assert!(conn.next().await.is_none());
    }

    #[tokio::test]
    async fn duplicate_subscription_ids_close_4409() {
        let mut conn = Connection::new(new_test_schema(), config());

        conn.send(ClientMessage::ConnectionInit {
            payload: Default::default(),
        })
        .await
        .unwrap();
        assert_eq!(next_json(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(subscribe("dup", "subscription { never }"))
            .await
            .unwrap();
        conn.send(subscribe("dup", "subscription { never }"))
            .await
            .unwrap();
        match conn.next().await.unwrap() {
            Output::Close { code, .. } => assert_eq!(code, 4409),
            other => panic!("expected a close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_connection_init_closes_4429() {
        let mut conn = Connection::new(new_test_schema(), config());

        conn.send(ClientMessage::ConnectionInit {
            payload: Default::default(),
        })
        .await
        .unwrap();
        assert_eq!(next_json(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(ClientMessage::ConnectionInit {
            payload: Default::default(),
        })
        .await
        .unwrap();
        match conn.next().await.unwrap() {
            Output::Close { code, .. } => assert_eq!(code, 4429),
            other => panic!("expected a close frame, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn init_timeout_closes_4408() {
        let mut conn =
            Connection::with_init_timeout(new_test_schema(), config(), Duration::from_secs(15));

        match conn.next().await.unwrap() {
            Output::Close { code, .. } => assert_eq!(code, 4408),
            other => panic!("expected a close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn init_hook_rejection_closes_4403() {
        let mut conn = Connection::new(
            new_test_schema(),
            |_params: serde_json::Map<String, serde_json::Value>| async {
                Err::<ConnectionConfig, _>(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "init error",
                ))
            },
        );

        conn.send(ClientMessage::ConnectionInit {
            payload: Default::default(),
        })
        .await
        .unwrap();
        match conn.next().await.unwrap() {
            Output::Close { code, message } => {
                assert_eq!(code, 4403);
                assert_eq!(message, "init error");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_cancels_exactly_one_operation() {
        let mut conn = Connection::new(new_test_schema(), config());

        conn.send(ClientMessage::ConnectionInit {
            payload: Default::default(),
        })
        .await
        .unwrap();
        assert_eq!(next_json(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(subscribe("open", "subscription { never }"))
            .await
            .unwrap();
        conn.send(ClientMessage::Complete { id: "open".into() })
            .await
            .unwrap();
        assert_eq!(
            next_json(&mut conn).await,
            json!({"type": "complete", "id": "open"}),
        );
    }

    #[tokio::test]
    async fn max_in_flight_operations_is_enforced() {
        let mut conn = Connection::new(
            new_test_schema(),
            config().with_max_in_flight_operations(1),
        );

        conn.send(ClientMessage::ConnectionInit {
            payload: Default::default(),
        })
        .await
        .unwrap();
        assert_eq!(next_json(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(subscribe("a", "subscription { never }"))
            .await
            .unwrap();
        conn.send(subscribe("b", "subscription { never }"))
            .await
            .unwrap();
        let msg = next_json(&mut conn).await;
        assert_eq!(msg["type"], "error");
        assert_eq!(msg["id"], "b");
    }

    #[tokio::test]
    async fn host_shutdown_closes_1001() {
        let mut conn = Connection::new(new_test_schema(), config());

        conn.send(ClientMessage::ConnectionInit {
            payload: Default::default(),
        })
        .await
        .unwrap();
        assert_eq!(next_json(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(subscribe("open", "subscription { never }"))
            .await
            .unwrap();
        conn.send(Input::Shutdown).await.unwrap();
        match conn.next().await.unwrap() {
            Output::Close { code, message } => {
                assert_eq!(code, 1001);
                assert_eq!(message, "Going away");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }
        assert!(conn.next().await.is_none());
    }

    #[tokio::test]
    async fn transport_protocol_violations_close_1002() {
        let mut conn = Connection::new(new_test_schema(), config());

        conn.send(Input::ProtocolError("binary frame received".into()))
            .await
            .unwrap();
        match conn.next().await.unwrap() {
            Output::Close { code, message } => {
                assert_eq!(code, 1002);
                assert_eq!(message, "binary frame received");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_panics_close_1011() {
        let mut conn = Connection::new(
            new_test_schema(),
            |_params: serde_json::Map<String, serde_json::Value>| async {
                panic!("init exploded");
                #[allow(unreachable_code)]
                Ok::<ConnectionConfig, Infallible>(ConnectionConfig::new(Services::new()))
            },
        );

        conn.send(ClientMessage::ConnectionInit {
            payload: Default::default(),
        })
        .await
        .unwrap();
        match conn.next().await.unwrap() {
            Output::Close { code, message } => {
                assert_eq!(code, 1011);
                assert_eq!(message, "Internal error");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }
        assert!(conn.next().await.is_none());
    }

    #[tokio::test]
    async fn parse_errors_are_reported_per_operation() {
        let mut conn = Connection::new(new_test_schema(), config());

        conn.send(ClientMessage::ConnectionInit {
            payload: Default::default(),
        })
        .await
        .unwrap();
        assert_eq!(next_json(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(subscribe("bad", "asd")).await.unwrap();
        let msg = next_json(&mut conn).await;
        assert_eq!(msg["type"], "error");
        assert_eq!(msg["id"], "bad");
        assert_eq!(
            next_json(&mut conn).await,
            json!({"type": "complete", "id": "bad"}),
        );
    }
}
