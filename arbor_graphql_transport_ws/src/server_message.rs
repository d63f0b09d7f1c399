use arbor::{ExecutionOutput, GraphQLError};
use serde::{Serialize, Serializer};

/// The errors reported for one failed operation.
#[derive(Debug)]
pub struct ErrorPayload(pub GraphQLError);

impl Serialize for ErrorPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // `GraphQLError` serializes as an array of GraphQL errors.
        self.0.serialize(serializer)
    }
}

/// The message types the server can send.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Acknowledges a `connection_init`.
    ConnectionAck,
    /// A liveness probe.
    Ping,
    /// The response to a `Ping`, also sent as keepalive.
    Pong,
    /// One execution result of an operation.
    Next {
        /// The operation id.
        id: String,
        /// The `{data, errors}` payload.
        payload: ExecutionOutput,
    },
    /// An operation failed before producing any result.
    Error {
        /// The operation id.
        id: String,
        /// The GraphQL errors.
        payload: ErrorPayload,
    },
    /// An operation finished; no further messages will carry its id.
    Complete {
        /// The operation id.
        id: String,
    },
}
