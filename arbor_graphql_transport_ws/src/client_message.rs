use serde::Deserialize;

use crate::util::default_for_null;

/// The payload of a client's `subscribe` message. Triggers execution of a
/// query, mutation, or subscription.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    /// The document body.
    pub query: String,

    /// The optional variables.
    #[serde(default, deserialize_with = "default_for_null")]
    pub variables: serde_json::Map<String, serde_json::Value>,

    /// The optional operation name (required if the document contains
    /// multiple operations).
    pub operation_name: Option<String>,

    /// The optional extension data.
    #[serde(default, deserialize_with = "default_for_null")]
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

/// The message types clients can send.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Sent by the client upon connecting, often carrying authentication
    /// parameters.
    ConnectionInit {
        /// Optional parameters of any type sent from the client.
        #[serde(default, deserialize_with = "default_for_null")]
        payload: serde_json::Map<String, serde_json::Value>,
    },
    /// Used for detecting failed connections and latency probing.
    Ping {
        /// Optional details about the ping.
        #[serde(default, deserialize_with = "default_for_null")]
        payload: serde_json::Map<String, serde_json::Value>,
    },
    /// The response to a `Pong` message.
    Pong {
        /// Optional details about the pong.
        #[serde(default, deserialize_with = "default_for_null")]
        payload: serde_json::Map<String, serde_json::Value>,
    },
    /// Requests an operation specified in the message payload.
    Subscribe {
        /// The id of the operation; unique for the connection's lifetime.
        id: String,
        /// The query, variables, and operation name.
        payload: SubscribePayload,
    },
    /// Indicates that the client has stopped listening.
    Complete {
        /// The id of the operation to stop.
        id: String,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deserializes_connection_init() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(
                r#"{"type": "connection_init", "payload": {"foo": "bar"}}"#
            )
            .unwrap(),
            ClientMessage::ConnectionInit {
                payload: serde_json::from_str(r#"{"foo": "bar"}"#).unwrap(),
            },
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type": "connection_init"}"#).unwrap(),
            ClientMessage::ConnectionInit {
                payload: Default::default(),
            },
        );
    }

    #[test]
    fn deserializes_subscribe() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(
                r#"{"type": "subscribe", "id": "foo", "payload": {
                    "query": "query MyQuery { __typename }",
                    "operationName": "MyQuery"
                }}"#
            )
            .unwrap(),
            ClientMessage::Subscribe {
                id: "foo".into(),
                payload: SubscribePayload {
                    query: "query MyQuery { __typename }".into(),
                    operation_name: Some("MyQuery".into()),
                    ..Default::default()
                },
            },
        );
    }

    #[test]
    fn deserializes_null_variables() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(
                r#"{"type": "subscribe", "id": "x", "payload": {"query": "{ a }", "variables": null}}"#
            )
            .unwrap(),
            ClientMessage::Subscribe {
                id: "x".into(),
                payload: SubscribePayload {
                    query: "{ a }".into(),
                    ..Default::default()
                },
            },
        );
    }

    #[test]
    fn deserializes_complete() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type": "complete", "id": "foo"}"#).unwrap(),
            ClientMessage::Complete { id: "foo".into() },
        );
    }
}
