//! Utilities for building HTTP endpoints in a library-agnostic manner.

use serde::{
    ser::{SerializeMap, Serializer},
    Deserialize, Serialize,
};

use crate::{
    executor::{ExecutionError, Variables},
    schema::model::Schema,
    service::Services,
    value::Value,
    GraphQLError,
};

/// The expected structure of the decoded JSON document for either POST or
/// GET requests.
///
/// For POST, deserialize the incoming JSON body directly into this struct.
/// For GET, parse the query string and use [`GraphQLRequest::from_get_params`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GraphQLRequest {
    query: String,
    #[serde(rename = "operationName", default, skip_serializing_if = "Option::is_none")]
    operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    variables: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extensions: Option<serde_json::Value>,
}

impl GraphQLRequest {
    /// Constructs a new request from parts.
    pub fn new(
        query: String,
        operation_name: Option<String>,
        variables: Option<serde_json::Value>,
    ) -> Self {
        Self {
            query,
            operation_name,
            variables,
            extensions: None,
        }
    }

    /// Constructs a request from URL-decoded GET parameters; `variables` is
    /// a JSON document in string form.
    pub fn from_get_params(
        query: String,
        operation_name: Option<String>,
        variables: Option<&str>,
    ) -> Result<Self, serde_json::Error> {
        let variables = variables.map(serde_json::from_str).transpose()?;
        Ok(Self {
            query,
            operation_name,
            variables,
            extensions: None,
        })
    }

    /// The document source.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The requested operation name, if any.
    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    /// The variable values as the engine consumes them.
    pub fn variables(&self) -> Variables {
        self.variables
            .as_ref()
            .and_then(|v| v.as_object().cloned())
            .map(|obj| {
                obj.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Executes this request against the schema.
    pub async fn execute(&self, schema: &Schema, services: &Services) -> GraphQLResponse {
        GraphQLResponse(
            schema
                .execute(
                    &self.query,
                    self.operation_name(),
                    &self.variables(),
                    services,
                )
                .await,
        )
    }
}

/// Simple wrapper around the result of executing a query.
///
/// Serializes to the response JSON; use [`GraphQLResponse::is_ok`] to decide
/// between a 200 and a 400 status code.
pub struct GraphQLResponse(pub Result<(Value, Vec<ExecutionError>), GraphQLError>);

impl GraphQLResponse {
    /// Wraps an execution outcome.
    pub fn from_result(result: Result<(Value, Vec<ExecutionError>), GraphQLError>) -> Self {
        Self(result)
    }

    /// A response carrying a single request-level error.
    pub fn error(error: GraphQLError) -> Self {
        Self(Err(error))
    }

    /// Whether the request reached execution. Field errors may still be
    /// present in an `is_ok` response; that is GraphQL's partial-result
    /// contract.
    pub fn is_ok(&self) -> bool {
        self.0.is_ok()
    }
}

impl Serialize for GraphQLResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            Ok((data, errors)) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("data", data)?;
                if !errors.is_empty() {
                    map.serialize_entry("errors", errors)?;
                }
                map.end()
            }
            Err(error) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("errors", error)?;
                map.end()
            }
        }
    }
}

/// Wraps a [`GraphQLRequest`], allowing an array of requests to be handled
/// in one HTTP call.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GraphQLBatchRequest {
    /// A single request.
    Single(GraphQLRequest),
    /// Multiple requests, answered in order.
    Batch(Vec<GraphQLRequest>),
}

impl GraphQLBatchRequest {
    /// Executes all contained requests.
    pub async fn execute(&self, schema: &Schema, services: &Services) -> GraphQLBatchResponse {
        match self {
            Self::Single(request) => {
                GraphQLBatchResponse::Single(request.execute(schema, services).await)
            }
            Self::Batch(requests) => {
                let mut responses = Vec::with_capacity(requests.len());
                for request in requests {
                    responses.push(request.execute(schema, services).await);
                }
                GraphQLBatchResponse::Batch(responses)
            }
        }
    }
}

/// The response to a [`GraphQLBatchRequest`].
#[derive(Serialize)]
#[serde(untagged)]
pub enum GraphQLBatchResponse {
    /// The answer to a single request.
    Single(GraphQLResponse),
    /// The answers to a batch, in request order.
    Batch(Vec<GraphQLResponse>),
}

impl GraphQLBatchResponse {
    /// Whether every contained response reached execution.
    pub fn is_ok(&self) -> bool {
        match self {
            Self::Single(response) => response.is_ok(),
            Self::Batch(responses) => responses.iter().all(GraphQLResponse::is_ok),
        }
    }
}
