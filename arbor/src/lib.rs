//! # arbor
//!
//! A runtime-first GraphQL server library: schemas are described with an
//! algebraic schema AST, registered on an immutable fluent [`SchemaBuilder`],
//! and materialized into an executable [`Schema`] served by an effect-style
//! execution engine with middleware, extensions, subscriptions, and Apollo
//! Federation support.
//!
//! ```
//! use arbor::{ast, FieldDef, SchemaBuilder, Services, Value, Variables};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = SchemaBuilder::new()
//!     .query(
//!         "hello",
//!         FieldDef::new(ast::string()).resolve(|_| async { Ok(Value::scalar("world")) }),
//!     )
//!     .build()?;
//!
//! let (data, errors) =
//!     arbor::execute("{ hello }", None, &schema, &Variables::new(), &Services::new()).await?;
//! assert!(errors.is_empty());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod ast;
pub mod config;
pub mod context;
pub mod executor;
pub mod extensions;
pub mod federation;
pub mod http;
pub mod schema;
pub mod service;
pub mod trace;
pub mod validation;
pub mod value;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use derive_more::{Display, From};
use serde::ser::{Serialize, SerializeSeq, Serializer};

pub use crate::{
    context::{make as make_slot, ContextStore, MissingContext, Slot},
    executor::{
        ExecutionError, ExecutionOutput, FieldError, FieldInfo, FieldResult, Middleware,
        MiddlewareContext, OperationInfo, OperationType, RequestContext, ResolveFn, ResolverArgs,
        ResolverEffect, ResponseStream, SourcePosition, SubscriptionStream, Variables,
    },
    extensions::Extension,
    federation::EntityDef,
    schema::{
        builder::{
            DirectiveDef, EnumDef, FieldDef, InputDef, InterfaceDef, ObjectDef, ScalarDef,
            SchemaBuilder, SchemaError, SubscriptionFieldDef, UnionDef,
        },
        meta::{DirectiveAnnotation, DirectiveLocation, TypeRef},
        model::Schema,
    },
    service::{MissingService, ServiceContainer, Services},
    trace::TraceContext,
    validation::RuleError,
    value::{Object, ScalarValue, Value},
};

/// An error that prevented query execution.
#[derive(Debug, Display, From)]
pub enum GraphQLError {
    /// The document failed to parse.
    ParseError(graphql_parser::query::ParseError),
    /// The document failed validation.
    #[display("{}", _0.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))]
    ValidationError(Vec<RuleError>),
    /// The document contains no operation.
    #[display("No operation provided")]
    NoOperationProvided,
    /// The document contains several operations and no name was given.
    #[display("Multiple operations provided")]
    MultipleOperationsProvided,
    /// The requested operation name matches no operation.
    #[display("Unknown operation name")]
    UnknownOperationName,
    /// A subscription was handed to the query execution entry point.
    #[display("Operation is a subscription")]
    IsSubscription,
    /// A non-subscription was handed to the subscription entry point.
    #[display("Operation is not a subscription")]
    NotSubscription,
    /// Subscription setup failed before any payload was published.
    #[from(ignore)]
    SubscriptionSetupError(Box<ExecutionError>),
}

impl From<RuleError> for GraphQLError {
    fn from(value: RuleError) -> Self {
        Self::ValidationError(vec![value])
    }
}

impl std::error::Error for GraphQLError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ParseError(e) => Some(e),
            _ => None,
        }
    }
}

impl Serialize for GraphQLError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::ValidationError(errors) => errors.serialize(serializer),
            Self::SubscriptionSetupError(error) => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(error)?;
                seq.end()
            }
            other => {
                #[derive(serde::Serialize)]
                struct Message {
                    message: String,
                }
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(&Message {
                    message: other.to_string(),
                })?;
                seq.end()
            }
        }
    }
}

/// Executes a query or mutation in the provided schema.
pub async fn execute(
    source: &str,
    operation_name: Option<&str>,
    schema: &Schema,
    variables: &Variables,
    services: &Services,
) -> Result<(Value, Vec<ExecutionError>), GraphQLError> {
    executor::execute_request(source, operation_name, schema, variables, services).await
}

/// Resolves a subscription operation into a stream of responses.
pub async fn resolve_into_stream(
    source: &str,
    operation_name: Option<&str>,
    schema: &Arc<Schema>,
    variables: &Variables,
    services: &Services,
) -> Result<ResponseStream, GraphQLError> {
    executor::resolve_request_stream(source, operation_name, schema, variables, services).await
}
