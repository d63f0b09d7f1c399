//! The request execution engine: parse, validate, and execute phases, field
//! dispatch through wrapped resolvers, and subscription streams.

pub(crate) mod middleware;
pub(crate) mod resolve;

use std::{
    collections::HashMap,
    fmt::Display,
    sync::{Arc, Mutex},
};

use futures::{
    future::BoxFuture,
    stream::{BoxStream, StreamExt},
};
use graphql_parser::{query as q, Pos};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::Instrument;

use crate::{
    ast::CodecError,
    context::ContextStore,
    schema::model::Schema,
    service::Services,
    trace::TraceContext,
    validation::{self, RuleError},
    value::{Object, Value},
    GraphQLError,
};

pub use self::middleware::{FieldInfo, Middleware, MiddlewareContext, MiddlewareFn};

/// The variable values accompanying a request.
pub type Variables = HashMap<String, Value>;

/// A parsed executable document.
pub(crate) type Document = q::Document<'static, String>;

/// Error type for failures during field resolution.
///
/// Field errors carry a human-readable message and an optional `extensions`
/// value included in the response. Any `Display` type converts into one, so
/// resolver code chains errors with `?`.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldError {
    message: String,
    extensions: Value,
}

impl<T: Display> From<T> for FieldError {
    fn from(e: T) -> Self {
        Self {
            message: e.to_string(),
            extensions: Value::Null,
        }
    }
}

impl FieldError {
    /// Constructs a new [`FieldError`] with additional `extensions` data.
    #[must_use]
    pub fn new<T: Display>(e: T, extensions: Value) -> Self {
        Self {
            message: e.to_string(),
            extensions,
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The additional error data, [`Value::Null`] if none.
    pub fn extensions(&self) -> &Value {
        &self.extensions
    }

    pub(crate) fn invalid_arguments(err: CodecError) -> Self {
        Self {
            message: format!("Invalid arguments: {err}"),
            extensions: Value::Null,
        }
    }
}

/// The result of resolving a single field.
pub type FieldResult<T = Value> = Result<T, FieldError>;

/// A boxed, sendable resolver future: the engine's unit of effect.
pub type ResolverEffect = BoxFuture<'static, FieldResult>;

/// A field resolver: receives the parent value, decoded arguments, and the
/// request context, and produces an effect.
pub type ResolveFn = Arc<dyn Fn(ResolverArgs) -> ResolverEffect + Send + Sync>;

/// A stream of subscription payloads.
pub type SubscriptionStream = BoxStream<'static, FieldResult>;

/// A subscription source: produces the payload stream for one subscribe.
pub type SubscribeFn =
    Arc<dyn Fn(ResolverArgs) -> BoxFuture<'static, FieldResult<SubscriptionStream>> + Send + Sync>;

/// Resolves a value of an abstract type to a concrete object type name.
pub type ResolveTypeFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// The inputs handed to a resolver invocation.
pub struct ResolverArgs {
    /// The parent value ([`Value::Null`] at the roots).
    pub parent: Value,
    /// The decoded argument object.
    pub args: Value,
    /// The request context.
    pub ctx: RequestContext,
}

/// Request-scoped state threaded through every resolver: the service
/// container, the resolver-context slot store, and the extracted trace
/// context. Cheap to clone; all clones share the same request state.
#[derive(Clone)]
pub struct RequestContext {
    services: Arc<crate::service::ServiceContainer>,
    store: ContextStore,
}

impl RequestContext {
    pub(crate) fn new(services: crate::service::ServiceContainer) -> Self {
        Self {
            services: Arc::new(services),
            store: ContextStore::new(),
        }
    }

    /// Demands a service from the per-request container.
    pub fn service<T: Send + Sync + 'static>(&self) -> FieldResult<Arc<T>> {
        self.services.get::<T>().map_err(Into::into)
    }

    /// The request's resolver-context slot store.
    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// The trace context extracted from the request headers, if the host
    /// provided one through the service container.
    pub fn trace(&self) -> TraceContext {
        self.services
            .get::<TraceContext>()
            .map(|t| (*t).clone())
            .unwrap_or_default()
    }
}

/// A source position inside the executable document.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub struct SourcePosition {
    /// One-based line.
    pub line: usize,
    /// One-based column.
    pub column: usize,
}

impl From<Pos> for SourcePosition {
    fn from(p: Pos) -> Self {
        Self {
            line: p.line,
            column: p.column,
        }
    }
}

/// Error type for failures during query execution.
///
/// Carries the source position of the failing field and the response path
/// leading to it.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionError {
    location: SourcePosition,
    path: Vec<String>,
    error: FieldError,
}

impl ExecutionError {
    /// Constructs an execution error at the given position and path.
    pub fn new(location: SourcePosition, path: &[String], error: FieldError) -> Self {
        Self {
            location,
            path: path.to_vec(),
            error,
        }
    }

    /// Constructs an execution error at the beginning of the query.
    pub fn at_origin(error: FieldError) -> Self {
        Self {
            location: SourcePosition::default(),
            path: Vec::new(),
            error,
        }
    }

    /// The underlying field error.
    pub fn error(&self) -> &FieldError {
        &self.error
    }

    /// The response path to the failing field.
    pub fn path(&self) -> &[String] {
        &self.path
    }
}

impl Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.error.message())
        } else {
            write!(f, "{} (at {})", self.error.message(), self.path.join("."))
        }
    }
}

impl Serialize for ExecutionError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("message", self.error.message())?;
        if self.location != SourcePosition::default() {
            map.serialize_entry("locations", &[self.location])?;
        }
        if !self.path.is_empty() {
            map.serialize_entry("path", &self.path)?;
        }
        if !self.error.extensions().is_null() {
            map.serialize_entry("extensions", self.error.extensions())?;
        }
        map.end()
    }
}

/// The kind of an executable operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationType {
    /// A read.
    Query,
    /// A write.
    Mutation,
    /// A long-lived stream of reads.
    Subscription,
}

impl Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        })
    }
}

/// Summary of the operation being executed, handed to extensions.
#[derive(Clone, Debug)]
pub struct OperationInfo {
    /// The operation name, if the document provided one.
    pub name: Option<String>,
    /// The operation kind.
    pub operation_type: OperationType,
}

/// One response of a subscription stream.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionOutput {
    /// The data payload.
    pub data: Value,
    /// Field errors collected while resolving this payload.
    pub errors: Vec<ExecutionError>,
}

impl Serialize for ExecutionOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("data", &self.data)?;
        if !self.errors.is_empty() {
            map.serialize_entry("errors", &self.errors)?;
        }
        map.end()
    }
}

/// A stream of subscription responses.
pub type ResponseStream = BoxStream<'static, ExecutionOutput>;

/// A normalized view over the different operation definition shapes.
pub(crate) struct OperationView<'a> {
    pub op_type: OperationType,
    pub name: Option<&'a str>,
    pub variable_definitions: &'a [q::VariableDefinition<'static, String>],
    pub selection_set: &'a q::SelectionSet<'static, String>,
}

pub(crate) fn get_operation<'a>(
    document: &'a Document,
    operation_name: Option<&str>,
) -> Result<OperationView<'a>, GraphQLError> {
    let mut operations = document.definitions.iter().filter_map(|d| match d {
        q::Definition::Operation(op) => Some(operation_view(op)),
        q::Definition::Fragment(_) => None,
    });

    match operation_name {
        Some(name) => operations
            .find(|op| op.name == Some(name))
            .ok_or(GraphQLError::UnknownOperationName),
        None => {
            let first = operations.next().ok_or(GraphQLError::NoOperationProvided)?;
            if operations.next().is_some() {
                return Err(GraphQLError::MultipleOperationsProvided);
            }
            Ok(first)
        }
    }
}

fn operation_view<'a>(op: &'a q::OperationDefinition<'static, String>) -> OperationView<'a> {
    const NO_VARIABLES: &[q::VariableDefinition<'static, String>] = &[];
    match op {
        q::OperationDefinition::SelectionSet(set) => OperationView {
            op_type: OperationType::Query,
            name: None,
            variable_definitions: NO_VARIABLES,
            selection_set: set,
        },
        q::OperationDefinition::Query(query) => OperationView {
            op_type: OperationType::Query,
            name: query.name.as_deref(),
            variable_definitions: &query.variable_definitions,
            selection_set: &query.selection_set,
        },
        q::OperationDefinition::Mutation(m) => OperationView {
            op_type: OperationType::Mutation,
            name: m.name.as_deref(),
            variable_definitions: &m.variable_definitions,
            selection_set: &m.selection_set,
        },
        q::OperationDefinition::Subscription(s) => OperationView {
            op_type: OperationType::Subscription,
            name: s.name.as_deref(),
            variable_definitions: &s.variable_definitions,
            selection_set: &s.selection_set,
        },
    }
}

pub(crate) fn fragment_map(document: &Document) -> HashMap<String, q::FragmentDefinition<'static, String>> {
    document
        .definitions
        .iter()
        .filter_map(|d| match d {
            q::Definition::Fragment(f) => Some((f.name.clone(), f.clone())),
            q::Definition::Operation(_) => None,
        })
        .collect()
}

/// Parses and validates `source`, returning the document, the selected
/// operation's coerced variables, and the request context — the shared
/// front half of the query and subscription pipelines.
async fn prepare(
    source: &str,
    operation_name: Option<&str>,
    schema: &Schema,
    variables: &Variables,
    services: &Services,
) -> Result<(Document, Variables, RequestContext), GraphQLError> {
    let ctx = RequestContext::new(services.build());
    let extensions = schema.extensions();

    for ext in extensions {
        ext.on_parse(source, &ctx).await;
    }
    let parsed = {
        let span = tracing::info_span!("graphql.parse");
        let _enter = span.enter();
        q::parse_query::<String>(source).map(q::Document::into_static)
    };
    for ext in extensions.iter().rev() {
        ext.on_parse_end(parsed.is_ok(), &ctx).await;
    }
    let document = parsed.map_err(GraphQLError::ParseError)?;

    for ext in extensions {
        ext.on_validate(&ctx).await;
    }
    let errors = {
        let span = tracing::info_span!("graphql.validate");
        let _enter = span.enter();
        validation::validate_document(schema, &document)
    };
    for ext in extensions.iter().rev() {
        ext.on_validate_end(errors.len(), &ctx).await;
    }
    if !errors.is_empty() {
        return Err(GraphQLError::ValidationError(errors));
    }

    let operation = get_operation(&document, operation_name)?;
    let coerced = validation::coerce_variable_values(schema, &operation, variables)
        .map_err(GraphQLError::ValidationError)?;

    Ok((document, coerced, ctx))
}

/// Executes a query or mutation against the schema.
pub(crate) async fn execute_request(
    source: &str,
    operation_name: Option<&str>,
    schema: &Schema,
    variables: &Variables,
    services: &Services,
) -> Result<(Value, Vec<ExecutionError>), GraphQLError> {
    let (document, coerced, ctx) = prepare(source, operation_name, schema, variables, services).await?;
    let operation = get_operation(&document, operation_name)?;

    let root_type_name = match operation.op_type {
        OperationType::Query => schema.query_type_name().map(str::to_owned),
        OperationType::Mutation => schema.mutation_type_name().map(str::to_owned),
        OperationType::Subscription => return Err(GraphQLError::IsSubscription),
    }
    .ok_or_else(|| {
        GraphQLError::ValidationError(vec![RuleError::new(
            &format!("Schema does not support {} operations", operation.op_type),
            &[],
        )])
    })?;

    let info = OperationInfo {
        name: operation.name.map(Into::into),
        operation_type: operation.op_type,
    };
    let extensions = schema.extensions();
    for ext in extensions {
        ext.on_execute_start(&info, &ctx).await;
    }

    let trace = ctx.trace();
    let span = tracing::info_span!(
        "graphql.execute",
        operation_name = info.name.as_deref().unwrap_or("anonymous"),
        operation_type = %info.operation_type,
        trace_id = trace.trace_id_hex().as_deref().unwrap_or(""),
        parent_span_id = trace.span_id_hex().as_deref().unwrap_or(""),
    );

    let fragments = fragment_map(&document);
    let errors = Mutex::new(Vec::new());
    let root = Value::Null;
    let data = {
        let exec = resolve::ExecCtx {
            schema,
            fragments: &fragments,
            variables: &coerced,
            ctx: ctx.clone(),
            errors: &errors,
        };
        resolve::execute_selection_set(
            &exec,
            &root_type_name,
            &root,
            &operation.selection_set.items,
            &[],
        )
        .instrument(span)
        .await
        .unwrap_or(Value::Null)
    };

    let mut errors = errors.into_inner().unwrap_or_default();
    errors.sort_by(|a, b| a.path().cmp(b.path()));

    for ext in extensions.iter().rev() {
        ext.on_execute_end(errors.len(), &ctx).await;
    }

    Ok((data, errors))
}

/// Resolves a subscription operation into a response stream.
pub(crate) async fn resolve_request_stream(
    source: &str,
    operation_name: Option<&str>,
    schema: &Arc<Schema>,
    variables: &Variables,
    services: &Services,
) -> Result<ResponseStream, GraphQLError> {
    let (document, coerced, ctx) = prepare(source, operation_name, schema, variables, services).await?;
    let operation = get_operation(&document, operation_name)?;
    if operation.op_type != OperationType::Subscription {
        return Err(GraphQLError::NotSubscription);
    }
    let sub_type_name = schema.subscription_type_name().ok_or_else(|| {
        GraphQLError::ValidationError(vec![RuleError::new(
            "Schema does not support subscription operations",
            &[],
        )])
    })?;

    let fragments = fragment_map(&document);
    let fields = resolve::collect_fields(
        schema,
        &fragments,
        &coerced,
        sub_type_name,
        &operation.selection_set.items,
    );
    if fields.len() != 1 {
        return Err(GraphQLError::ValidationError(vec![RuleError::new(
            "Subscription operations must select exactly one root field",
            &[],
        )]));
    }
    let (response_key, instances) = fields.into_iter().next().expect("one subscription field");
    let field = instances[0].clone();

    let meta = schema
        .object_meta(sub_type_name)
        .and_then(|o| o.field(&field.name))
        .ok_or_else(|| {
            GraphQLError::ValidationError(vec![RuleError::new(
                &format!("Unknown subscription field `{}`", field.name),
                &[SourcePosition::from(field.position)],
            )])
        })?;
    let subscribe = meta.subscription.clone().ok_or_else(|| {
        GraphQLError::ValidationError(vec![RuleError::new(
            &format!("Field `{}` is not subscribable", field.name),
            &[SourcePosition::from(field.position)],
        )])
    })?;
    let field_type = meta.field_type.clone();

    let args = resolve::build_arguments(&meta.arguments, &field.arguments, &coerced)
        .map_err(|e| subscription_setup_error(&response_key, field.position, e))?;

    let info = OperationInfo {
        name: operation.name.map(Into::into),
        operation_type: OperationType::Subscription,
    };
    let extensions = schema.extensions();
    for ext in extensions {
        ext.on_execute_start(&info, &ctx).await;
    }

    let stream = subscribe(ResolverArgs {
        parent: Value::Null,
        args,
        ctx: ctx.clone(),
    })
    .await
    .map_err(|e| subscription_setup_error(&response_key, field.position, e))?;

    let exec = Arc::new(SubscriptionExec {
        schema: schema.clone(),
        fragments,
        variables: coerced,
        ctx,
        field,
        field_type,
        response_key,
    });

    Ok(stream
        .then(move |item| {
            let exec = exec.clone();
            async move { exec.resolve_item(item).await }
        })
        .boxed())
}

fn subscription_setup_error(key: &str, pos: Pos, error: FieldError) -> GraphQLError {
    GraphQLError::SubscriptionSetupError(Box::new(ExecutionError::new(
        pos.into(),
        &[key.to_owned()],
        error,
    )))
}

/// The owned state one subscription needs to re-execute its selection set
/// for every published payload.
struct SubscriptionExec {
    schema: Arc<Schema>,
    fragments: HashMap<String, q::FragmentDefinition<'static, String>>,
    variables: Variables,
    ctx: RequestContext,
    field: q::Field<'static, String>,
    field_type: crate::schema::meta::TypeRef,
    response_key: String,
}

impl SubscriptionExec {
    async fn resolve_item(&self, item: FieldResult) -> ExecutionOutput {
        let path = vec![self.response_key.clone()];
        let errors = Mutex::new(Vec::new());
        let data = match item {
            Ok(payload) => {
                let exec = resolve::ExecCtx {
                    schema: &self.schema,
                    fragments: &self.fragments,
                    variables: &self.variables,
                    ctx: self.ctx.clone(),
                    errors: &errors,
                };
                resolve::complete_value(
                    &exec,
                    &self.field_type,
                    payload,
                    &self.field.selection_set.items,
                    &path,
                )
                .await
                .unwrap_or(Value::Null)
            }
            Err(e) => {
                errors
                    .lock()
                    .expect("error sink lock poisoned")
                    .push(ExecutionError::new(self.field.position.into(), &path, e));
                Value::Null
            }
        };
        let mut object = Object::with_capacity(1);
        object.add_field(self.response_key.clone(), data);
        ExecutionOutput {
            data: Value::Object(object),
            errors: errors.into_inner().unwrap_or_default(),
        }
    }
}
