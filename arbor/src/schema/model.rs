//! The built, executable schema.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    executor::{self, ExecutionError, ResolveTypeFn, ResponseStream, Variables},
    extensions::Extension,
    schema::{
        builder::DirectiveDef,
        meta::{MetaType, ObjectMeta},
    },
    service::Services,
    value::Value,
    GraphQLError,
};

/// Federation bookkeeping the SDL printer needs.
#[derive(Clone, Default)]
pub(crate) struct FederationInfo {
    /// Types excluded from the printed SDL (`_Any`, `_Entity`, ...).
    pub hidden_types: Vec<String>,
    /// Query root fields excluded from the printed SDL.
    pub hidden_query_fields: Vec<String>,
    /// The `extend schema @link(...)` header.
    pub link_header: String,
}

/// An executable GraphQL schema: the materialized type registry, the root
/// names, runtime directives, and the extension list. Constructed once by
/// [`SchemaBuilder::build`](crate::SchemaBuilder::build); immutable and
/// cheap to share behind an [`Arc`] afterwards.
pub struct Schema {
    pub(crate) types: IndexMap<String, MetaType>,
    pub(crate) query_type_name: Option<String>,
    pub(crate) mutation_type_name: Option<String>,
    pub(crate) subscription_type_name: Option<String>,
    pub(crate) directives: IndexMap<String, DirectiveDef>,
    pub(crate) extensions: Vec<Arc<dyn Extension>>,
    pub(crate) field_spans: bool,
    pub(crate) federation: Option<FederationInfo>,
}

impl Schema {
    /// The query root type name, if the schema has query fields.
    pub fn query_type_name(&self) -> Option<&str> {
        self.query_type_name.as_deref()
    }

    /// The mutation root type name, if the schema has mutation fields.
    pub fn mutation_type_name(&self) -> Option<&str> {
        self.mutation_type_name.as_deref()
    }

    /// The subscription root type name, if the schema has subscriptions.
    pub fn subscription_type_name(&self) -> Option<&str> {
        self.subscription_type_name.as_deref()
    }

    /// Looks up a named type.
    pub fn concrete_type(&self, name: &str) -> Option<&MetaType> {
        self.types.get(name)
    }

    /// Looks up a named object type.
    pub fn object_meta(&self, name: &str) -> Option<&ObjectMeta> {
        match self.types.get(name) {
            Some(MetaType::Object(meta)) => Some(meta),
            _ => None,
        }
    }

    /// Looks up a registered directive.
    pub fn directive_by_name(&self, name: &str) -> Option<&DirectiveDef> {
        self.directives.get(name)
    }

    /// The attached execution extensions, in registration order.
    pub fn extensions(&self) -> &[Arc<dyn Extension>] {
        &self.extensions
    }

    /// Whether per-field tracing spans are enabled.
    pub fn field_spans(&self) -> bool {
        self.field_spans
    }

    /// The concrete object type names an abstract type can resolve to.
    pub fn possible_type_names(&self, abstract_name: &str) -> Vec<&str> {
        match self.types.get(abstract_name) {
            Some(MetaType::Union(u)) => u.of_type_names.iter().map(String::as_str).collect(),
            Some(MetaType::Interface(i)) => self
                .types
                .values()
                .filter_map(|t| match t {
                    MetaType::Object(o) if o.interface_names.iter().any(|n| n == &i.name) => {
                        Some(o.name.as_str())
                    }
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether `concrete` is a possible object type of `abstract_name`.
    pub fn is_possible_type_name(&self, abstract_name: &str, concrete: &str) -> bool {
        self.possible_type_names(abstract_name).contains(&concrete)
    }

    /// Resolves a value of an abstract type to its concrete type name.
    pub fn resolve_abstract(&self, abstract_name: &str, value: &Value) -> Option<String> {
        match self.types.get(abstract_name) {
            Some(MetaType::Union(u)) => (u.resolve_type)(value),
            Some(MetaType::Interface(i)) => (i.resolve_type)(value),
            _ => None,
        }
    }

    /// Executes a query or mutation.
    pub async fn execute(
        &self,
        source: &str,
        operation_name: Option<&str>,
        variables: &Variables,
        services: &Services,
    ) -> Result<(Value, Vec<ExecutionError>), GraphQLError> {
        executor::execute_request(source, operation_name, self, variables, services).await
    }

    /// Resolves a subscription operation into a response stream.
    pub async fn subscribe(
        self: &Arc<Self>,
        source: &str,
        operation_name: Option<&str>,
        variables: &Variables,
        services: &Services,
    ) -> Result<ResponseStream, GraphQLError> {
        executor::resolve_request_stream(source, operation_name, self, variables, services).await
    }

    /// Prints the schema definition language rendering of this schema.
    pub fn sdl(&self) -> String {
        crate::schema::translate::print_sdl(self)
    }
}

/// The default concrete-type resolution for unions and interfaces: read the
/// `__typename` discriminator, falling back to a `_tag` property.
pub fn default_resolve_type() -> ResolveTypeFn {
    Arc::new(|value: &Value| {
        let obj = value.as_object()?;
        obj.get_field_value("__typename")
            .or_else(|| obj.get_field_value("_tag"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    })
}
