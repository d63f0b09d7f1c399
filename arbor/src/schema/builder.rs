//! The immutable, fluent schema builder.
//!
//! Every operation takes `&self` and returns a new builder with the
//! registration added; registries are shared structurally, so builders are
//! cheap to fork and safe to reuse. All name collisions and referential
//! integrity problems surface at [`SchemaBuilder::build`].

use std::sync::Arc;

use derive_more::{Display, Error};
use futures::future::FutureExt;
use indexmap::IndexMap;

use crate::{
    ast::SchemaRef,
    executor::{
        middleware::{DirectiveApplyFn, Middleware},
        FieldResult, ResolveFn, ResolveTypeFn, ResolverArgs, ResolverEffect, SubscriptionStream,
    },
    extensions::Extension,
    federation::EntityDef,
    schema::{
        assemble,
        meta::{DirectiveAnnotation, DirectiveLocation},
        model::Schema,
    },
};

/// A fatal problem found while materializing the schema.
#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum SchemaError {
    /// Two registrations claim the same type name.
    #[display("duplicate type name `{name}`")]
    DuplicateTypeName {
        /// The contested name.
        name: String,
    },
    /// An anonymous struct was used where a named type is required.
    #[display("a struct used as a named type carries no name annotation")]
    MissingTypeName,
    /// A registration references a shape that cannot back it.
    #[display("registration `{name}` requires a struct schema")]
    NotAnObjectSchema {
        /// The offending registration.
        name: String,
    },
    /// An object implements an interface that is not registered.
    #[display("object `{object}` implements unknown interface `{interface}`")]
    UnknownInterface {
        /// The implementing object.
        object: String,
        /// The missing interface.
        interface: String,
    },
    /// An object is missing a field its interface requires.
    #[display("object `{object}` is missing field `{field}` of interface `{interface}`")]
    MissingInterfaceField {
        /// The implementing object.
        object: String,
        /// The interface declaring the field.
        interface: String,
        /// The missing field.
        field: String,
    },
    /// A union member is not a registered object type.
    #[display("union `{union}` references unknown member `{member}`")]
    UnknownUnionMember {
        /// The union.
        union: String,
        /// The missing member.
        member: String,
    },
    /// A colocated field targets a type that is not registered.
    #[display("cannot attach field to unknown type `{type_name}`")]
    UnknownFieldTarget {
        /// The missing type.
        type_name: String,
    },
    /// A field registration has no resolver.
    #[display("field `{field}` has no resolver")]
    MissingResolver {
        /// The field.
        field: String,
    },
    /// A subscription registration has no subscribe function.
    #[display("subscription field `{field}` has no subscribe function")]
    MissingSubscribe {
        /// The field.
        field: String,
    },
    /// The built schema would have no query root.
    #[display("schema has no query fields")]
    EmptyQueryRoot,
    /// An entity `@key` references a field its struct does not have.
    #[display("entity `{entity}` key references unknown field `{field}`")]
    UnknownKeyField {
        /// The entity.
        entity: String,
        /// The missing key field.
        field: String,
    },
    /// A shape appears in input position that has no GraphQL input
    /// rendering.
    #[display("invalid input type: {message}")]
    InvalidInputType {
        /// What went wrong.
        message: String,
    },
    /// A directive annotation's arguments do not decode against the
    /// directive's declared argument schema.
    #[display("invalid arguments for directive `@{directive}`: {message}")]
    InvalidDirectiveArgs {
        /// The directive.
        directive: String,
        /// The decode failure.
        message: String,
    },
}

/// Registration of an object type backed by a struct schema.
#[derive(Clone)]
pub struct ObjectDef {
    pub(crate) name: String,
    pub(crate) schema: SchemaRef,
    pub(crate) implements: Vec<String>,
    pub(crate) directives: Vec<DirectiveAnnotation>,
    pub(crate) description: Option<String>,
}

impl ObjectDef {
    /// Registers `schema` as the object type `name`.
    pub fn new(name: impl Into<String>, schema: SchemaRef) -> Self {
        Self {
            name: name.into(),
            schema,
            implements: Vec::new(),
            directives: Vec::new(),
            description: None,
        }
    }

    /// Declares that this object implements the named interface.
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    /// Annotates the type definition with a directive.
    pub fn directive(mut self, annotation: DirectiveAnnotation) -> Self {
        self.directives.push(annotation);
        self
    }

    /// Attaches a documentation string.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Registration of an interface type.
#[derive(Clone)]
pub struct InterfaceDef {
    pub(crate) name: String,
    pub(crate) schema: SchemaRef,
    pub(crate) resolve_type: Option<ResolveTypeFn>,
    pub(crate) description: Option<String>,
}

impl InterfaceDef {
    /// Registers `schema`'s fields as the interface `name`.
    pub fn new(name: impl Into<String>, schema: SchemaRef) -> Self {
        Self {
            name: name.into(),
            schema,
            resolve_type: None,
            description: None,
        }
    }

    /// Overrides the default discriminator-based concrete type resolution.
    pub fn resolve_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&crate::value::Value) -> Option<String> + Send + Sync + 'static,
    {
        self.resolve_type = Some(Arc::new(f));
        self
    }

    /// Attaches a documentation string.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Registration of an enum type.
#[derive(Clone)]
pub struct EnumDef {
    pub(crate) name: String,
    pub(crate) values: Vec<String>,
    pub(crate) description: Option<String>,
}

impl EnumDef {
    /// Registers an enum named `name` with the given values.
    pub fn new<I>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
            description: None,
        }
    }

    /// Attaches a documentation string.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Registration of a union over registered object types.
#[derive(Clone)]
pub struct UnionDef {
    pub(crate) name: String,
    pub(crate) members: Vec<String>,
    pub(crate) resolve_type: Option<ResolveTypeFn>,
    pub(crate) description: Option<String>,
}

impl UnionDef {
    /// Registers a union named `name` over the named member types.
    pub fn new<I>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
            resolve_type: None,
            description: None,
        }
    }

    /// Overrides the default discriminator-based concrete type resolution.
    pub fn resolve_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&crate::value::Value) -> Option<String> + Send + Sync + 'static,
    {
        self.resolve_type = Some(Arc::new(f));
        self
    }

    /// Attaches a documentation string.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Registration of an input object type.
#[derive(Clone)]
pub struct InputDef {
    pub(crate) name: String,
    pub(crate) schema: SchemaRef,
    pub(crate) description: Option<String>,
}

impl InputDef {
    /// Registers `schema` as the input object type `name`.
    pub fn new(name: impl Into<String>, schema: SchemaRef) -> Self {
        Self {
            name: name.into(),
            schema,
            description: None,
        }
    }

    /// Attaches a documentation string.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Registration of a custom scalar type. Values of custom scalars pass
/// through the engine untouched.
#[derive(Clone)]
pub struct ScalarDef {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
}

impl ScalarDef {
    /// Registers a pass-through scalar named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    /// Attaches a documentation string.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Registration of a directive. A directive carrying a `transform` also acts
/// as middleware on every field annotated with it.
#[derive(Clone)]
pub struct DirectiveDef {
    pub(crate) name: String,
    pub(crate) locations: Vec<DirectiveLocation>,
    pub(crate) args_schema: Option<SchemaRef>,
    pub(crate) apply: Option<DirectiveApplyFn>,
    pub(crate) description: Option<String>,
}

impl DirectiveDef {
    /// Registers a directive usable at the given locations.
    pub fn new<I>(name: impl Into<String>, locations: I) -> Self
    where
        I: IntoIterator<Item = DirectiveLocation>,
    {
        Self {
            name: name.into(),
            locations: locations.into_iter().collect(),
            args_schema: None,
            apply: None,
            description: None,
        }
    }

    /// Declares the directive's argument shape.
    pub fn args(mut self, schema: SchemaRef) -> Self {
        self.args_schema = Some(schema);
        self
    }

    /// Makes the directive act as middleware: `f` receives the directive's
    /// decoded arguments and the remaining resolver effect.
    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(crate::value::Value, ResolverEffect) -> ResolverEffect + Send + Sync + 'static,
    {
        self.apply = Some(Arc::new(f));
        self
    }

    /// Attaches a documentation string.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Registration of a resolvable field: a root query/mutation field, or a
/// computed field colocated with (or attached later to) an object type.
#[derive(Clone)]
pub struct FieldDef {
    pub(crate) return_type: Option<SchemaRef>,
    pub(crate) raw_type: Option<crate::schema::meta::TypeRef>,
    pub(crate) raw_arguments: Vec<crate::schema::meta::ArgumentMeta>,
    pub(crate) args_schema: Option<SchemaRef>,
    pub(crate) directives: Vec<DirectiveAnnotation>,
    pub(crate) resolver: Option<ResolveFn>,
    pub(crate) description: Option<String>,
}

impl FieldDef {
    /// Declares a field returning `return_type`.
    pub fn new(return_type: SchemaRef) -> Self {
        Self {
            return_type: Some(return_type),
            raw_type: None,
            raw_arguments: Vec::new(),
            args_schema: None,
            directives: Vec::new(),
            resolver: None,
            description: None,
        }
    }

    /// Declares a field against an already-registered GraphQL type, with
    /// hand-built argument metadata. Results and arguments bypass the
    /// schema codec. Used for the federation machinery fields.
    pub(crate) fn raw(
        ty: crate::schema::meta::TypeRef,
        arguments: Vec<crate::schema::meta::ArgumentMeta>,
    ) -> Self {
        Self {
            return_type: None,
            raw_type: Some(ty),
            raw_arguments: arguments,
            args_schema: None,
            directives: Vec::new(),
            resolver: None,
            description: None,
        }
    }

    /// Declares the argument struct for this field.
    pub fn args(mut self, schema: SchemaRef) -> Self {
        self.args_schema = Some(schema);
        self
    }

    /// Annotates the field definition with a directive.
    pub fn directive(mut self, annotation: DirectiveAnnotation) -> Self {
        self.directives.push(annotation);
        self
    }

    /// Sets the resolver effect for this field.
    pub fn resolve<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ResolverArgs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = FieldResult> + Send + 'static,
    {
        self.resolver = Some(Arc::new(move |args| f(args).boxed()));
        self
    }

    /// Attaches a documentation string.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

type RawSubscribeFn = Arc<
    dyn Fn(ResolverArgs) -> futures::future::BoxFuture<'static, FieldResult<SubscriptionStream>>
        + Send
        + Sync,
>;

/// Registration of a subscription root field.
#[derive(Clone)]
pub struct SubscriptionFieldDef {
    pub(crate) return_type: SchemaRef,
    pub(crate) args_schema: Option<SchemaRef>,
    pub(crate) directives: Vec<DirectiveAnnotation>,
    pub(crate) subscribe: Option<RawSubscribeFn>,
    pub(crate) item_resolver: Option<ResolveFn>,
    pub(crate) description: Option<String>,
}

impl SubscriptionFieldDef {
    /// Declares a subscription field whose items have the given shape.
    pub fn new(return_type: SchemaRef) -> Self {
        Self {
            return_type,
            args_schema: None,
            directives: Vec::new(),
            subscribe: None,
            item_resolver: None,
            description: None,
        }
    }

    /// Declares the argument struct for this field.
    pub fn args(mut self, schema: SchemaRef) -> Self {
        self.args_schema = Some(schema);
        self
    }

    /// Annotates the field definition with a directive.
    pub fn directive(mut self, annotation: DirectiveAnnotation) -> Self {
        self.directives.push(annotation);
        self
    }

    /// Sets the subscription source: an effect producing the payload stream.
    pub fn subscribe<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ResolverArgs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = FieldResult<SubscriptionStream>> + Send + 'static,
    {
        self.subscribe = Some(Arc::new(move |args| f(args).boxed()));
        self
    }

    /// Sets the optional per-item transformer applied to every published
    /// payload before it is re-executed against the selection set.
    pub fn resolve<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ResolverArgs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = FieldResult> + Send + 'static,
    {
        self.item_resolver = Some(Arc::new(move |args| f(args).boxed()));
        self
    }

    /// Attaches a documentation string.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The immutable registry of schema constituents.
#[derive(Clone, Default)]
pub struct SchemaBuilder {
    pub(crate) objects: IndexMap<String, ObjectDef>,
    pub(crate) interfaces: IndexMap<String, InterfaceDef>,
    pub(crate) enums: IndexMap<String, EnumDef>,
    pub(crate) unions: IndexMap<String, UnionDef>,
    pub(crate) inputs: IndexMap<String, InputDef>,
    pub(crate) scalars: IndexMap<String, ScalarDef>,
    pub(crate) directives: IndexMap<String, DirectiveDef>,
    pub(crate) queries: IndexMap<String, FieldDef>,
    pub(crate) mutations: IndexMap<String, FieldDef>,
    pub(crate) subscriptions: IndexMap<String, SubscriptionFieldDef>,
    pub(crate) extra_fields: IndexMap<String, IndexMap<String, FieldDef>>,
    pub(crate) extensions: Vec<Arc<dyn Extension>>,
    pub(crate) middleware: Vec<Middleware>,
    pub(crate) entities: IndexMap<String, EntityDef>,
    pub(crate) field_spans: bool,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an object type.
    pub fn object(&self, def: ObjectDef) -> Self {
        let mut next = self.clone();
        next.objects.insert(def.name.clone(), def);
        next
    }

    /// Registers an interface type.
    pub fn interface(&self, def: InterfaceDef) -> Self {
        let mut next = self.clone();
        next.interfaces.insert(def.name.clone(), def);
        next
    }

    /// Registers an enum type.
    pub fn enum_type(&self, def: EnumDef) -> Self {
        let mut next = self.clone();
        next.enums.insert(def.name.clone(), def);
        next
    }

    /// Registers a union type.
    pub fn union_type(&self, def: UnionDef) -> Self {
        let mut next = self.clone();
        next.unions.insert(def.name.clone(), def);
        next
    }

    /// Registers an input object type.
    pub fn input_object(&self, def: InputDef) -> Self {
        let mut next = self.clone();
        next.inputs.insert(def.name.clone(), def);
        next
    }

    /// Registers a custom scalar type.
    pub fn scalar(&self, def: ScalarDef) -> Self {
        let mut next = self.clone();
        next.scalars.insert(def.name.clone(), def);
        next
    }

    /// Registers a directive.
    pub fn directive(&self, def: DirectiveDef) -> Self {
        let mut next = self.clone();
        next.directives.insert(def.name.clone(), def);
        next
    }

    /// Registers a root query field.
    pub fn query(&self, name: impl Into<String>, def: FieldDef) -> Self {
        let mut next = self.clone();
        next.queries.insert(name.into(), def);
        next
    }

    /// Registers a root mutation field.
    pub fn mutation(&self, name: impl Into<String>, def: FieldDef) -> Self {
        let mut next = self.clone();
        next.mutations.insert(name.into(), def);
        next
    }

    /// Registers a subscription root field.
    pub fn subscription(&self, name: impl Into<String>, def: SubscriptionFieldDef) -> Self {
        let mut next = self.clone();
        next.subscriptions.insert(name.into(), def);
        next
    }

    /// Attaches a computed field to a registered object type. The merged
    /// field set is visible on the built schema; a colocated field shadows a
    /// struct-derived field of the same name.
    pub fn field(
        &self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        def: FieldDef,
    ) -> Self {
        let mut next = self.clone();
        next.extra_fields
            .entry(type_name.into())
            .or_default()
            .insert(field_name.into(), def);
        next
    }

    /// Attaches an execution-phase extension.
    pub fn extension(&self, extension: impl Extension + 'static) -> Self {
        let mut next = self.clone();
        next.extensions.push(Arc::new(extension));
        next
    }

    /// Attaches a global middleware, applied in registration order.
    pub fn middleware(&self, middleware: Middleware) -> Self {
        let mut next = self.clone();
        next.middleware.push(middleware);
        next
    }

    /// Enables a `graphql.field` tracing span around every resolver.
    pub fn with_field_spans(&self) -> Self {
        let mut next = self.clone();
        next.field_spans = true;
        next
    }

    /// Materializes the executable schema.
    pub fn build(&self) -> Result<Schema, SchemaError> {
        assemble::build(self, None)
    }
}
