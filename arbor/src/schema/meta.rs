//! Types used to describe the built GraphQL schema.

use std::fmt;

use crate::{
    executor::{ResolveFn, ResolveTypeFn, SubscribeFn},
    value::Value,
};

/// A name-based reference to a type, with list/non-null wrapping.
///
/// References are resolved against the schema's type registry at execution
/// time, which is what lets mutually recursive types be assembled without
/// topological ordering.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeRef {
    /// A nullable named type.
    Named(String),
    /// A non-null wrapper.
    NonNull(Box<TypeRef>),
    /// A list wrapper.
    List(Box<TypeRef>),
}

impl TypeRef {
    /// A nullable reference to `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Wraps a reference as non-null (idempotent).
    pub fn non_null(inner: Self) -> Self {
        match inner {
            Self::NonNull(_) => inner,
            other => Self::NonNull(Box::new(other)),
        }
    }

    /// Wraps a reference in a list.
    pub fn list(inner: Self) -> Self {
        Self::List(Box::new(inner))
    }

    /// The innermost named type.
    pub fn innermost_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::NonNull(inner) | Self::List(inner) => inner.innermost_name(),
        }
    }

    /// Strips a top-level non-null wrapper, if present.
    pub fn nullable(self) -> Self {
        match self {
            Self::NonNull(inner) => *inner,
            other => other,
        }
    }

    /// Whether the top level is non-null.
    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::NonNull(inner) => write!(f, "{inner}!"),
            Self::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// Where a directive may appear.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DirectiveLocation {
    /// On a query operation.
    Query,
    /// On a mutation operation.
    Mutation,
    /// On a subscription operation.
    Subscription,
    /// On a field selection.
    Field,
    /// On a field definition.
    FieldDefinition,
    /// On an object type definition.
    Object,
    /// On an interface type definition.
    Interface,
    /// On an enum type definition.
    Enum,
    /// On an input object type definition.
    InputObject,
    /// On a schema definition.
    Schema,
}

impl fmt::Display for DirectiveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "QUERY",
            Self::Mutation => "MUTATION",
            Self::Subscription => "SUBSCRIPTION",
            Self::Field => "FIELD",
            Self::FieldDefinition => "FIELD_DEFINITION",
            Self::Object => "OBJECT",
            Self::Interface => "INTERFACE",
            Self::Enum => "ENUM",
            Self::InputObject => "INPUT_OBJECT",
            Self::Schema => "SCHEMA",
        })
    }
}

/// A directive applied at a type or field definition, with constant
/// arguments. These surface in the printed SDL.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectiveAnnotation {
    /// The directive name, without the `@`.
    pub name: String,
    /// The constant arguments.
    pub args: Vec<(String, Value)>,
}

impl DirectiveAnnotation {
    /// An annotation without arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Adds a constant argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }
}

/// Argument (and input object field) metadata.
#[derive(Clone)]
pub struct ArgumentMeta {
    /// The argument name.
    pub name: String,
    /// An optional documentation string.
    pub description: Option<String>,
    /// The argument's input type.
    pub arg_type: TypeRef,
    /// The value used when the argument is not provided.
    pub default_value: Option<Value>,
}

/// Field metadata, carrying the wrapped resolver for output fields.
#[derive(Clone)]
pub struct FieldMeta {
    /// The field name.
    pub name: String,
    /// An optional documentation string.
    pub description: Option<String>,
    /// The field's output type.
    pub field_type: TypeRef,
    /// The declared arguments.
    pub arguments: Vec<ArgumentMeta>,
    /// Definition-site directive annotations.
    pub directives: Vec<DirectiveAnnotation>,
    /// The wrapped resolver; `None` means a plain property read.
    pub resolver: Option<ResolveFn>,
    /// The wrapped subscription source, on subscription root fields only.
    pub subscription: Option<SubscribeFn>,
}

/// Scalar type metadata.
#[derive(Clone)]
pub struct ScalarMeta {
    /// The type name.
    pub name: String,
    /// An optional documentation string.
    pub description: Option<String>,
}

/// Object type metadata.
#[derive(Clone)]
pub struct ObjectMeta {
    /// The type name.
    pub name: String,
    /// An optional documentation string.
    pub description: Option<String>,
    /// The fields, in declaration order (colocated fields appended).
    pub fields: Vec<FieldMeta>,
    /// Names of the interfaces this object implements.
    pub interface_names: Vec<String>,
    /// Definition-site directive annotations.
    pub directives: Vec<DirectiveAnnotation>,
}

impl ObjectMeta {
    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Interface type metadata.
#[derive(Clone)]
pub struct InterfaceMeta {
    /// The type name.
    pub name: String,
    /// An optional documentation string.
    pub description: Option<String>,
    /// The fields every implementer must carry.
    pub fields: Vec<FieldMeta>,
    /// Resolves a value to a concrete implementer name.
    pub resolve_type: ResolveTypeFn,
}

/// Union type metadata.
#[derive(Clone)]
pub struct UnionMeta {
    /// The type name.
    pub name: String,
    /// An optional documentation string.
    pub description: Option<String>,
    /// The member object type names.
    pub of_type_names: Vec<String>,
    /// Resolves a value to a concrete member name.
    pub resolve_type: ResolveTypeFn,
}

/// One declared enum value.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumValueMeta {
    /// The value name as it appears in documents and responses.
    pub name: String,
    /// An optional documentation string.
    pub description: Option<String>,
}

/// Enum type metadata.
#[derive(Clone)]
pub struct EnumMeta {
    /// The type name.
    pub name: String,
    /// An optional documentation string.
    pub description: Option<String>,
    /// The declared values.
    pub values: Vec<EnumValueMeta>,
}

/// Input object type metadata.
#[derive(Clone)]
pub struct InputObjectMeta {
    /// The type name.
    pub name: String,
    /// An optional documentation string.
    pub description: Option<String>,
    /// The input fields.
    pub input_fields: Vec<ArgumentMeta>,
}

/// Metadata for any named type in the schema.
#[derive(Clone)]
pub enum MetaType {
    /// A scalar.
    Scalar(ScalarMeta),
    /// An object.
    Object(ObjectMeta),
    /// An interface.
    Interface(InterfaceMeta),
    /// A union.
    Union(UnionMeta),
    /// An enum.
    Enum(EnumMeta),
    /// An input object.
    InputObject(InputObjectMeta),
}

impl MetaType {
    /// The type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(m) => &m.name,
            Self::Object(m) => &m.name,
            Self::Interface(m) => &m.name,
            Self::Union(m) => &m.name,
            Self::Enum(m) => &m.name,
            Self::InputObject(m) => &m.name,
        }
    }

    /// Whether values of this type are leaves of the response tree.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_))
    }

    /// Whether this type is an interface or union.
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union(_))
    }

    /// Whether this type may carry a selection set.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Interface(_) | Self::Union(_))
    }

    /// Whether this type may appear in input positions.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_) | Self::InputObject(_))
    }
}

/// The names of the built-in scalar types.
pub const BUILTIN_SCALARS: &[&str] = &["String", "Int", "Float", "Boolean", "ID"];

/// Whether `name` names a built-in scalar.
pub fn is_builtin_scalar(name: &str) -> bool {
    BUILTIN_SCALARS.contains(&name)
}
