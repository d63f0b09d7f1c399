//! The schema AST: a runtime description of data shapes.
//!
//! Schemas are built from [`SchemaNode`]s combined with the constructor
//! functions in this module and are consumed by the type mapper and the
//! argument/result codec. Nodes are immutable and reference-counted, so the
//! same node can appear in many registrations.

mod codec;

use std::{fmt, sync::Arc};

use crate::value::{ScalarValue, Value};

pub use self::codec::{decode, encode, CodecError};

/// A shared, immutable schema node.
pub type SchemaRef = Arc<SchemaNode>;

/// A refinement predicate over decoded values.
pub type RefineFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A transformation step between the encoded and the decoded side.
pub type TransformFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// A thunk producing a schema node on demand, for recursive definitions.
pub type SuspendFn = Arc<dyn Fn() -> SchemaRef + Send + Sync>;

/// A description of a data shape.
#[derive(Clone)]
pub struct SchemaNode {
    kind: NodeKind,
    identifier: Option<String>,
    description: Option<String>,
}

/// The structural variants a [`SchemaNode`] can take.
#[derive(Clone)]
pub enum NodeKind {
    /// A UTF-8 string.
    String,
    /// A signed 32-bit integer.
    Int,
    /// A 64-bit float.
    Float,
    /// A boolean.
    Boolean,
    /// The `null` literal, usable as a union member.
    Null,
    /// A closed set of literal scalar values.
    Literal(Vec<ScalarValue>),
    /// A record with named properties.
    Struct(Vec<StructField>),
    /// A homogeneous list.
    Array(SchemaRef),
    /// One of several member shapes.
    Union(Vec<SchemaRef>),
    /// `inner` or `null`.
    NullOr(SchemaRef),
    /// `inner` or absent.
    UndefinedOr(SchemaRef),
    /// An optional value encoded as `inner | null` on the wire.
    OptionWrapped {
        /// The wire-side shape (`NullOr` of the inner shape).
        encoded: SchemaRef,
        /// The decoded inner shape.
        decoded: SchemaRef,
    },
    /// A base shape constrained by a predicate.
    Refinement {
        /// The underlying shape.
        base: SchemaRef,
        /// The predicate decoded values must satisfy.
        predicate: RefineFn,
        /// A label used in failure messages.
        label: Option<String>,
    },
    /// A nominal wrapper over a base shape.
    Brand {
        /// The underlying shape.
        base: SchemaRef,
        /// The brand tag.
        tag: String,
    },
    /// A bidirectional conversion between two shapes.
    Transformation {
        /// The wire-side shape.
        from: SchemaRef,
        /// The domain-side shape.
        to: SchemaRef,
        /// Conversion applied when decoding (`from` to `to`).
        decode: TransformFn,
        /// Conversion applied when encoding (`to` to `from`).
        encode: TransformFn,
    },
    /// A class-like declaration parameterized over underlying shapes.
    Declaration {
        /// The type parameters; the first one is the structural shape.
        type_parameters: Vec<SchemaRef>,
    },
    /// A lazily produced node, for recursive definitions.
    Suspend(SuspendFn),
}

/// A property signature of a [`NodeKind::Struct`].
#[derive(Clone)]
pub struct StructField {
    /// The property name.
    pub name: String,
    /// The property shape.
    pub schema: SchemaRef,
    /// Whether the property may be absent.
    pub optional: bool,
    /// The value used when the property is absent.
    pub default: Option<Value>,
    /// An optional documentation string.
    pub description: Option<String>,
}

impl StructField {
    /// Attaches a default value, used when the property is absent on decode.
    pub fn default_to<V: Into<Value>>(mut self, value: V) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Attaches a documentation string.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl SchemaNode {
    fn new(kind: NodeKind) -> SchemaRef {
        Arc::new(Self {
            kind,
            identifier: None,
            description: None,
        })
    }

    /// The structural variant of this node.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The explicit name annotation, or a tagged struct's synthesized tag.
    pub fn identifier(&self) -> Option<&str> {
        if let Some(id) = self.identifier.as_deref() {
            return Some(id);
        }
        if let NodeKind::Struct(fields) = &self.kind {
            for f in fields {
                if f.name == "_tag" {
                    if let NodeKind::Literal(values) = f.schema.kind() {
                        if let [ScalarValue::String(tag)] = values.as_slice() {
                            return Some(tag.as_str());
                        }
                    }
                }
            }
        }
        None
    }

    /// The documentation annotation, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The property signatures, if this node is a struct.
    pub fn struct_fields(&self) -> Option<&[StructField]> {
        match &self.kind {
            NodeKind::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// The literal value set, if this node is a literal.
    pub fn literal_values(&self) -> Option<&[ScalarValue]> {
        match &self.kind {
            NodeKind::Literal(values) => Some(values),
            _ => None,
        }
    }

    /// The refinement base, one level deep.
    pub fn refinement_base(&self) -> Option<&SchemaRef> {
        match &self.kind {
            NodeKind::Refinement { base, .. } => Some(base),
            _ => None,
        }
    }

    /// The brand base, one level deep.
    pub fn brand_base(&self) -> Option<&SchemaRef> {
        match &self.kind {
            NodeKind::Brand { base, .. } => Some(base),
            _ => None,
        }
    }

    /// The `i`-th type parameter of a declaration.
    pub fn declaration_parameter(&self, i: usize) -> Option<&SchemaRef> {
        match &self.kind {
            NodeKind::Declaration { type_parameters } => type_parameters.get(i),
            _ => None,
        }
    }

    /// The wire-side shape of a transformation.
    pub fn transformation_from(&self) -> Option<&SchemaRef> {
        match &self.kind {
            NodeKind::Transformation { from, .. } => Some(from),
            _ => None,
        }
    }

    /// The domain-side shape of a transformation.
    pub fn transformation_to(&self) -> Option<&SchemaRef> {
        match &self.kind {
            NodeKind::Transformation { to, .. } => Some(to),
            _ => None,
        }
    }

    /// The wrapped inner shape of `NullOr`/`UndefinedOr`/`OptionWrapped`.
    pub fn inner(&self) -> Option<&SchemaRef> {
        match &self.kind {
            NodeKind::NullOr(inner) | NodeKind::UndefinedOr(inner) => Some(inner),
            NodeKind::OptionWrapped { decoded, .. } => Some(decoded),
            _ => None,
        }
    }

    /// Whether a value of this shape may be `null` at its use site.
    pub fn is_nullable(&self) -> bool {
        match &self.kind {
            NodeKind::Null | NodeKind::NullOr(_) | NodeKind::OptionWrapped { .. } => true,
            NodeKind::UndefinedOr(inner) => inner.is_nullable(),
            NodeKind::Union(members) => members.iter().any(|m| m.is_nullable()),
            NodeKind::Refinement { base, .. } | NodeKind::Brand { base, .. } => base.is_nullable(),
            NodeKind::Transformation { to, .. } => to.is_nullable(),
            NodeKind::Suspend(thunk) => thunk().is_nullable(),
            _ => false,
        }
    }

    /// The sticky-integer walk: whether this shape is rooted at `Int` through
    /// any chain of refinements, brands, and transformations.
    pub fn is_integer(&self) -> bool {
        match &self.kind {
            NodeKind::Int => true,
            NodeKind::Refinement { base, .. } | NodeKind::Brand { base, .. } => base.is_integer(),
            NodeKind::Transformation { to, .. } => to.is_integer(),
            NodeKind::Suspend(thunk) => thunk().is_integer(),
            _ => false,
        }
    }
}

impl fmt::Debug for SchemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            NodeKind::String => "String",
            NodeKind::Int => "Int",
            NodeKind::Float => "Float",
            NodeKind::Boolean => "Boolean",
            NodeKind::Null => "Null",
            NodeKind::Literal(_) => "Literal",
            NodeKind::Struct(_) => "Struct",
            NodeKind::Array(_) => "Array",
            NodeKind::Union(_) => "Union",
            NodeKind::NullOr(_) => "NullOr",
            NodeKind::UndefinedOr(_) => "UndefinedOr",
            NodeKind::OptionWrapped { .. } => "OptionWrapped",
            NodeKind::Refinement { .. } => "Refinement",
            NodeKind::Brand { .. } => "Brand",
            NodeKind::Transformation { .. } => "Transformation",
            NodeKind::Declaration { .. } => "Declaration",
            NodeKind::Suspend(_) => "Suspend",
        };
        match self.identifier() {
            Some(id) => write!(f, "SchemaNode::{kind}({id})"),
            None => write!(f, "SchemaNode::{kind}"),
        }
    }
}

/// Resolves `Suspend` nodes to their produced node; all others pass through.
pub fn force(node: &SchemaRef) -> SchemaRef {
    match node.kind() {
        NodeKind::Suspend(thunk) => thunk(),
        _ => node.clone(),
    }
}

/// Returns a copy of `node` annotated with an explicit type name.
pub fn named(node: &SchemaRef, name: impl Into<String>) -> SchemaRef {
    let mut n = (**node).clone();
    n.identifier = Some(name.into());
    Arc::new(n)
}

/// Returns a copy of `node` annotated with a documentation string.
pub fn describe(node: &SchemaRef, description: impl Into<String>) -> SchemaRef {
    let mut n = (**node).clone();
    n.description = Some(description.into());
    Arc::new(n)
}

/// A UTF-8 string shape.
pub fn string() -> SchemaRef {
    SchemaNode::new(NodeKind::String)
}

/// A 32-bit integer shape.
pub fn int() -> SchemaRef {
    SchemaNode::new(NodeKind::Int)
}

/// A 64-bit float shape.
pub fn float() -> SchemaRef {
    SchemaNode::new(NodeKind::Float)
}

/// A boolean shape.
pub fn boolean() -> SchemaRef {
    SchemaNode::new(NodeKind::Boolean)
}

/// The `null` literal shape.
pub fn null() -> SchemaRef {
    SchemaNode::new(NodeKind::Null)
}

/// A closed set of literal values.
pub fn literal<I>(values: I) -> SchemaRef
where
    I: IntoIterator,
    I::Item: Into<ScalarValue>,
{
    SchemaNode::new(NodeKind::Literal(
        values.into_iter().map(Into::into).collect(),
    ))
}

/// A record shape with the given property signatures.
pub fn structure<I: IntoIterator<Item = StructField>>(fields: I) -> SchemaRef {
    SchemaNode::new(NodeKind::Struct(fields.into_iter().collect()))
}

/// A required property signature.
pub fn field(name: impl Into<String>, schema: SchemaRef) -> StructField {
    StructField {
        name: name.into(),
        schema,
        optional: false,
        default: None,
        description: None,
    }
}

/// A property signature that may be absent.
pub fn optional_field(name: impl Into<String>, schema: SchemaRef) -> StructField {
    StructField {
        optional: true,
        ..field(name, schema)
    }
}

/// A homogeneous list shape.
pub fn array(elem: SchemaRef) -> SchemaRef {
    SchemaNode::new(NodeKind::Array(elem))
}

/// A union over the given member shapes.
pub fn union<I: IntoIterator<Item = SchemaRef>>(members: I) -> SchemaRef {
    SchemaNode::new(NodeKind::Union(members.into_iter().collect()))
}

/// `inner` or `null`.
pub fn null_or(inner: SchemaRef) -> SchemaRef {
    SchemaNode::new(NodeKind::NullOr(inner))
}

/// `inner` or absent.
pub fn undefined_or(inner: SchemaRef) -> SchemaRef {
    SchemaNode::new(NodeKind::UndefinedOr(inner))
}

/// An optional value that travels as `inner | null` on the wire.
pub fn option_from_null_or(inner: SchemaRef) -> SchemaRef {
    SchemaNode::new(NodeKind::OptionWrapped {
        encoded: null_or(inner.clone()),
        decoded: inner,
    })
}

/// Constrains `base` with a predicate; `label` appears in failure messages.
pub fn refine<F>(base: SchemaRef, label: impl Into<String>, predicate: F) -> SchemaRef
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    SchemaNode::new(NodeKind::Refinement {
        base,
        predicate: Arc::new(predicate),
        label: Some(label.into()),
    })
}

/// Wraps `base` in a nominal brand.
pub fn brand(base: SchemaRef, tag: impl Into<String>) -> SchemaRef {
    SchemaNode::new(NodeKind::Brand {
        base,
        tag: tag.into(),
    })
}

/// A non-negative 32-bit integer.
pub fn non_negative_int() -> SchemaRef {
    refine(int(), "NonNegativeInt", |v| {
        v.as_int().is_some_and(|i| i >= 0)
    })
}

/// A bidirectional conversion between the wire shape and the domain shape.
pub fn transform<D, E>(from: SchemaRef, to: SchemaRef, decode: D, encode: E) -> SchemaRef
where
    D: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    E: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
{
    SchemaNode::new(NodeKind::Transformation {
        from,
        to,
        decode: Arc::new(decode),
        encode: Arc::new(encode),
    })
}

/// A class-like declaration over underlying shapes.
pub fn declaration<I: IntoIterator<Item = SchemaRef>>(type_parameters: I) -> SchemaRef {
    SchemaNode::new(NodeKind::Declaration {
        type_parameters: type_parameters.into_iter().collect(),
    })
}

/// A lazily produced shape, for recursive definitions.
pub fn suspend<F>(thunk: F) -> SchemaRef
where
    F: Fn() -> SchemaRef + Send + Sync + 'static,
{
    SchemaNode::new(NodeKind::Suspend(Arc::new(thunk)))
}
