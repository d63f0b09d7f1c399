//! Decoding and encoding of values through a schema node.
//!
//! `decode` coerces wire-side values (request arguments) into their domain
//! shape; `encode` takes resolver results back to the wire shape. Both walk
//! the node structurally and fail with a [`CodecError`] naming the offending
//! path.

use std::fmt;

use derive_more::Error;

use super::{NodeKind, SchemaNode, StructField};
use crate::value::{Object, ScalarValue, Value};

/// A decode or encode failure, with the path to the offending property.
#[derive(Clone, Debug, Error, PartialEq)]
pub struct CodecError {
    /// Property path from the root of the decoded value.
    pub path: Vec<String>,
    /// Human-readable description of the mismatch.
    pub message: String,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "at {}: {}", self.path.join("."), self.message)
        }
    }
}

impl CodecError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    fn nest(mut self, segment: &str) -> Self {
        self.path.insert(0, segment.into());
        self
    }
}

fn mismatch(expected: &str, actual: &Value) -> CodecError {
    CodecError::new(format!("expected {expected}, got {actual}"))
}

/// Decodes a wire-side value into its domain shape.
pub fn decode(node: &SchemaNode, value: &Value) -> Result<Value, CodecError> {
    match node.kind() {
        NodeKind::String => match value {
            Value::Scalar(ScalarValue::String(_)) => Ok(value.clone()),
            other => Err(mismatch("a string", other)),
        },
        NodeKind::Int => match value {
            Value::Scalar(ScalarValue::Int(_)) => Ok(value.clone()),
            other => Err(mismatch("an integer", other)),
        },
        NodeKind::Float => match value {
            Value::Scalar(ScalarValue::Float(_)) | Value::Scalar(ScalarValue::Int(_)) => {
                Ok(value.clone())
            }
            other => Err(mismatch("a number", other)),
        },
        NodeKind::Boolean => match value {
            Value::Scalar(ScalarValue::Boolean(_)) => Ok(value.clone()),
            other => Err(mismatch("a boolean", other)),
        },
        NodeKind::Null => match value {
            Value::Null => Ok(Value::Null),
            other => Err(mismatch("null", other)),
        },
        NodeKind::Literal(values) => match value.as_scalar() {
            Some(s) if values.contains(s) => Ok(value.clone()),
            _ => Err(mismatch("one of the literal values", value)),
        },
        NodeKind::Struct(fields) => decode_struct(fields, value),
        NodeKind::Array(elem) => match value {
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| decode(elem, item).map_err(|e| e.nest(&i.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            other => Err(mismatch("a list", other)),
        },
        NodeKind::Union(members) => members
            .iter()
            .find_map(|m| decode(m, value).ok())
            .ok_or_else(|| mismatch("a union member", value)),
        NodeKind::NullOr(inner) => match value {
            Value::Null => Ok(Value::Null),
            other => decode(inner, other),
        },
        NodeKind::UndefinedOr(inner) => decode(inner, value),
        NodeKind::OptionWrapped { encoded, .. } => decode(encoded, value),
        NodeKind::Refinement {
            base,
            predicate,
            label,
        } => {
            let decoded = decode(base, value)?;
            if predicate(&decoded) {
                Ok(decoded)
            } else {
                Err(CodecError::new(format!(
                    "{} constraint violated by {decoded}",
                    label.as_deref().unwrap_or("refinement"),
                )))
            }
        }
        NodeKind::Brand { base, .. } => decode(base, value),
        NodeKind::Transformation {
            from,
            decode: decode_fn,
            ..
        } => {
            let wire = decode(from, value)?;
            decode_fn(wire).map_err(CodecError::new)
        }
        NodeKind::Declaration { type_parameters } => match type_parameters.first() {
            Some(param) => decode(param, value),
            None => Ok(value.clone()),
        },
        NodeKind::Suspend(thunk) => decode(&thunk(), value),
    }
}

fn decode_struct(fields: &[StructField], value: &Value) -> Result<Value, CodecError> {
    let obj = value
        .as_object()
        .ok_or_else(|| mismatch("an object", value))?;
    let mut out = Object::with_capacity(fields.len());
    for f in fields {
        match obj.get_field_value(&f.name) {
            Some(v) => {
                let decoded = decode(&f.schema, v).map_err(|e| e.nest(&f.name))?;
                out.add_field(&f.name, decoded);
            }
            None => {
                if let Some(default) = &f.default {
                    out.add_field(&f.name, default.clone());
                } else if f.optional || matches!(f.schema.kind(), NodeKind::UndefinedOr(_)) {
                    // Absent optional properties stay absent.
                } else if f.schema.is_nullable() {
                    out.add_field(&f.name, Value::Null);
                } else {
                    return Err(CodecError::new(format!("missing property `{}`", f.name)));
                }
            }
        }
    }
    Ok(Value::Object(out))
}

/// Encodes a domain-side value back to its wire shape.
pub fn encode(node: &SchemaNode, value: &Value) -> Result<Value, CodecError> {
    match node.kind() {
        NodeKind::String
        | NodeKind::Int
        | NodeKind::Float
        | NodeKind::Boolean
        | NodeKind::Null
        | NodeKind::Literal(_) => decode(node, value),
        NodeKind::Struct(fields) => encode_struct(fields, value),
        NodeKind::Array(elem) => match value {
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| encode(elem, item).map_err(|e| e.nest(&i.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            other => Err(mismatch("a list", other)),
        },
        NodeKind::Union(members) => members
            .iter()
            .find_map(|m| encode(m, value).ok())
            .ok_or_else(|| mismatch("a union member", value)),
        NodeKind::NullOr(inner) | NodeKind::UndefinedOr(inner) => match value {
            Value::Null => Ok(Value::Null),
            other => encode(inner, other),
        },
        NodeKind::OptionWrapped { decoded, .. } => match value {
            Value::Null => Ok(Value::Null),
            other => encode(decoded, other),
        },
        NodeKind::Refinement {
            base,
            predicate,
            label,
        } => {
            if predicate(value) {
                encode(base, value)
            } else {
                Err(CodecError::new(format!(
                    "{} constraint violated by {value}",
                    label.as_deref().unwrap_or("refinement"),
                )))
            }
        }
        NodeKind::Brand { base, .. } => encode(base, value),
        NodeKind::Transformation {
            from,
            encode: encode_fn,
            ..
        } => {
            let wire = encode_fn(value.clone()).map_err(CodecError::new)?;
            encode(from, &wire)
        }
        NodeKind::Declaration { type_parameters } => match type_parameters.first() {
            Some(param) => encode(param, value),
            None => Ok(value.clone()),
        },
        NodeKind::Suspend(thunk) => encode(&thunk(), value),
    }
}

fn encode_struct(fields: &[StructField], value: &Value) -> Result<Value, CodecError> {
    let obj = value
        .as_object()
        .ok_or_else(|| mismatch("an object", value))?;
    let mut out = Object::with_capacity(fields.len());
    for f in fields {
        match obj.get_field_value(&f.name) {
            Some(v) => {
                let encoded = encode(&f.schema, v).map_err(|e| e.nest(&f.name))?;
                out.add_field(&f.name, encoded);
            }
            None if f.optional || f.schema.is_nullable() => {}
            None => {
                return Err(CodecError::new(format!("missing property `{}`", f.name)));
            }
        }
    }
    Ok(Value::Object(out))
}
