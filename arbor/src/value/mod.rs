mod object;

use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

pub use self::object::Object;

/// A primitive leaf value.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    /// A signed 32-bit integer, the GraphQL `Int`.
    Int(i32),
    /// A 64-bit float, the GraphQL `Float`.
    Float(f64),
    /// A string, also carrying GraphQL enum values on the wire.
    String(String),
    /// A boolean.
    Boolean(bool),
}

impl ScalarValue {
    /// Views this scalar as an integer, if it is one.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Views this scalar as a float, promoting integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(f64::from(*i)),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Views this scalar as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Views this scalar as a boolean, if it is one.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// Serializable value returned from query and field execution.
///
/// Used by the execution engine and resolvers to build up the response
/// structure. Lists and objects do not carry location information since they
/// are produced by resolving fields rather than by parsing a source query.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// The absence of a value.
    Null,
    /// A leaf value.
    Scalar(ScalarValue),
    /// A list of values.
    List(Vec<Value>),
    /// An insertion-ordered object.
    Object(Object),
}

impl Value {
    // CONSTRUCTORS

    /// Constructs a null value.
    pub fn null() -> Self {
        Self::Null
    }

    /// Constructs a list value.
    pub fn list(l: Vec<Self>) -> Self {
        Self::List(l)
    }

    /// Constructs an object value.
    pub fn object(o: Object) -> Self {
        Self::Object(o)
    }

    /// Constructs a scalar value.
    pub fn scalar<T: Into<ScalarValue>>(s: T) -> Self {
        Self::Scalar(s.into())
    }

    // DISCRIMINATORS

    /// Whether this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Views the underlying scalar value, if present.
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Views the underlying integer, if present.
    pub fn as_int(&self) -> Option<i32> {
        self.as_scalar().and_then(ScalarValue::as_int)
    }

    /// Views the underlying float, if present, promoting integers.
    pub fn as_float(&self) -> Option<f64> {
        self.as_scalar().and_then(ScalarValue::as_float)
    }

    /// Views the underlying string slice, if present.
    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(ScalarValue::as_str)
    }

    /// Views the underlying boolean, if present.
    pub fn as_boolean(&self) -> Option<bool> {
        self.as_scalar().and_then(ScalarValue::as_boolean)
    }

    /// Views the underlying object value, if present.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Converts this value into an [`Object`], if it is one.
    pub fn into_object(self) -> Option<Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Views the underlying list value, if present.
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Scalar(s) => write!(f, "{s}"),
            Self::List(list) => {
                write!(f, "[")?;
                for (idx, item) in list.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Object(obj) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in obj.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{key}\": {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Scalar(ScalarValue::Int(i)) => serializer.serialize_i32(*i),
            Self::Scalar(ScalarValue::Float(f)) => serializer.serialize_f64(*f),
            Self::Scalar(ScalarValue::String(s)) => serializer.serialize_str(s),
            Self::Scalar(ScalarValue::Boolean(b)) => serializer.serialize_bool(*b),
            Self::List(l) => {
                let mut seq = serializer.serialize_seq(Some(l.len()))?;
                for v in l {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Self::Object(o) => {
                let mut map = serializer.serialize_map(Some(o.field_count()))?;
                for (k, v) in o.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl From<i32> for ScalarValue {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for ScalarValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::scalar(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::scalar(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::scalar(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::scalar(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::scalar(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::scalar(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                    Self::scalar(i)
                } else {
                    Self::scalar(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::scalar(s),
            serde_json::Value::Array(l) => Self::List(l.into_iter().map(Into::into).collect()),
            serde_json::Value::Object(o) => {
                Self::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Scalar(ScalarValue::Int(i)) => Self::from(i),
            Value::Scalar(ScalarValue::Float(f)) => {
                serde_json::Number::from_f64(f).map_or(Self::Null, Self::Number)
            }
            Value::Scalar(ScalarValue::String(s)) => Self::String(s),
            Value::Scalar(ScalarValue::Boolean(b)) => Self::Bool(b),
            Value::List(l) => Self::Array(l.into_iter().map(Into::into).collect()),
            Value::Object(o) => Self::Object(
                o.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Value;

    #[test]
    fn display_scalars() {
        assert_eq!("null", format!("{}", Value::Null));
        assert_eq!("123", format!("{}", Value::scalar(123)));
        assert_eq!("123.456", format!("{}", Value::scalar(123.456)));
        assert_eq!("\"foo\"", format!("{}", Value::scalar("foo")));
        assert_eq!("false", format!("{}", Value::scalar(false)));
    }

    #[test]
    fn display_list() {
        let v = Value::from(json!([1, null, "foo"]));
        assert_eq!("[1, null, \"foo\"]", format!("{v}"));
    }

    #[test]
    fn display_object() {
        let v = Value::from(json!({"int": 1, "null": null, "string": "foo"}));
        assert_eq!(r#"{"int": 1, "null": null, "string": "foo"}"#, format!("{v}"));
    }

    #[test]
    fn json_round_trip() {
        let json = json!({"a": [1, 2.5, true], "b": {"c": null}});
        let v = Value::from(json.clone());
        assert_eq!(json, serde_json::Value::from(v.clone()));
        assert_eq!(json, serde_json::to_value(&v).unwrap());
    }

    #[test]
    fn object_merge_on_add() {
        let mut obj = Value::from(json!({"a": {"x": 1}})).into_object().unwrap();
        let more = Value::from(json!({"x": 1, "y": 2})).into_object().unwrap();
        obj.add_field("a", Value::Object(more));
        assert_eq!(
            Value::Object(obj),
            Value::from(json!({"a": {"x": 1, "y": 2}})),
        );
    }
}
