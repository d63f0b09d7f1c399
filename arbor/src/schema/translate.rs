//! Printing the built schema as schema definition language.
//!
//! Definitions are emitted in registration order with their directive
//! annotations inline, which is what the federation `_service { sdl }`
//! field publishes.

use std::fmt::Write as _;

use crate::{
    schema::{
        meta::{ArgumentMeta, DirectiveAnnotation, FieldMeta, MetaType},
        model::Schema,
    },
    value::{ScalarValue, Value},
};

pub(crate) fn print_sdl(schema: &Schema) -> String {
    let mut out = String::new();

    if let Some(federation) = &schema.federation {
        if !federation.link_header.is_empty() {
            out.push_str(&federation.link_header);
            out.push_str("\n\n");
        }
    }

    let hidden_types: &[String] = schema
        .federation
        .as_ref()
        .map(|f| f.hidden_types.as_slice())
        .unwrap_or_default();
    let hidden_query_fields: &[String] = schema
        .federation
        .as_ref()
        .map(|f| f.hidden_query_fields.as_slice())
        .unwrap_or_default();

    let mut blocks = Vec::new();
    for (name, meta) in &schema.types {
        if hidden_types.contains(name) {
            continue;
        }
        let hidden_fields: &[String] = if Some(name.as_str()) == schema.query_type_name() {
            hidden_query_fields
        } else {
            &[]
        };
        blocks.push(print_type(meta, hidden_fields));
    }

    out.push_str(&blocks.join("\n\n"));
    out.push('\n');
    out
}

fn print_type(meta: &MetaType, hidden_fields: &[String]) -> String {
    let mut out = String::new();
    match meta {
        MetaType::Scalar(scalar) => {
            print_description(&mut out, scalar.description.as_deref(), "");
            let _ = write!(out, "scalar {}", scalar.name);
        }
        MetaType::Enum(e) => {
            print_description(&mut out, e.description.as_deref(), "");
            let _ = writeln!(out, "enum {} {{", e.name);
            for value in &e.values {
                print_description(&mut out, value.description.as_deref(), "  ");
                let _ = writeln!(out, "  {}", value.name);
            }
            out.push('}');
        }
        MetaType::Union(u) => {
            print_description(&mut out, u.description.as_deref(), "");
            let _ = write!(out, "union {} = {}", u.name, u.of_type_names.join(" | "));
        }
        MetaType::Interface(i) => {
            print_description(&mut out, i.description.as_deref(), "");
            let _ = writeln!(out, "interface {} {{", i.name);
            for field in &i.fields {
                print_field(&mut out, field);
            }
            out.push('}');
        }
        MetaType::InputObject(io) => {
            print_description(&mut out, io.description.as_deref(), "");
            let _ = writeln!(out, "input {} {{", io.name);
            for field in &io.input_fields {
                print_description(&mut out, field.description.as_deref(), "  ");
                let _ = writeln!(out, "  {}", print_argument(field));
            }
            out.push('}');
        }
        MetaType::Object(o) => {
            print_description(&mut out, o.description.as_deref(), "");
            let _ = write!(out, "type {}", o.name);
            if !o.interface_names.is_empty() {
                let _ = write!(out, " implements {}", o.interface_names.join(" & "));
            }
            out.push_str(&print_directives(&o.directives));
            out.push_str(" {\n");
            for field in &o.fields {
                if hidden_fields.contains(&field.name) {
                    continue;
                }
                print_field(&mut out, field);
            }
            out.push('}');
        }
    }
    out
}

fn print_field(out: &mut String, field: &FieldMeta) {
    print_description(out, field.description.as_deref(), "  ");
    let args = if field.arguments.is_empty() {
        String::new()
    } else {
        format!(
            "({})",
            field
                .arguments
                .iter()
                .map(print_argument)
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    let _ = writeln!(
        out,
        "  {}{args}: {}{}",
        field.name,
        field.field_type,
        print_directives(&field.directives),
    );
}

fn print_argument(arg: &ArgumentMeta) -> String {
    match &arg.default_value {
        Some(default) => format!("{}: {} = {}", arg.name, arg.arg_type, print_value(default)),
        None => format!("{}: {}", arg.name, arg.arg_type),
    }
}

fn print_directives(annotations: &[DirectiveAnnotation]) -> String {
    let mut out = String::new();
    for ann in annotations {
        let _ = write!(out, " @{}", ann.name);
        if !ann.args.is_empty() {
            let args = ann
                .args
                .iter()
                .map(|(name, value)| format!("{name}: {}", print_value(value)))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, "({args})");
        }
    }
    out
}

fn print_description(out: &mut String, description: Option<&str>, indent: &str) {
    if let Some(description) = description {
        let _ = writeln!(out, "{indent}\"\"\"{description}\"\"\"");
    }
}

/// Prints a constant value as a GraphQL literal.
fn print_value(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Scalar(ScalarValue::Int(i)) => i.to_string(),
        Value::Scalar(ScalarValue::Float(f)) => f.to_string(),
        Value::Scalar(ScalarValue::Boolean(b)) => b.to_string(),
        Value::Scalar(ScalarValue::String(s)) => {
            format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
        }
        Value::List(items) => format!(
            "[{}]",
            items.iter().map(print_value).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(obj) => format!(
            "{{{}}}",
            obj.iter()
                .map(|(k, v)| format!("{k}: {}", print_value(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}
