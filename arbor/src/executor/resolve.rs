//! Selection-set execution: field collection, resolver dispatch, value
//! completion, and non-null propagation.

use std::{collections::HashMap, sync::Mutex};

use futures::future::{BoxFuture, FutureExt};
use graphql_parser::{query as q, Pos};
use indexmap::IndexMap;
use tracing::Instrument;

use super::{
    ExecutionError, FieldError, FieldResult, RequestContext, ResolverArgs, ResolverEffect,
    Variables,
};
use crate::{
    schema::{
        meta::{ArgumentMeta, FieldMeta, MetaType, TypeRef},
        model::Schema,
    },
    value::{Object, Value},
};

type Selections = [q::Selection<'static, String>];
type Fragments = HashMap<String, q::FragmentDefinition<'static, String>>;

/// Shared state for resolving one operation.
pub(crate) struct ExecCtx<'e> {
    pub schema: &'e Schema,
    pub fragments: &'e Fragments,
    pub variables: &'e Variables,
    pub ctx: RequestContext,
    pub errors: &'e Mutex<Vec<ExecutionError>>,
}

impl ExecCtx<'_> {
    fn record(&self, pos: Pos, path: &[String], error: FieldError) {
        self.errors
            .lock()
            .expect("error sink lock poisoned")
            .push(ExecutionError::new(pos.into(), path, error));
    }
}

/// Collects the fields selected on `object_type`, honoring `@skip`/
/// `@include`, fragment spreads, and inline fragments. Fields with the same
/// response key are merged in selection order.
pub(crate) fn collect_fields(
    schema: &Schema,
    fragments: &Fragments,
    variables: &Variables,
    object_type: &str,
    selections: &Selections,
) -> IndexMap<String, Vec<q::Field<'static, String>>> {
    let mut collected = IndexMap::new();
    collect_fields_into(
        schema,
        fragments,
        variables,
        object_type,
        selections,
        &mut collected,
    );
    collected
}

fn collect_fields_into(
    schema: &Schema,
    fragments: &Fragments,
    variables: &Variables,
    object_type: &str,
    selections: &Selections,
    out: &mut IndexMap<String, Vec<q::Field<'static, String>>>,
) {
    for selection in selections {
        match selection {
            q::Selection::Field(field) => {
                if !should_include(&field.directives, variables) {
                    continue;
                }
                let key = field.alias.clone().unwrap_or_else(|| field.name.clone());
                out.entry(key).or_default().push(field.clone());
            }
            q::Selection::FragmentSpread(spread) => {
                if !should_include(&spread.directives, variables) {
                    continue;
                }
                if let Some(fragment) = fragments.get(&spread.fragment_name) {
                    let q::TypeCondition::On(cond) = &fragment.type_condition;
                    if fragment_applies(schema, object_type, cond) {
                        collect_fields_into(
                            schema,
                            fragments,
                            variables,
                            object_type,
                            &fragment.selection_set.items,
                            out,
                        );
                    }
                }
            }
            q::Selection::InlineFragment(inline) => {
                if !should_include(&inline.directives, variables) {
                    continue;
                }
                let applies = match &inline.type_condition {
                    Some(q::TypeCondition::On(cond)) => fragment_applies(schema, object_type, cond),
                    None => true,
                };
                if applies {
                    collect_fields_into(
                        schema,
                        fragments,
                        variables,
                        object_type,
                        &inline.selection_set.items,
                        out,
                    );
                }
            }
        }
    }
}

fn fragment_applies(schema: &Schema, object_type: &str, condition: &str) -> bool {
    condition == object_type || schema.is_possible_type_name(condition, object_type)
}

fn should_include(directives: &[q::Directive<'static, String>], variables: &Variables) -> bool {
    for directive in directives {
        let condition = directive
            .arguments
            .iter()
            .find(|(name, _)| name == "if")
            .map(|(_, v)| convert_input(v, variables).as_boolean().unwrap_or(false));
        match (directive.name.as_str(), condition) {
            ("skip", Some(true)) | ("include", Some(false)) => return false,
            _ => {}
        }
    }
    true
}

/// Converts a document input value into a runtime [`Value`], substituting
/// variables.
pub(crate) fn convert_input(value: &q::Value<'static, String>, variables: &Variables) -> Value {
    match value {
        q::Value::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        q::Value::Int(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
            Some(i) => Value::scalar(i),
            None => Value::scalar(n.as_i64().map(|i| i as f64).unwrap_or(f64::NAN)),
        },
        q::Value::Float(f) => Value::scalar(*f),
        q::Value::String(s) => Value::scalar(s.clone()),
        q::Value::Boolean(b) => Value::scalar(*b),
        q::Value::Null => Value::Null,
        q::Value::Enum(name) => Value::scalar(name.clone()),
        q::Value::List(items) => {
            Value::List(items.iter().map(|i| convert_input(i, variables)).collect())
        }
        q::Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), convert_input(v, variables)))
                .collect(),
        ),
    }
}

/// Builds the argument object for one field invocation: provided arguments
/// win, argument defaults fill the gaps.
pub(crate) fn build_arguments(
    metas: &[ArgumentMeta],
    provided: &[(String, q::Value<'static, String>)],
    variables: &Variables,
) -> FieldResult<Value> {
    let mut args = Object::with_capacity(metas.len());
    for meta in metas {
        match provided.iter().find(|(name, _)| name == &meta.name) {
            Some((_, value)) => {
                let converted = convert_input(value, variables);
                match (&meta.default_value, converted) {
                    (Some(default), Value::Null) => {
                        args.add_field(&meta.name, default.clone());
                    }
                    (_, converted) => {
                        args.add_field(&meta.name, converted);
                    }
                }
            }
            None => {
                if let Some(default) = &meta.default_value {
                    args.add_field(&meta.name, default.clone());
                }
            }
        }
    }
    Ok(Value::Object(args))
}

/// Executes a selection set against a concrete object type, resolving each
/// collected field in order. `Err` means a non-null field failed and the
/// null must propagate to the nearest nullable ancestor.
pub(crate) fn execute_selection_set<'a, 'e: 'a>(
    exec: &'a ExecCtx<'e>,
    object_type: &'a str,
    parent: &'a Value,
    selections: &'a Selections,
    path: &'a [String],
) -> BoxFuture<'a, Result<Value, ()>> {
    async move {
        let collected = collect_fields(
            exec.schema,
            exec.fragments,
            exec.variables,
            object_type,
            selections,
        );
        let mut object = Object::with_capacity(collected.len());
        for (response_key, instances) in collected {
            let mut field_path = path.to_vec();
            field_path.push(response_key.clone());

            if instances[0].name == "__typename" {
                object.add_field(response_key, Value::scalar(object_type));
                continue;
            }

            let field_type = exec
                .schema
                .object_meta(object_type)
                .and_then(|o| o.field(&instances[0].name))
                .map(|f| f.field_type.clone());
            match resolve_field(exec, object_type, parent, &instances, &field_path).await {
                Ok(value) => {
                    object.add_field(response_key, value);
                }
                Err(()) => {
                    if matches!(field_type, Some(TypeRef::NonNull(_))) {
                        return Err(());
                    }
                    object.add_field(response_key, Value::Null);
                }
            }
        }
        Ok(Value::Object(object))
    }
    .boxed()
}

/// Resolves one (merged) field: dispatches the wrapped resolver, then
/// completes the produced value against the field's type.
async fn resolve_field(
    exec: &ExecCtx<'_>,
    object_type: &str,
    parent: &Value,
    instances: &[q::Field<'static, String>],
    path: &[String],
) -> Result<Value, ()> {
    let field = &instances[0];
    let meta = match exec
        .schema
        .object_meta(object_type)
        .and_then(|o| o.field(&field.name))
    {
        Some(meta) => meta,
        None => {
            exec.record(
                field.position,
                path,
                FieldError::from(format!(
                    "Unknown field `{}` on type `{object_type}`",
                    field.name
                )),
            );
            return Err(());
        }
    };

    let effect = match dispatch_resolver(exec, meta, parent, field, path) {
        Ok(effect) => effect,
        Err(()) => return Err(()),
    };
    let resolved = if exec.schema.field_spans() {
        let span = tracing::trace_span!(
            "graphql.field",
            parent_type = object_type,
            field_name = field.name.as_str(),
        );
        effect.instrument(span).await
    } else {
        effect.await
    };

    match resolved {
        Ok(value) => {
            let sub_selections: Vec<q::Selection<'static, String>> = instances
                .iter()
                .flat_map(|f| f.selection_set.items.iter().cloned())
                .collect();
            complete_value(exec, &meta.field_type, value, &sub_selections, path).await
        }
        Err(error) => {
            exec.record(field.position, path, error);
            Err(())
        }
    }
}

fn dispatch_resolver(
    exec: &ExecCtx<'_>,
    meta: &FieldMeta,
    parent: &Value,
    field: &q::Field<'static, String>,
    path: &[String],
) -> Result<ResolverEffect, ()> {
    let args = match build_arguments(&meta.arguments, &field.arguments, exec.variables) {
        Ok(args) => args,
        Err(error) => {
            exec.record(field.position, path, error);
            return Err(());
        }
    };
    match &meta.resolver {
        Some(resolver) => Ok(resolver(ResolverArgs {
            parent: parent.clone(),
            args,
            ctx: exec.ctx.clone(),
        })),
        None => {
            // Plain property read on the parent value.
            let value = parent
                .as_object()
                .and_then(|o| o.get_field_value(&field.name))
                .cloned()
                .unwrap_or(Value::Null);
            Ok(futures::future::ready(Ok(value)).boxed())
        }
    }
}

/// Completes a resolved value against its declared type, recursing into
/// selection sets for composite types.
pub(crate) fn complete_value<'a, 'e: 'a>(
    exec: &'a ExecCtx<'e>,
    ty: &'a TypeRef,
    value: Value,
    selections: &'a Selections,
    path: &'a [String],
) -> BoxFuture<'a, Result<Value, ()>> {
    async move {
        match ty {
            TypeRef::NonNull(inner) => {
                if value.is_null() {
                    exec.record(
                        Pos::default(),
                        path,
                        FieldError::from("Cannot return null for non-nullable field"),
                    );
                    return Err(());
                }
                complete_value(exec, inner, value, selections, path).await
            }
            _ if value.is_null() => Ok(Value::Null),
            TypeRef::List(inner) => {
                let items = match value {
                    Value::List(items) => items,
                    other => {
                        exec.record(
                            Pos::default(),
                            path,
                            FieldError::from(format!("Expected a list, got {other}")),
                        );
                        return Err(());
                    }
                };
                let mut completed = Vec::with_capacity(items.len());
                for (idx, item) in items.into_iter().enumerate() {
                    let mut item_path = path.to_vec();
                    item_path.push(idx.to_string());
                    match complete_value(exec, inner, item, selections, &item_path).await {
                        Ok(v) => completed.push(v),
                        Err(()) if matches!(**inner, TypeRef::NonNull(_)) => return Err(()),
                        Err(()) => completed.push(Value::Null),
                    }
                }
                Ok(Value::List(completed))
            }
            TypeRef::Named(name) => {
                complete_named(exec, name, value, selections, path).await
            }
        }
    }
    .boxed()
}

async fn complete_named(
    exec: &ExecCtx<'_>,
    name: &str,
    value: Value,
    selections: &Selections,
    path: &[String],
) -> Result<Value, ()> {
    match exec.schema.concrete_type(name) {
        None | Some(MetaType::Scalar(_)) | Some(MetaType::Enum(_)) => Ok(value),
        Some(MetaType::Object(_)) => {
            execute_selection_set(exec, name, &value, selections, path).await
        }
        Some(MetaType::Union(_)) | Some(MetaType::Interface(_)) => {
            let concrete = match exec.schema.resolve_abstract(name, &value) {
                Some(concrete) if exec.schema.is_possible_type_name(name, &concrete) => concrete,
                _ => {
                    exec.record(
                        Pos::default(),
                        path,
                        FieldError::from(format!(
                            "Could not determine the concrete type of abstract type `{name}`"
                        )),
                    );
                    return Err(());
                }
            };
            execute_selection_set(exec, &concrete, &value, selections, path).await
        }
        Some(MetaType::InputObject(_)) => {
            exec.record(
                Pos::default(),
                path,
                FieldError::from(format!("Type `{name}` is not an output type")),
            );
            Err(())
        }
    }
}
