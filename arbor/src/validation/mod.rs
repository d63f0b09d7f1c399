//! Document validation, run after parsing and before execution.
//!
//! A condensed rule set covering the failure classes the engine must never
//! reach execution with: unknown fields and arguments, selections on leaf
//! types, missing selections on composite types, unknown or cyclic
//! fragments, and undeclared or mistyped variables.

use std::collections::{HashMap, HashSet};

use graphql_parser::query as q;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{
    executor::{Document, OperationView, SourcePosition, Variables},
    schema::{
        meta::{is_builtin_scalar, ArgumentMeta, FieldMeta, MetaType, TypeRef},
        model::Schema,
    },
    value::Value,
};

/// A single validation failure with its source locations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuleError {
    locations: Vec<SourcePosition>,
    message: String,
}

impl RuleError {
    /// Constructs a new error at the given locations.
    pub fn new(message: &str, locations: &[SourcePosition]) -> Self {
        Self {
            message: message.into(),
            locations: locations.to_vec(),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The source locations the failure points at.
    pub fn locations(&self) -> &[SourcePosition] {
        &self.locations
    }
}

impl std::fmt::Display for RuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        for loc in &self.locations {
            write!(f, " At {}:{}", loc.line, loc.column)?;
        }
        Ok(())
    }
}

impl Serialize for RuleError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("message", &self.message)?;
        map.serialize_entry("locations", &self.locations)?;
        map.end()
    }
}

/// Validates an executable document against the schema.
pub(crate) fn validate_document(schema: &Schema, document: &Document) -> Vec<RuleError> {
    let fragments: HashMap<&str, &q::FragmentDefinition<'static, String>> = document
        .definitions
        .iter()
        .filter_map(|d| match d {
            q::Definition::Fragment(f) => Some((f.name.as_str(), f)),
            q::Definition::Operation(_) => None,
        })
        .collect();

    let mut validator = DocumentValidator {
        schema,
        fragments,
        errors: Vec::new(),
        declared_variables: HashSet::new(),
        fragment_stack: Vec::new(),
    };

    for definition in &document.definitions {
        match definition {
            q::Definition::Operation(op) => validator.validate_operation(op),
            q::Definition::Fragment(fragment) => {
                let q::TypeCondition::On(cond) = &fragment.type_condition;
                let known_composite = validator
                    .schema
                    .concrete_type(cond)
                    .is_some_and(MetaType::is_composite);
                if !known_composite {
                    validator.errors.push(RuleError::new(
                        &format!("Unknown composite type `{cond}` in fragment `{}`", fragment.name),
                        &[fragment.position.into()],
                    ));
                }
            }
        }
    }

    validator.errors
}

struct DocumentValidator<'a> {
    schema: &'a Schema,
    fragments: HashMap<&'a str, &'a q::FragmentDefinition<'static, String>>,
    errors: Vec<RuleError>,
    declared_variables: HashSet<String>,
    fragment_stack: Vec<String>,
}

impl DocumentValidator<'_> {
    fn validate_operation(&mut self, op: &q::OperationDefinition<'static, String>) {
        let (root, selection_set, variable_definitions): (_, _, &[_]) = match op {
            q::OperationDefinition::SelectionSet(set) => {
                (self.schema.query_type_name(), set, &[])
            }
            q::OperationDefinition::Query(query) => (
                self.schema.query_type_name(),
                &query.selection_set,
                &query.variable_definitions,
            ),
            q::OperationDefinition::Mutation(m) => (
                self.schema.mutation_type_name(),
                &m.selection_set,
                &m.variable_definitions,
            ),
            q::OperationDefinition::Subscription(s) => (
                self.schema.subscription_type_name(),
                &s.selection_set,
                &s.variable_definitions,
            ),
        };
        let Some(root) = root else {
            self.errors.push(RuleError::new(
                "Schema does not support this operation type",
                &[selection_set.span.0.into()],
            ));
            return;
        };
        self.declared_variables = variable_definitions
            .iter()
            .map(|v| v.name.clone())
            .collect();
        self.validate_selection_set(root, &selection_set.items);
    }

    fn validate_selection_set(
        &mut self,
        type_name: &str,
        selections: &[q::Selection<'static, String>],
    ) {
        for selection in selections {
            match selection {
                q::Selection::Field(field) => self.validate_field(type_name, field),
                q::Selection::FragmentSpread(spread) => {
                    self.check_variables_in_directives(&spread.directives);
                    let Some(fragment) = self.fragments.get(spread.fragment_name.as_str()).copied()
                    else {
                        self.errors.push(RuleError::new(
                            &format!("Unknown fragment `{}`", spread.fragment_name),
                            &[spread.position.into()],
                        ));
                        continue;
                    };
                    if self.fragment_stack.contains(&spread.fragment_name) {
                        self.errors.push(RuleError::new(
                            &format!(
                                "Cannot spread fragment `{}` within itself",
                                spread.fragment_name
                            ),
                            &[spread.position.into()],
                        ));
                        continue;
                    }
                    let q::TypeCondition::On(cond) = &fragment.type_condition;
                    if self.schema.concrete_type(cond).is_some() {
                        self.fragment_stack.push(spread.fragment_name.clone());
                        self.validate_selection_set(cond, &fragment.selection_set.items);
                        self.fragment_stack.pop();
                    }
                }
                q::Selection::InlineFragment(inline) => {
                    self.check_variables_in_directives(&inline.directives);
                    match &inline.type_condition {
                        Some(q::TypeCondition::On(cond)) => {
                            let known = self
                                .schema
                                .concrete_type(cond)
                                .is_some_and(MetaType::is_composite);
                            if known {
                                self.validate_selection_set(cond, &inline.selection_set.items);
                            } else {
                                self.errors.push(RuleError::new(
                                    &format!("Unknown composite type `{cond}`"),
                                    &[inline.position.into()],
                                ));
                            }
                        }
                        None => self.validate_selection_set(type_name, &inline.selection_set.items),
                    }
                }
            }
        }
    }

    fn validate_field(&mut self, type_name: &str, field: &q::Field<'static, String>) {
        self.check_variables_in_directives(&field.directives);
        for (_, value) in &field.arguments {
            self.check_variables_in_value(value, field.position);
        }

        if field.name == "__typename" {
            return;
        }

        let meta = match self.field_meta(type_name, &field.name) {
            Some(meta) => meta,
            None => {
                self.errors.push(RuleError::new(
                    &format!("Unknown field `{}` on type `{type_name}`", field.name),
                    &[field.position.into()],
                ));
                return;
            }
        };

        for (arg_name, _) in &field.arguments {
            if !meta.arguments.iter().any(|a| &a.name == arg_name) {
                self.errors.push(RuleError::new(
                    &format!(
                        "Unknown argument `{arg_name}` on field `{}.{}`",
                        type_name, field.name
                    ),
                    &[field.position.into()],
                ));
            }
        }
        for arg in &meta.arguments {
            let provided = field.arguments.iter().any(|(name, _)| name == &arg.name);
            if arg.arg_type.is_non_null() && arg.default_value.is_none() && !provided {
                self.errors.push(RuleError::new(
                    &format!(
                        "Missing required argument `{}` on field `{}.{}`",
                        arg.name, type_name, field.name
                    ),
                    &[field.position.into()],
                ));
            }
        }

        let inner_name = meta.field_type.innermost_name().to_owned();
        let is_leaf = is_builtin_scalar(&inner_name)
            || self
                .schema
                .concrete_type(&inner_name)
                .is_some_and(MetaType::is_leaf);
        if is_leaf {
            if !field.selection_set.items.is_empty() {
                self.errors.push(RuleError::new(
                    &format!(
                        "Field `{}` of leaf type `{inner_name}` cannot have a selection",
                        field.name
                    ),
                    &[field.position.into()],
                ));
            }
        } else if field.selection_set.items.is_empty() {
            self.errors.push(RuleError::new(
                &format!(
                    "Field `{}` of composite type `{inner_name}` must have a selection",
                    field.name
                ),
                &[field.position.into()],
            ));
        } else {
            self.validate_selection_set(&inner_name, &field.selection_set.items);
        }
    }

    /// The field metadata visible on an object, interface, or union type.
    fn field_meta(&self, type_name: &str, field_name: &str) -> Option<FieldMeta> {
        match self.schema.concrete_type(type_name)? {
            MetaType::Object(o) => o.field(field_name).cloned(),
            MetaType::Interface(i) => i.fields.iter().find(|f| f.name == field_name).cloned(),
            _ => None,
        }
    }

    fn check_variables_in_directives(&mut self, directives: &[q::Directive<'static, String>]) {
        for directive in directives {
            for (_, value) in &directive.arguments {
                self.check_variables_in_value(value, directive.position);
            }
        }
    }

    fn check_variables_in_value(&mut self, value: &q::Value<'static, String>, pos: graphql_parser::Pos) {
        match value {
            q::Value::Variable(name) => {
                if !self.declared_variables.contains(name) {
                    self.errors.push(RuleError::new(
                        &format!("Variable `${name}` is not defined"),
                        &[pos.into()],
                    ));
                }
            }
            q::Value::List(items) => {
                for item in items {
                    self.check_variables_in_value(item, pos);
                }
            }
            q::Value::Object(entries) => {
                for value in entries.values() {
                    self.check_variables_in_value(value, pos);
                }
            }
            _ => {}
        }
    }
}

/// Coerces the provided variable values against the operation's variable
/// definitions, applying defaults and rejecting type mismatches.
pub(crate) fn coerce_variable_values(
    schema: &Schema,
    operation: &OperationView<'_>,
    variables: &Variables,
) -> Result<Variables, Vec<RuleError>> {
    let mut coerced = Variables::new();
    let mut errors = Vec::new();
    let no_vars = Variables::new();

    for definition in operation.variable_definitions {
        let name = &definition.name;
        match variables.get(name) {
            Some(value) => {
                check_document_type(schema, value, &definition.var_type, name, &mut errors);
                coerced.insert(name.clone(), value.clone());
            }
            None => match &definition.default_value {
                Some(default) => {
                    coerced.insert(
                        name.clone(),
                        crate::executor::resolve::convert_input(default, &no_vars),
                    );
                }
                None => {
                    if matches!(definition.var_type, q::Type::NonNullType(_)) {
                        errors.push(RuleError::new(
                            &format!("Variable `${name}` of required type is not provided"),
                            &[definition.position.into()],
                        ));
                    }
                }
            },
        }
    }

    if errors.is_empty() {
        Ok(coerced)
    } else {
        Err(errors)
    }
}

fn check_document_type(
    schema: &Schema,
    value: &Value,
    ty: &q::Type<'static, String>,
    var_name: &str,
    errors: &mut Vec<RuleError>,
) {
    match ty {
        q::Type::NonNullType(inner) => {
            if value.is_null() {
                errors.push(RuleError::new(
                    &format!("Variable `${var_name}` of non-null type cannot be null"),
                    &[],
                ));
            } else {
                check_document_type(schema, value, inner, var_name, errors);
            }
        }
        _ if value.is_null() => {}
        q::Type::ListType(inner) => match value {
            Value::List(items) => {
                for item in items {
                    check_document_type(schema, item, inner, var_name, errors);
                }
            }
            _ => errors.push(RuleError::new(
                &format!("Variable `${var_name}` expected a list"),
                &[],
            )),
        },
        q::Type::NamedType(name) => {
            check_named_type(schema, value, name, var_name, errors);
        }
    }
}

fn check_named_type(
    schema: &Schema,
    value: &Value,
    type_name: &str,
    var_name: &str,
    errors: &mut Vec<RuleError>,
) {
    let mismatch = |expected: &str, errors: &mut Vec<RuleError>| {
        errors.push(RuleError::new(
            &format!("Variable `${var_name}` expected {expected}"),
            &[],
        ));
    };
    match type_name {
        "Int" => {
            if value.as_int().is_none() {
                mismatch("an Int", errors);
            }
        }
        "Float" => {
            if value.as_float().is_none() {
                mismatch("a Float", errors);
            }
        }
        "String" => {
            if value.as_str().is_none() {
                mismatch("a String", errors);
            }
        }
        "Boolean" => {
            if value.as_boolean().is_none() {
                mismatch("a Boolean", errors);
            }
        }
        "ID" => {
            if value.as_str().is_none() && value.as_int().is_none() {
                mismatch("an ID", errors);
            }
        }
        name => match schema.concrete_type(name) {
            Some(MetaType::Enum(e)) => {
                let valid = value
                    .as_str()
                    .is_some_and(|v| e.values.iter().any(|ev| ev.name == v));
                if !valid {
                    mismatch(&format!("a value of enum `{name}`", ), errors);
                }
            }
            Some(MetaType::InputObject(io)) => match value.as_object() {
                Some(obj) => {
                    for input_field in &io.input_fields {
                        check_input_field(schema, obj.get_field_value(&input_field.name), input_field, var_name, errors);
                    }
                }
                None => mismatch(&format!("an input object `{name}`"), errors),
            },
            Some(MetaType::Scalar(_)) => {}
            _ => mismatch(&format!("an input type, `{name}` is not one"), errors),
        },
    }
}

fn check_input_field(
    schema: &Schema,
    value: Option<&Value>,
    field: &ArgumentMeta,
    var_name: &str,
    errors: &mut Vec<RuleError>,
) {
    match value {
        Some(value) => check_type_ref(schema, value, &field.arg_type, var_name, errors),
        None => {
            if field.arg_type.is_non_null() && field.default_value.is_none() {
                errors.push(RuleError::new(
                    &format!(
                        "Variable `${var_name}` is missing required input field `{}`",
                        field.name
                    ),
                    &[],
                ));
            }
        }
    }
}

fn check_type_ref(
    schema: &Schema,
    value: &Value,
    ty: &TypeRef,
    var_name: &str,
    errors: &mut Vec<RuleError>,
) {
    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                errors.push(RuleError::new(
                    &format!("Variable `${var_name}` has a null in a non-null position"),
                    &[],
                ));
            } else {
                check_type_ref(schema, value, inner, var_name, errors);
            }
        }
        _ if value.is_null() => {}
        TypeRef::List(inner) => match value {
            Value::List(items) => {
                for item in items {
                    check_type_ref(schema, item, inner, var_name, errors);
                }
            }
            _ => errors.push(RuleError::new(
                &format!("Variable `${var_name}` expected a list"),
                &[],
            )),
        },
        TypeRef::Named(name) => check_named_type(schema, value, name, var_name, errors),
    }
}
