//! Apollo Federation v2 subgraph support: entity registration, the
//! `_entities` and `_service` machinery, and the annotated-SDL output.

use std::sync::{Arc, OnceLock};

use futures::future::{self, FutureExt};
use indexmap::IndexMap;

use crate::{
    ast::{self, SchemaRef},
    executor::{FieldResult, ResolveFn, ResolverArgs},
    schema::{
        builder::{FieldDef, ObjectDef, ScalarDef, SchemaBuilder, SchemaError, UnionDef},
        meta::{ArgumentMeta, DirectiveAnnotation, TypeRef},
        model::{FederationInfo, Schema},
    },
    value::Value,
};

/// The federation v2 directives a subgraph may import through `@link`.
const FEDERATION_DIRECTIVES: &[&str] = &[
    "key",
    "external",
    "requires",
    "provides",
    "override",
    "shareable",
    "inaccessible",
    "interfaceObject",
    "tag",
];

const FEDERATION_SPEC_URL: &str = "https://specs.apollo.dev/federation/v2.3";

/// Registration of a federated entity: an object type with one or more
/// `@key`s and a reference resolver invoked by `_entities`.
#[derive(Clone)]
pub struct EntityDef {
    pub(crate) name: String,
    pub(crate) schema: SchemaRef,
    pub(crate) keys: Vec<String>,
    pub(crate) resolve_reference: Option<ResolveFn>,
    pub(crate) directives: Vec<DirectiveAnnotation>,
    pub(crate) description: Option<String>,
}

impl EntityDef {
    /// Registers `schema` as the entity type `name`.
    pub fn new(name: impl Into<String>, schema: SchemaRef) -> Self {
        Self {
            name: name.into(),
            schema,
            keys: Vec::new(),
            resolve_reference: None,
            directives: Vec::new(),
            description: None,
        }
    }

    /// Adds a `@key(fields: "...")` field set.
    pub fn key(mut self, fields: impl Into<String>) -> Self {
        self.keys.push(fields.into());
        self
    }

    /// Sets the reference resolver: receives a representation (with
    /// `__typename` and the key fields) and produces the entity value.
    pub fn resolve_reference<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ResolverArgs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = FieldResult> + Send + 'static,
    {
        self.resolve_reference = Some(Arc::new(move |args| f(args).boxed()));
        self
    }

    /// Annotates the entity type definition with an extra directive
    /// (`@shareable`, `@tag(name: ...)`, ...).
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

impl SchemaBuilder {
    /// Registers a federated entity: the object type registration plus the
    /// `@key` annotations and the reference resolver.
    pub fn entity(&self, def: EntityDef) -> Self {
        let mut object = ObjectDef::new(def.name.as_str(), def.schema.clone());
        if let Some(description) = &def.description {
            object = object.describe(description.clone());
        }
        for key in &def.keys {
            object = object.directive(DirectiveAnnotation::new("key").arg("fields", key.clone()));
        }
        for annotation in &def.directives {
            object = object.directive(annotation.clone());
        }
        let mut next = self.object(object);
        next.entities.insert(def.name.clone(), def);
        next
    }

    /// Materializes a federation-v2 subgraph schema: the registered types
    /// plus `_Entity`, `_Any`, `_FieldSet`, `_Service`, and the `_entities`
    /// and `_service` root fields.
    pub fn build_federated(&self) -> Result<Schema, SchemaError> {
        validate_entity_keys(self)?;

        let mut references: IndexMap<String, ResolveFn> = IndexMap::new();
        for def in self.entities.values() {
            let resolve = def
                .resolve_reference
                .clone()
                .ok_or_else(|| SchemaError::MissingResolver {
                    field: format!("{}.resolveReference", def.name),
                })?;
            references.insert(def.name.clone(), resolve);
        }
        let references = Arc::new(references);

        let sdl_cell: Arc<OnceLock<String>> = Arc::new(OnceLock::new());

        let mut builder = self
            .scalar(ScalarDef::new("_Any").describe("A representation of a federated entity"))
            .scalar(ScalarDef::new("_FieldSet").describe("A selection of fields on a type"))
            .object(ObjectDef::new(
                "_Service",
                ast::structure([ast::field("sdl", ast::string())]),
            ));

        if !self.entities.is_empty() {
            builder = builder.union_type(UnionDef::new(
                "_Entity",
                self.entities.keys().cloned().collect::<Vec<_>>(),
            ));
            let entities_field = FieldDef::raw(
                TypeRef::non_null(TypeRef::list(TypeRef::named("_Entity"))),
                vec![ArgumentMeta {
                    name: "representations".into(),
                    description: None,
                    arg_type: TypeRef::non_null(TypeRef::list(TypeRef::non_null(
                        TypeRef::named("_Any"),
                    ))),
                    default_value: None,
                }],
            )
            .resolve({
                let references = references.clone();
                move |rargs: ResolverArgs| resolve_entities(references.clone(), rargs)
            });
            builder = builder.query("_entities", entities_field);
        }

        let service_schema = ast::named(
            &ast::structure([ast::field("sdl", ast::string())]),
            "_Service",
        );
        let service_field = FieldDef::new(service_schema)
            .resolve({
                let sdl_cell = sdl_cell.clone();
                move |_| {
                    let sdl = sdl_cell.get().cloned().unwrap_or_default();
                    async move {
                        Ok(Value::Object(
                            [("sdl".to_owned(), Value::scalar(sdl))].into_iter().collect(),
                        ))
                    }
                }
            });
        builder = builder.query("_service", service_field);

        let info = FederationInfo {
            hidden_types: ["_Any", "_FieldSet", "_Entity", "_Service"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            hidden_query_fields: vec!["_entities".into(), "_service".into()],
            link_header: link_header(self),
        };
        let schema = crate::schema::assemble::build(&builder, Some(info))?;

        let _ = sdl_cell.set(schema.sdl());
        Ok(schema)
    }
}

fn validate_entity_keys(builder: &SchemaBuilder) -> Result<(), SchemaError> {
    for def in builder.entities.values() {
        let fields = crate::schema::assemble::struct_fields_of(&def.schema).ok_or_else(|| {
            SchemaError::NotAnObjectSchema {
                name: def.name.clone(),
            }
        })?;
        for key in &def.keys {
            for token in key.split_whitespace() {
                if !fields.iter().any(|f| f.name == token) {
                    return Err(SchemaError::UnknownKeyField {
                        entity: def.name.clone(),
                        field: token.to_owned(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Resolves every representation in parallel with unbounded concurrency.
/// A failing or unknown reference yields `null` at its index and a warning;
/// the query as a whole never fails because of one entity.
async fn resolve_entities(
    references: Arc<IndexMap<String, ResolveFn>>,
    rargs: ResolverArgs,
) -> FieldResult {
    let representations = match rargs.args.as_object().and_then(|o| {
        o.get_field_value("representations")
            .and_then(Value::as_list)
            .cloned()
    }) {
        Some(reps) => reps,
        None => {
            return Err(crate::executor::FieldError::from(
                "Missing representations argument",
            ))
        }
    };

    let ctx = rargs.ctx;
    let lookups = representations.into_iter().map(|representation| {
        let references = references.clone();
        let ctx = ctx.clone();
        async move {
            let typename = representation
                .as_object()
                .and_then(|o| o.get_field_value("__typename"))
                .and_then(Value::as_str)
                .map(str::to_owned);
            let Some(typename) = typename else {
                tracing::warn!("entity representation is missing __typename");
                return Value::Null;
            };
            let Some(resolve) = references.get(&typename).cloned() else {
                tracing::warn!(typename = %typename, "no reference resolver for entity type");
                return Value::Null;
            };
            let resolved = resolve(ResolverArgs {
                parent: Value::Null,
                args: representation,
                ctx,
            })
            .await;
            match resolved {
                Ok(mut value) => {
                    // The union resolves members by discriminator.
                    if let Value::Object(obj) = &mut value {
                        if !obj.contains_field("__typename") {
                            obj.add_field("__typename", Value::scalar(typename));
                        }
                    }
                    value
                }
                Err(error) => {
                    tracing::warn!(
                        typename = %typename,
                        error = %error.message(),
                        "reference resolver failed",
                    );
                    Value::Null
                }
            }
        }
    });

    Ok(Value::List(future::join_all(lookups).await))
}

/// Builds the `extend schema @link(...)` header naming exactly the
/// federation directives the schema uses.
fn link_header(builder: &SchemaBuilder) -> String {
    let mut used: Vec<&str> = Vec::new();
    let mut note = |name: &str| {
        if let Some(known) = FEDERATION_DIRECTIVES.iter().find(|d| **d == name) {
            if !used.contains(known) {
                used.push(known);
            }
        }
    };

    for def in builder.objects.values() {
        for ann in &def.directives {
            note(&ann.name);
        }
    }
    for def in builder.queries.values().chain(builder.mutations.values()) {
        for ann in &def.directives {
            note(&ann.name);
        }
    }
    for fields in builder.extra_fields.values() {
        for def in fields.values() {
            for ann in &def.directives {
                note(&ann.name);
            }
        }
    }

    let imports = used
        .iter()
        .map(|d| format!("\"@{d}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!("extend schema @link(url: \"{FEDERATION_SPEC_URL}\", import: [{imports}])")
}
