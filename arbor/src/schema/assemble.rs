//! Two-pass schema assembly and resolver wrapping.
//!
//! Pass A materializes the leaf registries (enums, input objects,
//! interfaces); pass B materializes objects and unions; the roots are wired
//! last. Because all type references are name-based, mutually recursive
//! registrations need no ordering beyond the two passes.

use std::{collections::HashSet, panic::AssertUnwindSafe, sync::Arc};

use futures::{future::FutureExt, stream::StreamExt};

use crate::{
    ast::{self, force, NodeKind, SchemaRef},
    executor::{
        middleware::{apply_chain, FieldInfo, MiddlewareContext, MiddlewareFn},
        FieldError, ResolveFn, ResolverArgs, ResolverEffect, SubscribeFn,
    },
    schema::{
        builder::{DirectiveDef, FieldDef, SchemaBuilder, SchemaError, SubscriptionFieldDef},
        mapper::TypeMapper,
        meta::{DirectiveAnnotation, EnumMeta, EnumValueMeta, FieldMeta, InterfaceMeta, MetaType, ObjectMeta, UnionMeta},
        model::{self, FederationInfo, Schema},
    },
    value::Value,
};

const QUERY_ROOT: &str = "Query";
const MUTATION_ROOT: &str = "Mutation";
const SUBSCRIPTION_ROOT: &str = "Subscription";

pub(crate) fn build(
    builder: &SchemaBuilder,
    federation: Option<FederationInfo>,
) -> Result<Schema, SchemaError> {
    check_unique_names(builder)?;

    let mut mapper = TypeMapper::new(builder);

    // Pass A: leaf registries that never reference objects.
    for def in builder.scalars.values() {
        mapper.register(MetaType::Scalar(crate::schema::meta::ScalarMeta {
            name: def.name.clone(),
            description: def.description.clone(),
        }))?;
    }
    for def in builder.enums.values() {
        mapper.register(MetaType::Enum(EnumMeta {
            name: def.name.clone(),
            description: def.description.clone(),
            values: def
                .values
                .iter()
                .map(|v| EnumValueMeta {
                    name: v.clone(),
                    description: None,
                })
                .collect(),
        }))?;
    }
    for def in builder.inputs.values() {
        let renamed = ast::named(&def.schema, def.name.as_str());
        mapper.to_input_type(&renamed)?;
    }
    for def in builder.interfaces.values() {
        let fields = struct_fields_of(&def.schema)
            .ok_or_else(|| SchemaError::NotAnObjectSchema {
                name: def.name.clone(),
            })?;
        let meta = mapper.object_meta_from_struct(
            &def.name,
            def.description.as_deref().or(def.schema.description()),
            &fields,
        )?;
        mapper.register(MetaType::Interface(InterfaceMeta {
            name: def.name.clone(),
            description: meta.description.clone(),
            fields: meta.fields,
            resolve_type: def
                .resolve_type
                .clone()
                .unwrap_or_else(model::default_resolve_type),
        }))?;
    }

    // Pass B: objects, then unions over them.
    for def in builder.objects.values() {
        let fields = struct_fields_of(&def.schema)
            .ok_or_else(|| SchemaError::NotAnObjectSchema {
                name: def.name.clone(),
            })?;
        mapper.mark_in_progress(&def.name);
        let built = mapper.object_meta_from_struct(
            &def.name,
            def.description.as_deref().or(def.schema.description()),
            &fields,
        );
        mapper.unmark_in_progress(&def.name);
        let mut meta = built?;
        meta.interface_names = def.implements.clone();
        meta.directives = def.directives.clone();
        mapper.register(MetaType::Object(meta))?;
    }
    for def in builder.unions.values() {
        for member in &def.members {
            let known = mapper
                .types
                .get(member)
                .is_some_and(|t| matches!(t, MetaType::Object(_)));
            if !known {
                return Err(SchemaError::UnknownUnionMember {
                    union: def.name.clone(),
                    member: member.clone(),
                });
            }
        }
        mapper.register(MetaType::Union(UnionMeta {
            name: def.name.clone(),
            description: def.description.clone(),
            of_type_names: def.members.clone(),
            resolve_type: def
                .resolve_type
                .clone()
                .unwrap_or_else(model::default_resolve_type),
        }))?;
    }

    // Roots.
    if builder.queries.is_empty() {
        return Err(SchemaError::EmptyQueryRoot);
    }
    let query_fields = builder
        .queries
        .iter()
        .map(|(name, def)| field_meta(&mut mapper, builder, QUERY_ROOT, name, def, &[]))
        .collect::<Result<Vec<_>, _>>()?;
    mapper.register(MetaType::Object(ObjectMeta {
        name: QUERY_ROOT.into(),
        description: None,
        fields: query_fields,
        interface_names: Vec::new(),
        directives: Vec::new(),
    }))?;

    let mutation_type_name = if builder.mutations.is_empty() {
        None
    } else {
        let fields = builder
            .mutations
            .iter()
            .map(|(name, def)| field_meta(&mut mapper, builder, MUTATION_ROOT, name, def, &[]))
            .collect::<Result<Vec<_>, _>>()?;
        mapper.register(MetaType::Object(ObjectMeta {
            name: MUTATION_ROOT.into(),
            description: None,
            fields,
            interface_names: Vec::new(),
            directives: Vec::new(),
        }))?;
        Some(MUTATION_ROOT.to_owned())
    };

    let subscription_type_name = if builder.subscriptions.is_empty() {
        None
    } else {
        let fields = builder
            .subscriptions
            .iter()
            .map(|(name, def)| subscription_field_meta(&mut mapper, builder, name, def))
            .collect::<Result<Vec<_>, _>>()?;
        mapper.register(MetaType::Object(ObjectMeta {
            name: SUBSCRIPTION_ROOT.into(),
            description: None,
            fields,
            interface_names: Vec::new(),
            directives: Vec::new(),
        }))?;
        Some(SUBSCRIPTION_ROOT.to_owned())
    };

    // Colocated fields: overlay onto the registered objects; a colocated
    // field shadows a struct-derived field of the same name.
    for (type_name, fields) in &builder.extra_fields {
        let type_directives = builder
            .objects
            .get(type_name)
            .map(|d| d.directives.clone())
            .unwrap_or_default();
        let mut built = Vec::with_capacity(fields.len());
        for (field_name, def) in fields {
            built.push(field_meta(
                &mut mapper,
                builder,
                type_name,
                field_name,
                def,
                &type_directives,
            )?);
        }
        match mapper.types.get_mut(type_name.as_str()) {
            Some(MetaType::Object(obj)) => {
                for meta in built {
                    match obj.fields.iter_mut().find(|f| f.name == meta.name) {
                        Some(existing) => *existing = meta,
                        None => obj.fields.push(meta),
                    }
                }
            }
            _ => {
                return Err(SchemaError::UnknownFieldTarget {
                    type_name: type_name.clone(),
                });
            }
        }
    }

    validate_interfaces(&mapper.types)?;

    Ok(Schema {
        types: mapper.types,
        query_type_name: Some(QUERY_ROOT.to_owned()),
        mutation_type_name,
        subscription_type_name,
        directives: builder.directives.clone(),
        extensions: builder.extensions.clone(),
        field_spans: builder.field_spans,
        federation,
    })
}

fn check_unique_names(builder: &SchemaBuilder) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    let names = builder
        .objects
        .keys()
        .chain(builder.interfaces.keys())
        .chain(builder.enums.keys())
        .chain(builder.unions.keys())
        .chain(builder.inputs.keys())
        .chain(builder.scalars.keys());
    for name in names {
        if [QUERY_ROOT, MUTATION_ROOT, SUBSCRIPTION_ROOT].contains(&name.as_str())
            || !seen.insert(name.clone())
        {
            return Err(SchemaError::DuplicateTypeName { name: name.clone() });
        }
    }
    Ok(())
}

/// Unwraps declarations, transformations, brands, and suspensions down to a
/// struct's property signatures.
pub(crate) fn struct_fields_of(node: &SchemaRef) -> Option<Vec<ast::StructField>> {
    let mut current = node.clone();
    loop {
        current = match current.kind() {
            NodeKind::Struct(fields) => return Some(fields.to_vec()),
            NodeKind::Declaration { type_parameters } => type_parameters.first()?.clone(),
            NodeKind::Transformation { to, .. } => to.clone(),
            NodeKind::Brand { base, .. } | NodeKind::Refinement { base, .. } => base.clone(),
            NodeKind::Suspend(_) => force(&current),
            _ => return None,
        };
    }
}

fn validate_interfaces(
    types: &indexmap::IndexMap<String, MetaType>,
) -> Result<(), SchemaError> {
    for meta in types.values() {
        let MetaType::Object(object) = meta else {
            continue;
        };
        for interface_name in &object.interface_names {
            let Some(MetaType::Interface(interface)) = types.get(interface_name) else {
                return Err(SchemaError::UnknownInterface {
                    object: object.name.clone(),
                    interface: interface_name.clone(),
                });
            };
            for field in &interface.fields {
                if object.field(&field.name).is_none() {
                    return Err(SchemaError::MissingInterfaceField {
                        object: object.name.clone(),
                        interface: interface_name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Decodes a directive annotation's constant arguments against the
/// directive's declared argument schema.
fn directive_args(def: &DirectiveDef, ann: &DirectiveAnnotation) -> Result<Value, SchemaError> {
    let raw = Value::Object(ann.args.iter().cloned().collect());
    match &def.args_schema {
        Some(schema) => ast::decode(schema, &raw).map_err(|e| SchemaError::InvalidDirectiveArgs {
            directive: def.name.clone(),
            message: e.to_string(),
        }),
        None => Ok(raw),
    }
}

/// Builds the effective middleware chain for one field, outermost first:
/// global middleware in registration order, then directive-derived
/// middleware from the field's annotations, then the type's.
fn middleware_chain(
    builder: &SchemaBuilder,
    info: &FieldInfo,
    field_annotations: &[DirectiveAnnotation],
    type_annotations: &[DirectiveAnnotation],
) -> Result<Vec<MiddlewareFn>, SchemaError> {
    let mut chain: Vec<MiddlewareFn> = builder
        .middleware
        .iter()
        .filter(|m| m.applies_to(info))
        .map(|m| m.apply_fn())
        .collect();
    for ann in field_annotations.iter().chain(type_annotations) {
        let Some(def) = builder.directives.get(&ann.name) else {
            continue;
        };
        let Some(apply) = def.apply.clone() else {
            continue;
        };
        let args = directive_args(def, ann)?;
        chain.push(Arc::new(move |effect, _mcx| apply(args.clone(), effect)));
    }
    Ok(chain)
}

struct ResolverWrap {
    raw: ResolveFn,
    args_schema: Option<SchemaRef>,
    return_schema: Option<SchemaRef>,
    info: FieldInfo,
    chain: Vec<MiddlewareFn>,
}

/// Runs a resolver effect with a panic boundary: a defect in the resolver
/// (or in middleware wrapping it) becomes a single internal-error
/// [`FieldError`] at the field and follows the normal nullable-ancestor
/// propagation instead of unwinding through the engine.
fn guard_defects(effect: ResolverEffect) -> ResolverEffect {
    AssertUnwindSafe(effect)
        .catch_unwind()
        .map(|outcome| match outcome {
            Ok(resolved) => resolved,
            Err(defect) => {
                let reason = defect
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| defect.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("unknown panic");
                tracing::error!(reason = reason, "resolver defect");
                Err(FieldError::from("Internal error"))
            }
        })
        .boxed()
}

/// Wraps a registered resolver into the engine-facing form: decode the
/// arguments, thread the middleware chain, run the effect, and encode the
/// result through the declared output schema.
fn wrap_resolver(wrap: ResolverWrap) -> ResolveFn {
    Arc::new(move |rargs: ResolverArgs| {
        let decoded = match &wrap.args_schema {
            Some(schema) => match ast::decode(schema, &rargs.args) {
                Ok(v) => v,
                Err(e) => {
                    return futures::future::ready(Err(FieldError::invalid_arguments(e))).boxed()
                }
            },
            None => rargs.args.clone(),
        };
        let mcx = MiddlewareContext {
            parent: rargs.parent.clone(),
            args: decoded.clone(),
            info: wrap.info.clone(),
            ctx: rargs.ctx.clone(),
        };
        let raw = wrap.raw.clone();
        let return_schema = wrap.return_schema.clone();
        let chain = wrap.chain.clone();
        let args = ResolverArgs {
            parent: rargs.parent,
            args: decoded,
            ctx: rargs.ctx,
        };
        // Everything from the resolver call onwards runs behind the panic
        // boundary, middleware wrapping included.
        guard_defects(
            async move {
                let innermost = {
                    let return_schema = return_schema.clone();
                    let fut = raw(args);
                    async move {
                        let value = fut.await?;
                        match &return_schema {
                            Some(schema) => ast::encode(schema, &value).map_err(|e| {
                                FieldError::from(format!("Result encoding failed: {e}"))
                            }),
                            None => Ok(value),
                        }
                    }
                    .boxed()
                };
                apply_chain(&chain, innermost, &mcx).await
            }
            .boxed(),
        )
    })
}

/// Builds the runtime field metadata for a query, mutation, or colocated
/// object field.
fn field_meta(
    mapper: &mut TypeMapper<'_>,
    builder: &SchemaBuilder,
    parent_type: &str,
    name: &str,
    def: &FieldDef,
    type_annotations: &[DirectiveAnnotation],
) -> Result<FieldMeta, SchemaError> {
    let field_type = match (&def.return_type, &def.raw_type) {
        (Some(schema), _) => mapper.to_output_type(schema)?,
        (None, Some(ty)) => ty.clone(),
        (None, None) => {
            return Err(SchemaError::MissingResolver {
                field: format!("{parent_type}.{name}"),
            })
        }
    };
    let arguments = match &def.args_schema {
        Some(schema) => mapper.argument_metas(schema)?,
        None => def.raw_arguments.clone(),
    };
    let info = FieldInfo {
        parent_type: parent_type.to_owned(),
        field_name: name.to_owned(),
    };
    let chain = middleware_chain(builder, &info, &def.directives, type_annotations)?;
    let raw = def
        .resolver
        .clone()
        .ok_or_else(|| SchemaError::MissingResolver {
            field: format!("{parent_type}.{name}"),
        })?;
    let resolver = wrap_resolver(ResolverWrap {
        raw,
        args_schema: def.args_schema.clone(),
        return_schema: def.return_type.clone(),
        info,
        chain,
    });
    Ok(FieldMeta {
        name: name.to_owned(),
        description: def.description.clone(),
        field_type,
        arguments,
        directives: def.directives.clone(),
        resolver: Some(resolver),
        subscription: None,
    })
}

/// Builds the runtime field metadata for a subscription root field: the
/// subscribe effect yields the stream, and every published item runs the
/// optional per-item transformer plus the middleware chain before being
/// encoded.
fn subscription_field_meta(
    mapper: &mut TypeMapper<'_>,
    builder: &SchemaBuilder,
    name: &str,
    def: &SubscriptionFieldDef,
) -> Result<FieldMeta, SchemaError> {
    let field_type = mapper.to_output_type(&def.return_type)?;
    let arguments = def
        .args_schema
        .as_ref()
        .map(|s| mapper.argument_metas(s))
        .transpose()?
        .unwrap_or_default();
    let info = FieldInfo {
        parent_type: SUBSCRIPTION_ROOT.to_owned(),
        field_name: name.to_owned(),
    };
    let chain = middleware_chain(builder, &info, &def.directives, &[])?;
    let raw = def
        .subscribe
        .clone()
        .ok_or_else(|| SchemaError::MissingSubscribe {
            field: format!("{SUBSCRIPTION_ROOT}.{name}"),
        })?;
    let item_resolver = def.item_resolver.clone();
    let args_schema = def.args_schema.clone();
    let return_schema = def.return_type.clone();

    let subscribe: SubscribeFn = Arc::new(move |rargs: ResolverArgs| {
        let decoded = match &args_schema {
            Some(schema) => match ast::decode(schema, &rargs.args) {
                Ok(v) => v,
                Err(e) => {
                    return futures::future::ready(Err(FieldError::invalid_arguments(e))).boxed()
                }
            },
            None => rargs.args.clone(),
        };
        let raw = raw.clone();
        let item_resolver = item_resolver.clone();
        let return_schema = return_schema.clone();
        let chain = chain.clone();
        let info = info.clone();
        let ctx = rargs.ctx.clone();
        let parent = rargs.parent.clone();
        async move {
            let stream = raw(ResolverArgs {
                parent,
                args: decoded.clone(),
                ctx: ctx.clone(),
            })
            .await?;
            let mapped = stream.then(move |item| {
                let item_resolver = item_resolver.clone();
                let return_schema = return_schema.clone();
                let chain = chain.clone();
                let info = info.clone();
                let ctx = ctx.clone();
                let args = decoded.clone();
                async move {
                    let value = item?;
                    let mcx = MiddlewareContext {
                        parent: value.clone(),
                        args: args.clone(),
                        info,
                        ctx: ctx.clone(),
                    };
                    let resolved = guard_defects(
                        async move {
                            let innermost = match item_resolver {
                                Some(resolver) => resolver(ResolverArgs {
                                    parent: value,
                                    args,
                                    ctx,
                                }),
                                None => futures::future::ready(Ok(value)).boxed(),
                            };
                            apply_chain(&chain, innermost, &mcx).await
                        }
                        .boxed(),
                    )
                    .await?;
                    ast::encode(&return_schema, &resolved)
                        .map_err(|e| FieldError::from(format!("Result encoding failed: {e}")))
                }
            });
            Ok(mapped.boxed())
        }
        .boxed()
    });

    Ok(FieldMeta {
        name: name.to_owned(),
        description: def.description.clone(),
        field_type,
        arguments,
        directives: def.directives.clone(),
        resolver: None,
        subscription: Some(subscribe),
    })
}
