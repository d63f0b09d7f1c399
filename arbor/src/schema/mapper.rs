//! Translation from schema AST nodes to GraphQL types.
//!
//! The mapper populates a single name-keyed registry of [`MetaType`]s and
//! hands out name-based [`TypeRef`]s, so cyclic shapes resolve to one
//! registered type. Output and input mappings keep separate in-progress
//! guards; a struct shared by both sides synthesizes a suffixed input
//! object name.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::{
    ast::{force, NodeKind, SchemaNode, SchemaRef, StructField},
    schema::{
        builder::{SchemaBuilder, SchemaError},
        meta::{
            is_builtin_scalar, ArgumentMeta, EnumMeta, EnumValueMeta, FieldMeta, InputObjectMeta,
            MetaType, ObjectMeta, TypeRef, UnionMeta,
        },
        model,
    },
    value::ScalarValue,
};

pub(crate) struct TypeMapper<'b> {
    builder: &'b SchemaBuilder,
    pub types: IndexMap<String, MetaType>,
    output_in_progress: HashSet<String>,
    input_in_progress: HashSet<String>,
}

impl<'b> TypeMapper<'b> {
    pub fn new(builder: &'b SchemaBuilder) -> Self {
        Self {
            builder,
            types: IndexMap::new(),
            output_in_progress: HashSet::new(),
            input_in_progress: HashSet::new(),
        }
    }

    /// Maps a node to its output type, non-null at top level unless the
    /// node is nullable.
    pub fn to_output_type(&mut self, node: &SchemaRef) -> Result<TypeRef, SchemaError> {
        let inner = self.output_inner(node)?;
        Ok(if node.is_nullable() {
            inner
        } else {
            TypeRef::non_null(inner)
        })
    }

    fn output_inner(&mut self, node: &SchemaRef) -> Result<TypeRef, SchemaError> {
        match node.kind() {
            NodeKind::String | NodeKind::Null => Ok(TypeRef::named("String")),
            NodeKind::Int => Ok(TypeRef::named("Int")),
            NodeKind::Float => Ok(TypeRef::named("Float")),
            NodeKind::Boolean => Ok(TypeRef::named("Boolean")),
            NodeKind::Literal(values) => self.literal_type(node, values),
            NodeKind::Refinement { base, .. } | NodeKind::Brand { base, .. } => {
                if node.is_integer() {
                    Ok(TypeRef::named("Int"))
                } else {
                    self.output_inner(base)
                }
            }
            NodeKind::NullOr(inner) | NodeKind::UndefinedOr(inner) => self.output_inner(inner),
            NodeKind::OptionWrapped { decoded, .. } => self.output_inner(decoded),
            NodeKind::Union(members) => self.output_union(node, members),
            NodeKind::Array(elem) => Ok(TypeRef::list(self.to_output_type(elem)?)),
            NodeKind::Struct(fields) => self.output_struct(node, fields),
            NodeKind::Declaration { type_parameters } => match type_parameters.first() {
                Some(param) => self.output_inner(param),
                None => Err(SchemaError::MissingTypeName),
            },
            NodeKind::Transformation { to, .. } => self.output_inner(to),
            NodeKind::Suspend(_) => {
                let forced = force(node);
                if let Some(name) = forced.identifier() {
                    if self.types.contains_key(name) || self.output_in_progress.contains(name) {
                        return Ok(TypeRef::named(name));
                    }
                }
                self.output_inner(&forced)
            }
        }
    }

    /// Maps a node to its input type; mirrors the output mapping but
    /// produces input objects and recurses into transformations' wire side.
    pub fn to_input_type(&mut self, node: &SchemaRef) -> Result<TypeRef, SchemaError> {
        let inner = self.input_inner(node)?;
        Ok(if node.is_nullable() {
            inner
        } else {
            TypeRef::non_null(inner)
        })
    }

    fn input_inner(&mut self, node: &SchemaRef) -> Result<TypeRef, SchemaError> {
        match node.kind() {
            NodeKind::String | NodeKind::Null => Ok(TypeRef::named("String")),
            NodeKind::Int => Ok(TypeRef::named("Int")),
            NodeKind::Float => Ok(TypeRef::named("Float")),
            NodeKind::Boolean => Ok(TypeRef::named("Boolean")),
            NodeKind::Literal(values) => self.literal_type(node, values),
            NodeKind::Refinement { base, .. } | NodeKind::Brand { base, .. } => {
                if node.is_integer() {
                    Ok(TypeRef::named("Int"))
                } else {
                    self.input_inner(base)
                }
            }
            NodeKind::NullOr(inner) | NodeKind::UndefinedOr(inner) => self.input_inner(inner),
            NodeKind::OptionWrapped { encoded, .. } => self.input_inner(encoded),
            NodeKind::Union(members) => {
                let concrete: Vec<_> = members
                    .iter()
                    .filter(|m| !matches!(m.kind(), NodeKind::Null))
                    .collect();
                match concrete.as_slice() {
                    [single] => self.input_inner(single),
                    _ if concrete
                        .iter()
                        .all(|m| matches!(m.kind(), NodeKind::Literal(_))) =>
                    {
                        let values = concrete
                            .iter()
                            .flat_map(|m| m.literal_values().unwrap_or_default().to_vec())
                            .collect::<Vec<_>>();
                        self.literal_type(node, &values)
                    }
                    _ => Err(SchemaError::InvalidInputType {
                        message: format!("{node:?} cannot appear in input position"),
                    }),
                }
            }
            NodeKind::Array(elem) => Ok(TypeRef::list(self.to_input_type(elem)?)),
            NodeKind::Struct(fields) => self.input_struct(node, fields),
            NodeKind::Declaration { type_parameters } => match type_parameters.first() {
                Some(param) => self.input_inner(param),
                None => Err(SchemaError::MissingTypeName),
            },
            NodeKind::Transformation { from, .. } => self.input_inner(from),
            NodeKind::Suspend(_) => {
                let forced = force(node);
                if let Some(name) = forced.identifier() {
                    let input_name = self.input_name_for(name);
                    if self.types.contains_key(&input_name)
                        || self.input_in_progress.contains(&input_name)
                    {
                        return Ok(TypeRef::named(input_name));
                    }
                }
                self.input_inner(&forced)
            }
        }
    }

    /// Expands an argument struct into per-argument metadata.
    pub fn argument_metas(&mut self, args_schema: &SchemaRef) -> Result<Vec<ArgumentMeta>, SchemaError> {
        let resolved = force(args_schema);
        let fields = resolved
            .struct_fields()
            .ok_or_else(|| SchemaError::InvalidInputType {
                message: "argument schemas must be structs".into(),
            })?;
        fields.iter().map(|f| self.input_field_meta(f)).collect()
    }

    fn input_field_meta(&mut self, field: &StructField) -> Result<ArgumentMeta, SchemaError> {
        let mut arg_type = self.to_input_type(&field.schema)?;
        if field.optional || field.default.is_some() {
            arg_type = arg_type.nullable();
        }
        Ok(ArgumentMeta {
            name: field.name.clone(),
            description: field.description.clone(),
            arg_type,
            default_value: field.default.clone(),
        })
    }

    fn literal_type(
        &mut self,
        node: &SchemaNode,
        values: &[ScalarValue],
    ) -> Result<TypeRef, SchemaError> {
        if !values.iter().all(|v| matches!(v, ScalarValue::String(_))) {
            // Non-string literal sets map to their underlying scalar.
            return Ok(match values.first() {
                Some(ScalarValue::Int(_)) => TypeRef::named("Int"),
                Some(ScalarValue::Float(_)) => TypeRef::named("Float"),
                Some(ScalarValue::Boolean(_)) => TypeRef::named("Boolean"),
                _ => TypeRef::named("String"),
            });
        }
        let value_set: HashSet<&str> = values.iter().filter_map(ScalarValue::as_str).collect();

        // A registered enum with the same value set wins over synthesis.
        for def in self.builder.enums.values() {
            let registered: HashSet<&str> = def.values.iter().map(String::as_str).collect();
            if registered == value_set {
                return Ok(TypeRef::named(&def.name));
            }
        }

        let name = node
            .identifier()
            .ok_or(SchemaError::MissingTypeName)?
            .to_owned();
        if !self.types.contains_key(&name) {
            self.register(MetaType::Enum(EnumMeta {
                name: name.clone(),
                description: node.description().map(Into::into),
                values: values
                    .iter()
                    .filter_map(ScalarValue::as_str)
                    .map(|v| EnumValueMeta {
                        name: v.to_owned(),
                        description: None,
                    })
                    .collect(),
            }))?;
        }
        Ok(TypeRef::named(name))
    }

    fn output_union(
        &mut self,
        node: &SchemaNode,
        members: &[SchemaRef],
    ) -> Result<TypeRef, SchemaError> {
        let concrete: Vec<&SchemaRef> = members
            .iter()
            .filter(|m| !matches!(m.kind(), NodeKind::Null))
            .collect();

        if let [single] = concrete.as_slice() {
            return self.output_inner(single);
        }

        if concrete
            .iter()
            .all(|m| matches!(m.kind(), NodeKind::Literal(_)))
        {
            let values = concrete
                .iter()
                .flat_map(|m| m.literal_values().unwrap_or_default().to_vec())
                .collect::<Vec<_>>();
            return self.literal_type(node, &values);
        }

        let name = node
            .identifier()
            .ok_or(SchemaError::MissingTypeName)?
            .to_owned();
        if self.types.contains_key(&name)
            || self.output_in_progress.contains(&name)
            || self.deferred_to_builder(&name)
        {
            return Ok(TypeRef::named(name));
        }
        self.output_in_progress.insert(name.clone());
        let mut of_type_names = Vec::with_capacity(concrete.len());
        for member in &concrete {
            let member_ref = self.output_inner(member)?;
            of_type_names.push(member_ref.innermost_name().to_owned());
        }
        self.output_in_progress.remove(&name);
        self.register(MetaType::Union(UnionMeta {
            name: name.clone(),
            description: node.description().map(Into::into),
            of_type_names,
            resolve_type: model::default_resolve_type(),
        }))?;
        Ok(TypeRef::named(name))
    }

    fn output_struct(
        &mut self,
        node: &SchemaNode,
        fields: &[StructField],
    ) -> Result<TypeRef, SchemaError> {
        let name = node
            .identifier()
            .ok_or(SchemaError::MissingTypeName)?
            .to_owned();
        if self.types.contains_key(&name)
            || self.output_in_progress.contains(&name)
            || self.deferred_to_builder(&name)
        {
            return Ok(TypeRef::named(name));
        }
        self.output_in_progress.insert(name.clone());
        let meta = self.object_meta_from_struct(&name, node.description(), fields)?;
        self.output_in_progress.remove(&name);
        self.register(MetaType::Object(meta))?;
        Ok(TypeRef::named(name))
    }

    /// Builds the base object metadata for a struct: one property-read field
    /// per property signature.
    pub fn object_meta_from_struct(
        &mut self,
        name: &str,
        description: Option<&str>,
        fields: &[StructField],
    ) -> Result<ObjectMeta, SchemaError> {
        let mut metas = Vec::with_capacity(fields.len());
        for f in fields {
            let mut field_type = self.to_output_type(&f.schema)?;
            if f.optional {
                field_type = field_type.nullable();
            }
            metas.push(FieldMeta {
                name: f.name.clone(),
                description: f.description.clone(),
                field_type,
                arguments: Vec::new(),
                directives: Vec::new(),
                resolver: None,
                subscription: None,
            });
        }
        Ok(ObjectMeta {
            name: name.to_owned(),
            description: description.map(Into::into),
            fields: metas,
            interface_names: Vec::new(),
            directives: Vec::new(),
        })
    }

    fn input_struct(
        &mut self,
        node: &SchemaNode,
        fields: &[StructField],
    ) -> Result<TypeRef, SchemaError> {
        let base_name = node.identifier().ok_or(SchemaError::MissingTypeName)?;
        let name = self.input_name_for(base_name);
        if self.types.contains_key(&name) || self.input_in_progress.contains(&name) {
            return Ok(TypeRef::named(name));
        }
        self.input_in_progress.insert(name.clone());
        let input_fields = fields
            .iter()
            .map(|f| self.input_field_meta(f))
            .collect::<Result<Vec<_>, _>>()?;
        self.input_in_progress.remove(&name);
        self.register(MetaType::InputObject(InputObjectMeta {
            name: name.clone(),
            description: node.description().map(Into::into),
            input_fields,
        }))?;
        Ok(TypeRef::named(name))
    }

    /// The registry name for an input object synthesized from `base_name`:
    /// the name itself when free (or registered as an input), otherwise
    /// suffixed to keep the input and output registries disjoint.
    fn input_name_for(&self, base_name: &str) -> String {
        if self.builder.inputs.contains_key(base_name) {
            return base_name.to_owned();
        }
        match self.types.get(base_name) {
            None => base_name.to_owned(),
            Some(MetaType::InputObject(_)) => base_name.to_owned(),
            Some(_) => format!("{base_name}Input"),
        }
    }

    /// Whether a name has an explicit registration the assembly passes will
    /// materialize themselves; references just use the name.
    fn deferred_to_builder(&self, name: &str) -> bool {
        self.builder.objects.contains_key(name)
            || self.builder.interfaces.contains_key(name)
            || self.builder.unions.contains_key(name)
    }

    /// Marks a name as being mapped, so recursive references resolve to the
    /// name instead of re-entering the mapping.
    pub fn mark_in_progress(&mut self, name: &str) {
        self.output_in_progress.insert(name.to_owned());
    }

    /// Clears an in-progress mark.
    pub fn unmark_in_progress(&mut self, name: &str) {
        self.output_in_progress.remove(name);
    }

    /// Registers a mapped type, rejecting cross-kind name collisions.
    pub fn register(&mut self, meta: MetaType) -> Result<(), SchemaError> {
        let name = meta.name().to_owned();
        if is_builtin_scalar(&name) || self.types.contains_key(&name) {
            return Err(SchemaError::DuplicateTypeName { name });
        }
        self.types.insert(name, meta);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        array, boolean, brand, field, int, literal, named, non_negative_int, null_or,
        option_from_null_or, optional_field, string, structure, suspend, union,
    };
    use crate::schema::builder::{EnumDef, SchemaBuilder};

    fn mapper_types(node: &SchemaRef) -> (TypeRef, IndexMap<String, MetaType>) {
        let builder = SchemaBuilder::new();
        let mut mapper = TypeMapper::new(&builder);
        let ty = mapper.to_output_type(node).unwrap();
        (ty, mapper.types)
    }

    #[test]
    fn scalars_map_non_null() {
        assert_eq!(
            mapper_types(&string()).0,
            TypeRef::non_null(TypeRef::named("String")),
        );
        assert_eq!(
            mapper_types(&boolean()).0,
            TypeRef::non_null(TypeRef::named("Boolean")),
        );
    }

    #[test]
    fn branded_refined_int_maps_to_int() {
        let user_id = brand(non_negative_int(), "UserId");
        assert_eq!(
            mapper_types(&user_id).0,
            TypeRef::non_null(TypeRef::named("Int")),
        );

        let builder = SchemaBuilder::new();
        let mut mapper = TypeMapper::new(&builder);
        assert_eq!(
            mapper.to_input_type(&user_id).unwrap(),
            TypeRef::non_null(TypeRef::named("Int")),
        );
    }

    #[test]
    fn null_or_and_option_wrapped_are_nullable() {
        assert_eq!(mapper_types(&null_or(int())).0, TypeRef::named("Int"));
        assert_eq!(
            mapper_types(&option_from_null_or(int())).0,
            TypeRef::named("Int"),
        );
    }

    #[test]
    fn array_wraps_elem_nullability() {
        assert_eq!(
            mapper_types(&array(string())).0,
            TypeRef::non_null(TypeRef::list(TypeRef::non_null(TypeRef::named("String")))),
        );
        assert_eq!(
            mapper_types(&array(null_or(string()))).0,
            TypeRef::non_null(TypeRef::list(TypeRef::named("String"))),
        );
    }

    #[test]
    fn string_literals_synthesize_enum() {
        let role = named(&literal(["ADMIN", "MEMBER"]), "Role");
        let (ty, types) = mapper_types(&role);
        assert_eq!(ty, TypeRef::non_null(TypeRef::named("Role")));
        assert!(matches!(types.get("Role"), Some(MetaType::Enum(_))));
    }

    #[test]
    fn string_literals_match_registered_enum() {
        let builder = SchemaBuilder::new().enum_type(EnumDef::new("Role", ["ADMIN", "MEMBER"]));
        let mut mapper = TypeMapper::new(&builder);
        let ty = mapper.to_output_type(&literal(["MEMBER", "ADMIN"])).unwrap();
        assert_eq!(ty, TypeRef::non_null(TypeRef::named("Role")));
    }

    #[test]
    fn union_with_null_member_is_nullable_inner() {
        let node = union([string(), crate::ast::null()]);
        assert_eq!(mapper_types(&node).0, TypeRef::named("String"));
    }

    #[test]
    fn tagged_struct_union_synthesizes_union_type() {
        let dog = structure([field("_tag", literal(["Dog"])), field("name", string())]);
        let cat = structure([field("_tag", literal(["Cat"])), field("lives", int())]);
        let pet = named(&union([dog, cat]), "Pet");
        let (ty, types) = mapper_types(&pet);
        assert_eq!(ty, TypeRef::non_null(TypeRef::named("Pet")));
        match types.get("Pet") {
            Some(MetaType::Union(u)) => {
                assert_eq!(u.of_type_names, vec!["Dog".to_owned(), "Cat".to_owned()]);
            }
            _ => panic!("expected a union meta"),
        }
    }

    #[test]
    fn anonymous_struct_as_named_type_is_an_error() {
        let builder = SchemaBuilder::new();
        let mut mapper = TypeMapper::new(&builder);
        assert_eq!(
            mapper.to_output_type(&structure([field("id", string())])),
            Err(SchemaError::MissingTypeName),
        );
    }

    #[test]
    fn recursive_struct_resolves_by_name() {
        fn node_schema() -> SchemaRef {
            named(
                &structure([
                    field("id", string()),
                    optional_field("parent", suspend(node_schema)),
                ]),
                "TreeNode",
            )
        }
        let (ty, types) = mapper_types(&node_schema());
        assert_eq!(ty, TypeRef::non_null(TypeRef::named("TreeNode")));
        match types.get("TreeNode") {
            Some(MetaType::Object(o)) => {
                let parent = o.field("parent").unwrap();
                assert_eq!(parent.field_type, TypeRef::named("TreeNode"));
            }
            _ => panic!("expected an object meta"),
        }
    }

    #[test]
    fn shared_struct_gets_suffixed_input_object() {
        let filter = named(
            &structure([
                field("pageSize", non_negative_int()),
                field("offset", option_from_null_or(int())),
            ]),
            "Page",
        );
        let builder = SchemaBuilder::new();
        let mut mapper = TypeMapper::new(&builder);
        mapper.to_output_type(&filter).unwrap();
        let input_ty = mapper.to_input_type(&filter).unwrap();
        assert_eq!(input_ty, TypeRef::non_null(TypeRef::named("PageInput")));
        match mapper.types.get("PageInput") {
            Some(MetaType::InputObject(io)) => {
                let page_size = &io.input_fields[0];
                assert_eq!(
                    page_size.arg_type,
                    TypeRef::non_null(TypeRef::named("Int")),
                );
                let offset = &io.input_fields[1];
                assert_eq!(offset.arg_type, TypeRef::named("Int"));
            }
            _ => panic!("expected an input object meta"),
        }
    }
}
