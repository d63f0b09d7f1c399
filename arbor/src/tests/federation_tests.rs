use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use pretty_assertions::assert_eq;
use serde_json::json;

use crate::{
    ast, execute,
    federation::EntityDef,
    schema::builder::{FieldDef, SchemaBuilder},
    service::Services,
    value::Value,
    FieldError, SchemaError, Variables,
};

fn user_schema() -> ast::SchemaRef {
    ast::named(
        &ast::structure([
            ast::field("id", ast::string()),
            ast::field("name", ast::string()),
        ]),
        "User",
    )
}

fn federated_builder(invocations: Arc<AtomicUsize>) -> SchemaBuilder {
    SchemaBuilder::new()
        .query(
            "me",
            FieldDef::new(user_schema())
                .resolve(|_| async { Ok(Value::from(json!({"id": "0", "name": "Me"}))) }),
        )
        .entity(
            EntityDef::new("User", user_schema())
                .key("id")
                .resolve_reference(move |rargs| {
                    let invocations = invocations.clone();
                    async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        let id = rargs
                            .args
                            .as_object()
                            .and_then(|o| o.get_field_value("id"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_owned();
                        if id == "missing" {
                            return Err(FieldError::from("user not found"));
                        }
                        Ok(Value::from(json!({"id": id, "name": format!("User {id}")})))
                    }
                }),
        )
}

#[tokio::test]
async fn entities_resolve_by_representation() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let schema = federated_builder(invocations.clone())
        .build_federated()
        .unwrap();
    let (data, errors) = execute(
        r#"{ _entities(representations: [{__typename: "User", id: "1"}]) { ... on User { id name } } }"#,
        None,
        &schema,
        &Variables::new(),
        &Services::new(),
    )
    .await
    .unwrap();
    assert!(errors.is_empty());
    assert_eq!(
        data,
        Value::from(json!({"_entities": [{"id": "1", "name": "User 1"}]})),
    );
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn one_failing_reference_yields_null_at_its_index_only() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let schema = federated_builder(invocations.clone())
        .build_federated()
        .unwrap();
    let (data, errors) = execute(
        r#"{ _entities(representations: [
            {__typename: "User", id: "1"},
            {__typename: "User", id: "missing"},
            {__typename: "User", id: "3"}
        ]) { ... on User { id } } }"#,
        None,
        &schema,
        &Variables::new(),
        &Services::new(),
    )
    .await
    .unwrap();
    assert!(errors.is_empty());
    assert_eq!(
        data,
        Value::from(json!({"_entities": [{"id": "1"}, null, {"id": "3"}]})),
    );
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unknown_typename_yields_null() {
    let schema = federated_builder(Arc::new(AtomicUsize::new(0)))
        .build_federated()
        .unwrap();
    let (data, _) = execute(
        r#"{ _entities(representations: [{__typename: "Ghost", id: "1"}]) { ... on User { id } } }"#,
        None,
        &schema,
        &Variables::new(),
        &Services::new(),
    )
    .await
    .unwrap();
    assert_eq!(data, Value::from(json!({"_entities": [null]})));
}

#[tokio::test]
async fn service_sdl_carries_key_annotations_and_link_header() {
    let schema = federated_builder(Arc::new(AtomicUsize::new(0)))
        .build_federated()
        .unwrap();
    let (data, errors) = execute(
        "{ _service { sdl } }",
        None,
        &schema,
        &Variables::new(),
        &Services::new(),
    )
    .await
    .unwrap();
    assert!(errors.is_empty());
    let sdl = data
        .as_object()
        .and_then(|o| o.get_field_value("_service"))
        .and_then(Value::as_object)
        .and_then(|o| o.get_field_value("sdl"))
        .and_then(Value::as_str)
        .unwrap()
        .to_owned();

    assert!(sdl.starts_with("extend schema @link(url: \"https://specs.apollo.dev/federation/v2.3\""));
    assert!(sdl.contains("import: [\"@key\"]"));
    assert!(sdl.contains(r#"type User @key(fields: "id") {"#));
    // The federation machinery itself stays out of the published SDL.
    assert!(!sdl.contains("_entities"));
    assert!(!sdl.contains("_Any"));
    assert!(!sdl.contains("_Service"));
}

#[tokio::test]
async fn entity_keys_must_reference_struct_fields() {
    let result = SchemaBuilder::new()
        .query(
            "ok",
            FieldDef::new(ast::string()).resolve(|_| async { Ok(Value::scalar("ok")) }),
        )
        .entity(
            EntityDef::new("User", user_schema())
                .key("id email")
                .resolve_reference(|_| async { Ok(Value::Null) }),
        )
        .build_federated();
    assert_eq!(
        result.err(),
        Some(SchemaError::UnknownKeyField {
            entity: "User".into(),
            field: "email".into(),
        }),
    );
}

#[tokio::test]
async fn federated_schema_without_queries_still_builds() {
    let schema = SchemaBuilder::new()
        .entity(
            EntityDef::new("User", user_schema())
                .key("id")
                .resolve_reference(|_| async { Ok(Value::Null) }),
        )
        .build_federated()
        .unwrap();
    // `_service` keeps the query root valid on its own.
    assert!(schema.object_meta("Query").unwrap().field("_service").is_some());
}
