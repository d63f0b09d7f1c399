use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::json;

use super::schema::{shout_hello_middleware, test_builder, viewer_slot, Database};
use crate::{
    ast,
    execute,
    executor::{OperationInfo, RequestContext},
    extensions::Extension,
    schema::builder::{FieldDef, ObjectDef, SchemaBuilder},
    service::Services,
    value::Value,
    GraphQLError, Middleware, Variables,
};

fn services() -> Services {
    Services::new().provide(Database::new())
}

async fn run(query: &str) -> (Value, Vec<crate::ExecutionError>) {
    let schema = test_builder().build().expect("fixture schema builds");
    execute(query, None, &schema, &Variables::new(), &services())
        .await
        .expect("request-level success")
}

#[tokio::test]
async fn simple_query() {
    let (data, errors) = run("{ hello }").await;
    assert_eq!(data, Value::from(json!({"hello": "world"})));
    assert!(errors.is_empty());
}

#[tokio::test]
async fn argument_decoding() {
    let (data, errors) = run(r#"{ echo(message: "test") }"#).await;
    assert_eq!(data, Value::from(json!({"echo": "test"})));
    assert!(errors.is_empty());
}

#[tokio::test]
async fn nested_computed_field() {
    let (data, errors) = run(r#"{ user(id: "123") { id name posts { id title } } }"#).await;
    assert!(errors.is_empty());
    assert_eq!(
        data,
        Value::from(json!({
            "user": {
                "id": "123",
                "name": "User 123",
                "posts": [
                    {"id": "123-p1", "title": "First"},
                    {"id": "123-p2", "title": "Second"},
                ],
            },
        })),
    );
}

#[tokio::test]
async fn directive_transformer_uppercases() {
    let (data, errors) = run("{ greeting }").await;
    assert_eq!(data, Value::from(json!({"greeting": "HELLO"})));
    assert!(errors.is_empty());
}

#[tokio::test]
async fn aliases_and_typename() {
    let (data, _) = run(r#"{ greetingAlias: greeting __typename }"#).await;
    assert_eq!(
        data,
        Value::from(json!({"greetingAlias": "HELLO", "__typename": "Query"})),
    );
}

#[tokio::test]
async fn variables_are_substituted() {
    let schema = test_builder().build().unwrap();
    let variables: Variables = [("m".to_owned(), Value::scalar("from vars"))]
        .into_iter()
        .collect();
    let (data, _) = execute(
        "query Echo($m: String!) { echo(message: $m) }",
        None,
        &schema,
        &variables,
        &services(),
    )
    .await
    .unwrap();
    assert_eq!(data, Value::from(json!({"echo": "from vars"})));
}

#[tokio::test]
async fn missing_required_variable_is_rejected() {
    let schema = test_builder().build().unwrap();
    let result = execute(
        "query Echo($m: String!) { echo(message: $m) }",
        None,
        &schema,
        &Variables::new(),
        &services(),
    )
    .await;
    assert!(matches!(result, Err(GraphQLError::ValidationError(_))));
}

#[tokio::test]
async fn skip_and_include() {
    let (data, _) = run(
        r#"{ hello @skip(if: true) greeting @include(if: true) }"#,
    )
    .await;
    assert_eq!(data, Value::from(json!({"greeting": "HELLO"})));
}

#[tokio::test]
async fn fragments_spread_into_selection() {
    let (data, _) = run(
        r#"
        { user(id: "7") { ...UserParts } }
        fragment UserParts on User { id name }
        "#,
    )
    .await;
    assert_eq!(
        data,
        Value::from(json!({"user": {"id": "7", "name": "User 7"}})),
    );
}

#[tokio::test]
async fn nullable_field_recovers_to_null() {
    let (data, errors) = run("{ failing { id } }").await;
    assert_eq!(data, Value::from(json!({"failing": null})));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error().message(), "boom");
    assert_eq!(errors[0].path(), ["failing"]);
}

#[tokio::test]
async fn resolver_panics_surface_as_internal_errors() {
    let (data, errors) = run("{ panicking hello }").await;
    assert_eq!(
        data,
        Value::from(json!({"panicking": null, "hello": "world"})),
    );
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error().message(), "Internal error");
    assert_eq!(errors[0].path(), ["panicking"]);
}

#[tokio::test]
async fn non_null_failure_propagates_to_nullable_ancestor() {
    let (data, errors) = run(r#"{ user(id: "1") { id nickname } }"#).await;
    assert_eq!(data, Value::from(json!({"user": null})));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path(), ["user", "nickname"]);
}

#[tokio::test]
async fn unknown_field_fails_validation() {
    let schema = test_builder().build().unwrap();
    let result = execute("{ nope }", None, &schema, &Variables::new(), &services()).await;
    match result {
        Err(GraphQLError::ValidationError(errors)) => {
            assert!(errors[0].message().contains("Unknown field `nope`"));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn parse_errors_never_execute() {
    let schema = test_builder().build().unwrap();
    let result = execute("asd", None, &schema, &Variables::new(), &services()).await;
    assert!(matches!(result, Err(GraphQLError::ParseError(_))));
}

#[tokio::test]
async fn input_object_with_nullable_offset() {
    let (data, errors) = run(r#"{ page(page: {pageSize: 2, offset: null}) }"#).await;
    assert!(errors.is_empty());
    assert_eq!(
        data,
        Value::from(json!({"page": r#"{"pageSize": 2, "offset": null}"#})),
    );
}

#[tokio::test]
async fn negative_page_size_is_an_argument_error() {
    let (data, errors) = run(r#"{ page(page: {pageSize: -1, offset: null}) }"#).await;
    assert_eq!(data, Value::Null);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].error().message().contains("NonNegativeInt"));
}

#[tokio::test]
async fn registration_order_does_not_change_results() {
    // The same registrations in two different orders.
    let forward = test_builder();
    let reversed = SchemaBuilder::new()
        .field(
            "User",
            "posts",
            FieldDef::new(ast::array(ast::named(
                &ast::structure([
                    ast::field("id", ast::string()),
                    ast::field("title", ast::string()),
                ]),
                "Post",
            )))
            .resolve(|_| async { Ok(Value::from(json!([]))) }),
        )
        .query(
            "hello",
            FieldDef::new(ast::string()).resolve(|_| async { Ok(Value::scalar("world")) }),
        )
        .object(ObjectDef::new(
            "Post",
            ast::named(
                &ast::structure([
                    ast::field("id", ast::string()),
                    ast::field("title", ast::string()),
                ]),
                "Post",
            ),
        ))
        .object(ObjectDef::new(
            "User",
            ast::named(
                &ast::structure([
                    ast::field("id", ast::string()),
                    ast::field("name", ast::string()),
                ]),
                "User",
            ),
        ));

    let query = "{ hello }";
    let a = execute(query, None, &forward.build().unwrap(), &Variables::new(), &services())
        .await
        .unwrap();
    let b = execute(query, None, &reversed.build().unwrap(), &Variables::new(), &services())
        .await
        .unwrap();
    assert_eq!(a.0, b.0);
}

#[tokio::test]
async fn colocated_field_is_merged_into_the_type() {
    let schema = test_builder().build().unwrap();
    let user = schema.object_meta("User").unwrap();
    assert!(user.field("posts").is_some());
    assert!(user.field("id").is_some());
}

#[tokio::test]
async fn global_middleware_wraps_matching_fields() {
    let schema = test_builder()
        .middleware(shout_hello_middleware())
        .build()
        .unwrap();
    let (data, _) = execute("{ hello greeting }", None, &schema, &Variables::new(), &services())
        .await
        .unwrap();
    assert_eq!(
        data,
        Value::from(json!({"hello": "world!", "greeting": "HELLO"})),
    );
}

#[tokio::test]
async fn middleware_can_seed_the_context_store() {
    let seed = Middleware::new("seed-viewer", |effect, mcx| {
        mcx.ctx.store().set(viewer_slot(), "alice".to_owned());
        effect
    });
    let schema = test_builder().middleware(seed).build().unwrap();
    let (data, _) = execute("{ viewer }", None, &schema, &Variables::new(), &services())
        .await
        .unwrap();
    assert_eq!(data, Value::from(json!({"viewer": "alice"})));
}

#[derive(Default)]
struct RecordingExtension {
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl Extension for RecordingExtension {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_parse(&self, _source: &str, _ctx: &RequestContext) {
        self.calls.lock().unwrap().push("parse".into());
    }

    async fn on_parse_end(&self, ok: bool, _ctx: &RequestContext) {
        self.calls.lock().unwrap().push(format!("parse_end:{ok}"));
    }

    async fn on_validate(&self, _ctx: &RequestContext) {
        self.calls.lock().unwrap().push("validate".into());
    }

    async fn on_validate_end(&self, errors: usize, _ctx: &RequestContext) {
        self.calls.lock().unwrap().push(format!("validate_end:{errors}"));
    }

    async fn on_execute_start(&self, operation: &OperationInfo, _ctx: &RequestContext) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("execute:{}", operation.operation_type));
    }

    async fn on_execute_end(&self, errors: usize, _ctx: &RequestContext) {
        self.calls.lock().unwrap().push(format!("execute_end:{errors}"));
    }
}

#[tokio::test]
async fn extensions_wrap_every_phase() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let schema = test_builder()
        .extension(RecordingExtension {
            calls: calls.clone(),
        })
        .build()
        .unwrap();
    execute("{ hello }", None, &schema, &Variables::new(), &services())
        .await
        .unwrap();
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "parse".to_owned(),
            "parse_end:true".to_owned(),
            "validate".to_owned(),
            "validate_end:0".to_owned(),
            "execute:query".to_owned(),
            "execute_end:0".to_owned(),
        ],
    );
}

#[tokio::test]
async fn missing_service_surfaces_as_field_error() {
    let schema = test_builder().build().unwrap();
    let (data, errors) = execute(
        r#"{ user(id: "1") { id } }"#,
        None,
        &schema,
        &Variables::new(),
        &Services::new(),
    )
    .await
    .unwrap();
    assert_eq!(data, Value::from(json!({"user": null})));
    assert_eq!(errors.len(), 1);
    assert!(errors[0].error().message().contains("no service registered"));
}

#[tokio::test]
async fn http_request_round_trip() {
    let schema = test_builder().build().unwrap();
    let request: crate::http::GraphQLRequest =
        serde_json::from_str(r#"{"query": "{ hello }"}"#).unwrap();
    let response = request.execute(&schema, &services()).await;
    assert!(response.is_ok());
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"data": {"hello": "world"}}),
    );
}
