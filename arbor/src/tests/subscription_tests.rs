use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::schema::{test_builder, Database};
use crate::{
    resolve_into_stream, service::Services, value::Value, ExecutionOutput, GraphQLError,
    Variables,
};

fn services() -> Services {
    Services::new().provide(Database::new())
}

#[tokio::test]
async fn countdown_emits_each_value_then_completes() {
    let schema = Arc::new(test_builder().build().unwrap());
    let stream = resolve_into_stream(
        "subscription { countdown(from: 5) }",
        None,
        &schema,
        &Variables::new(),
        &services(),
    )
    .await
    .unwrap();

    let outputs: Vec<ExecutionOutput> = stream.collect().await;
    assert_eq!(outputs.len(), 5);
    for (idx, expected) in (1..=5).rev().enumerate() {
        assert_eq!(
            outputs[idx],
            ExecutionOutput {
                data: Value::from(json!({"countdown": expected})),
                errors: vec![],
            },
        );
    }
}

#[tokio::test]
async fn per_item_failures_keep_the_stream_alive() {
    let schema = Arc::new(test_builder().build().unwrap());
    let stream = resolve_into_stream(
        "subscription { flaky }",
        None,
        &schema,
        &Variables::new(),
        &services(),
    )
    .await
    .unwrap();

    let outputs: Vec<ExecutionOutput> = stream.collect().await;
    assert_eq!(outputs.len(), 3);
    assert_eq!(outputs[0].data, Value::from(json!({"flaky": 1})));
    assert!(outputs[0].errors.is_empty());
    assert_eq!(outputs[1].data, Value::from(json!({"flaky": null})));
    assert_eq!(outputs[1].errors.len(), 1);
    assert_eq!(outputs[1].errors[0].error().message(), "lost event");
    assert_eq!(outputs[2].data, Value::from(json!({"flaky": 3})));
}

#[tokio::test]
async fn setup_failure_aborts_the_subscription() {
    let schema = Arc::new(test_builder().build().unwrap());
    let result = resolve_into_stream(
        "subscription { broken }",
        None,
        &schema,
        &Variables::new(),
        &services(),
    )
    .await;
    match result {
        Err(GraphQLError::SubscriptionSetupError(error)) => {
            assert_eq!(error.error().message(), "cannot subscribe");
            assert_eq!(error.path(), ["broken"]);
        }
        other => panic!("expected a setup error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn queries_are_rejected_by_the_stream_entry_point() {
    let schema = Arc::new(test_builder().build().unwrap());
    let result = resolve_into_stream(
        "{ hello }",
        None,
        &schema,
        &Variables::new(),
        &services(),
    )
    .await;
    assert!(matches!(result, Err(GraphQLError::NotSubscription)));
}

#[tokio::test]
async fn subscriptions_are_rejected_by_the_query_entry_point() {
    let schema = test_builder().build().unwrap();
    let result = crate::execute(
        "subscription { countdown(from: 2) }",
        None,
        &schema,
        &Variables::new(),
        &services(),
    )
    .await;
    assert!(matches!(result, Err(GraphQLError::IsSubscription)));
}

#[tokio::test]
async fn multiple_root_fields_are_rejected() {
    let schema = Arc::new(test_builder().build().unwrap());
    let result = resolve_into_stream(
        "subscription { countdown(from: 2) flaky }",
        None,
        &schema,
        &Variables::new(),
        &services(),
    )
    .await;
    assert!(matches!(result, Err(GraphQLError::ValidationError(_))));
}
