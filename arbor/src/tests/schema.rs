//! The shared fixture schema the scenario tests run against.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures::{stream, StreamExt};
use serde_json::json;

use crate::{
    ast,
    context::{self, Slot},
    executor::{FieldError, SubscriptionStream},
    schema::builder::{
        DirectiveDef, FieldDef, ObjectDef, SchemaBuilder, SubscriptionFieldDef,
    },
    schema::meta::{DirectiveAnnotation, DirectiveLocation},
    value::{ScalarValue, Value},
    Middleware,
};

/// A request-counting data source handed to resolvers through the service
/// container.
pub struct Database {
    pub lookups: AtomicUsize,
}

impl Database {
    pub fn new() -> Self {
        Self {
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn user(&self, id: &str) -> Value {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Value::from(json!({"id": id, "name": format!("User {id}")}))
    }
}

/// The slot the viewer's name travels in.
pub fn viewer_slot() -> Slot<String> {
    context::make::<String>("tests.viewer")
}

fn user_schema() -> ast::SchemaRef {
    ast::named(
        &ast::structure([
            ast::field("id", ast::string()),
            ast::field("name", ast::string()),
        ]),
        "User",
    )
}

fn post_schema() -> ast::SchemaRef {
    ast::named(
        &ast::structure([
            ast::field("id", ast::string()),
            ast::field("title", ast::string()),
        ]),
        "Post",
    )
}

fn page_schema() -> ast::SchemaRef {
    ast::named(
        &ast::structure([
            ast::field("pageSize", ast::non_negative_int()),
            ast::field("offset", ast::option_from_null_or(ast::int())),
        ]),
        "Page",
    )
}

pub fn test_builder() -> SchemaBuilder {
    SchemaBuilder::new()
        .object(ObjectDef::new("User", user_schema()))
        .object(ObjectDef::new("Post", post_schema()))
        .directive(
            DirectiveDef::new("upper", [DirectiveLocation::FieldDefinition]).transform(
                |_args, effect| {
                    Box::pin(async move {
                        match effect.await? {
                            Value::Scalar(ScalarValue::String(s)) => {
                                Ok(Value::scalar(s.to_uppercase()))
                            }
                            other => Ok(other),
                        }
                    })
                },
            ),
        )
        .query(
            "hello",
            FieldDef::new(ast::string()).resolve(|_| async { Ok(Value::scalar("world")) }),
        )
        .query(
            "echo",
            FieldDef::new(ast::string())
                .args(ast::structure([ast::field("message", ast::string())]))
                .resolve(|rargs| async move {
                    let message = rargs
                        .args
                        .as_object()
                        .and_then(|o| o.get_field_value("message"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    Ok(message)
                }),
        )
        .query(
            "greeting",
            FieldDef::new(ast::string())
                .directive(DirectiveAnnotation::new("upper"))
                .resolve(|_| async { Ok(Value::scalar("hello")) }),
        )
        .query(
            "user",
            FieldDef::new(ast::null_or(user_schema()))
                .args(ast::structure([ast::field("id", ast::string())]))
                .resolve(|rargs| async move {
                    let db = rargs.ctx.service::<Database>()?;
                    let id = rargs
                        .args
                        .as_object()
                        .and_then(|o| o.get_field_value("id"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned();
                    Ok(db.user(&id))
                }),
        )
        .query(
            "viewer",
            FieldDef::new(ast::null_or(ast::string())).resolve(|rargs| async move {
                match rargs.ctx.store().get_option(viewer_slot()) {
                    Some(name) => Ok(Value::scalar((*name).clone())),
                    None => Ok(Value::Null),
                }
            }),
        )
        .query(
            "page",
            FieldDef::new(ast::string())
                .args(ast::structure([ast::field("page", page_schema())]))
                .resolve(|rargs| async move {
                    let page = rargs
                        .args
                        .as_object()
                        .and_then(|o| o.get_field_value("page"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    Ok(Value::scalar(page.to_string()))
                }),
        )
        .query(
            "failing",
            FieldDef::new(ast::null_or(user_schema())).resolve(|_| async {
                Err(FieldError::from("boom"))
            }),
        )
        .query(
            "panicking",
            FieldDef::new(ast::null_or(ast::string())).resolve(|_| async {
                panic!("resolver blew up");
                #[allow(unreachable_code)]
                Ok(Value::Null)
            }),
        )
        .field(
            "User",
            "posts",
            FieldDef::new(ast::array(post_schema())).resolve(|rargs| async move {
                let user_id = rargs
                    .parent
                    .as_object()
                    .and_then(|o| o.get_field_value("id"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                Ok(Value::from(json!([
                    {"id": format!("{user_id}-p1"), "title": "First"},
                    {"id": format!("{user_id}-p2"), "title": "Second"},
                ])))
            }),
        )
        .field(
            "User",
            "nickname",
            FieldDef::new(ast::string()).resolve(|_| async { Err(FieldError::from("no nickname")) }),
        )
        .subscription(
            "countdown",
            SubscriptionFieldDef::new(ast::int())
                .args(ast::structure([ast::field("from", ast::int())]))
                .subscribe(|rargs| async move {
                    let from = rargs
                        .args
                        .as_object()
                        .and_then(|o| o.get_field_value("from"))
                        .and_then(Value::as_int)
                        .unwrap_or(0);
                    let stream: SubscriptionStream = stream::iter(
                        (1..=from).rev().map(|n| Ok(Value::scalar(n))),
                    )
                    .boxed();
                    Ok(stream)
                }),
        )
        .subscription(
            "flaky",
            SubscriptionFieldDef::new(ast::int()).subscribe(|_| async {
                let stream: SubscriptionStream = stream::iter([
                    Ok(Value::scalar(1)),
                    Err(FieldError::from("lost event")),
                    Ok(Value::scalar(3)),
                ])
                .boxed();
                Ok(stream)
            }),
        )
        .subscription(
            "broken",
            SubscriptionFieldDef::new(ast::int())
                .subscribe(|_| async { Err(FieldError::from("cannot subscribe")) }),
        )
}

/// A middleware that rewrites the result of `Query.hello` when installed.
pub fn shout_hello_middleware() -> Middleware {
    Middleware::new("shout-hello", |effect, _mcx| {
        Box::pin(async move {
            match effect.await? {
                Value::Scalar(ScalarValue::String(s)) => Ok(Value::scalar(format!("{s}!"))),
                other => Ok(other),
            }
        })
    })
    .when(|info| info.parent_type == "Query" && info.field_name == "hello")
}
