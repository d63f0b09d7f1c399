//! Scenario tests running whole requests against a shared fixture schema.

mod federation_tests;
mod query_tests;
pub(crate) mod schema;
mod subscription_tests;
