//! Observers attached to the execution-phase boundaries.

use async_trait::async_trait;

use crate::executor::{OperationInfo, RequestContext};

/// An observer of the parse, validate, and execute phases of a request.
///
/// Every hook has a no-op default, so implementors override only the
/// boundaries they care about. Hooks run in registration order before the
/// phase and in reverse order after it, wrapping the phase like layered
/// middleware.
#[async_trait]
pub trait Extension: Send + Sync {
    /// A short name used in diagnostics.
    fn name(&self) -> &str {
        "extension"
    }

    /// Runs before the document is parsed.
    async fn on_parse(&self, source: &str, ctx: &RequestContext) {
        let _ = (source, ctx);
    }

    /// Runs after parsing; `ok` is `false` when parsing failed.
    async fn on_parse_end(&self, ok: bool, ctx: &RequestContext) {
        let _ = (ok, ctx);
    }

    /// Runs before document validation.
    async fn on_validate(&self, ctx: &RequestContext) {
        let _ = ctx;
    }

    /// Runs after validation with the number of rule errors found.
    async fn on_validate_end(&self, errors: usize, ctx: &RequestContext) {
        let _ = (errors, ctx);
    }

    /// Runs before the operation executes.
    async fn on_execute_start(&self, operation: &OperationInfo, ctx: &RequestContext) {
        let _ = (operation, ctx);
    }

    /// Runs after execution with the number of field errors collected.
    async fn on_execute_end(&self, errors: usize, ctx: &RequestContext) {
        let _ = (errors, ctx);
    }
}
