//! Cross-cutting behavior wrapped around resolver effects.

use std::sync::Arc;

use super::{RequestContext, ResolverEffect};
use crate::value::Value;

/// Static information about the field a middleware is wrapping.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldInfo {
    /// The name of the type the field lives on (`Query` for root fields).
    pub parent_type: String,
    /// The field name.
    pub field_name: String,
}

/// The per-invocation context handed to each middleware.
pub struct MiddlewareContext {
    /// The parent value the field is being resolved on.
    pub parent: Value,
    /// The decoded arguments.
    pub args: Value,
    /// Static field information.
    pub info: FieldInfo,
    /// The request context.
    pub ctx: RequestContext,
}

/// A transformer of resolver effects.
pub type MiddlewareFn =
    Arc<dyn Fn(ResolverEffect, &MiddlewareContext) -> ResolverEffect + Send + Sync>;

/// A directive's resolver transformer: receives the directive's decoded
/// constant arguments and the remaining effect chain.
pub type DirectiveApplyFn = Arc<dyn Fn(Value, ResolverEffect) -> ResolverEffect + Send + Sync>;

type MatchFn = Arc<dyn Fn(&FieldInfo) -> bool + Send + Sync>;

/// A named, optionally field-scoped middleware registration.
#[derive(Clone)]
pub struct Middleware {
    name: String,
    matcher: Option<MatchFn>,
    apply: MiddlewareFn,
}

impl Middleware {
    /// Creates a middleware wrapping every field's resolver effect.
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(ResolverEffect, &MiddlewareContext) -> ResolverEffect + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            matcher: None,
            apply: Arc::new(apply),
        }
    }

    /// Restricts the middleware to fields accepted by `matcher`.
    pub fn when<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&FieldInfo) -> bool + Send + Sync + 'static,
    {
        self.matcher = Some(Arc::new(matcher));
        self
    }

    /// The registration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn applies_to(&self, info: &FieldInfo) -> bool {
        self.matcher.as_ref().map_or(true, |m| m(info))
    }

    pub(crate) fn apply_fn(&self) -> MiddlewareFn {
        self.apply.clone()
    }
}

/// Wraps `innermost` with `chain`, outermost first: the first entry observes
/// (and may replace) the effect produced by everything after it.
pub(crate) fn apply_chain(
    chain: &[MiddlewareFn],
    innermost: ResolverEffect,
    mcx: &MiddlewareContext,
) -> ResolverEffect {
    let mut effect = innermost;
    for mw in chain.iter().rev() {
        effect = mw(effect, mcx);
    }
    effect
}
