// src/middleware.rs
use std::sync::Arc;

use crate::context::Context;
use crate::error::{MazurkaError, MazurkaResult};

/// Outcome of one middleware call. The dispatcher pattern-matches on this
/// instead of inspecting mutable continuation flags on the context.
#[derive(Debug)]
pub enum Flow {
    /// Proceed to the next chain element.
    Continue,
    /// Stop the chain here. The response stays exactly as this element left
    /// it — the early-exit path for auth rejections, cached responses, etc.
    Halt,
    /// Abort the chain; the dispatcher logs the error and renders it through
    /// the error view.
    Fail(MazurkaError),
}

pub(crate) type MiddlewareFn = dyn Fn(&mut Context) -> Flow + Send + Sync;
pub(crate) type ViewFn = dyn Fn(&mut Context) -> MazurkaResult<()> + Send + Sync;
pub(crate) type ErrorViewFn = dyn Fn(&mut Context, &MazurkaError, u16) + Send + Sync;

/// A before/after chain element. Cloning is cheap (shared `Arc`), and clones
/// compare as the *same* middleware for skip-list purposes — identity, not
/// structure, decides whether a skip entry applies.
#[derive(Clone)]
pub struct Middleware(pub(crate) Arc<MiddlewareFn>);

impl Middleware {
    pub fn new(f: impl Fn(&mut Context) -> Flow + Send + Sync + 'static) -> Self {
        Middleware(Arc::new(f))
    }

    pub(crate) fn call(&self, ctx: &mut Context) -> Flow {
        (self.0)(ctx)
    }

    /// Identity comparison used by skip lists.
    pub fn same(&self, other: &Middleware) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// The terminal handler of a route.
#[derive(Clone)]
pub struct View(pub(crate) Arc<ViewFn>);

impl View {
    pub fn new(f: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static) -> Self {
        View(Arc::new(f))
    }

    pub(crate) fn call(&self, ctx: &mut Context) -> MazurkaResult<()> {
        (self.0)(ctx)
    }
}

/// Renders a failed request. Invoked exactly once per failure with the
/// context, the error, and the status code the dispatcher derived.
#[derive(Clone)]
pub struct ErrorView(pub(crate) Arc<ErrorViewFn>);

impl ErrorView {
    pub fn new(f: impl Fn(&mut Context, &MazurkaError, u16) + Send + Sync + 'static) -> Self {
        ErrorView(Arc::new(f))
    }

    pub(crate) fn call(&self, ctx: &mut Context, err: &MazurkaError, status: u16) {
        (self.0)(ctx, err, status)
    }
}

/// Middleware configuration of one group, innermost-first along the route's
/// ancestor chain: (before, after, skip).
pub(crate) type GroupLayer<'a> = (&'a [Middleware], &'a [Middleware], &'a [Middleware]);

/// Flatten a route's middleware configuration into the final before/after
/// sequences, resolved once at compile time.
///
/// Ordering: root group's before list first, descending to the route's own
/// before list immediately ahead of the view; after lists mirror that, route
/// first and root last. The skip set is the union of the route's skip list
/// and every ancestor's, applied by identity — a skipped instance vanishes
/// from this route's chain entirely while staying attached to sibling routes.
/// Duplicate instances across layers are retained, never deduplicated.
pub(crate) fn compose_chain(
    route_before: &[Middleware],
    route_after: &[Middleware],
    route_skip: &[Middleware],
    layers: &[GroupLayer<'_>],
    debug: bool,
) -> (Vec<Middleware>, Vec<Middleware>) {
    let mut skip: Vec<Middleware> = Vec::new();
    skip.extend(route_skip.iter().cloned());
    for (_, _, layer_skip) in layers {
        skip.extend(layer_skip.iter().cloned());
    }
    let skipped = |mw: &Middleware| skip.iter().any(|s| s.same(mw));

    let mut before: Vec<Middleware> = Vec::new();
    if debug {
        before.push(chain_logger());
    }
    // layers run innermost-first; before order is outermost-first
    for (layer_before, _, _) in layers.iter().rev() {
        before.extend(layer_before.iter().filter(|mw| !skipped(mw)).cloned());
    }
    before.extend(route_before.iter().filter(|mw| !skipped(mw)).cloned());

    let mut after: Vec<Middleware> = Vec::new();
    after.extend(route_after.iter().filter(|mw| !skipped(mw)).cloned());
    for (_, layer_after, _) in layers {
        after.extend(layer_after.iter().filter(|mw| !skipped(mw)).cloned());
    }

    (before, after)
}

/// Synthetic middleware prepended to every chain in debug mode.
fn chain_logger() -> Middleware {
    Middleware::new(|ctx: &mut Context| {
        tracing::debug!(
            method = %ctx.request().method,
            path = %ctx.request().path,
            "dispatching"
        );
        Flow::Continue
    })
}
