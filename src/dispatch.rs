// src/dispatch.rs
//
// The compiled, immutable side of the framework. One `Dispatch` per server
// instance; the surrounding protocol layer calls `handle` once per request
// from however many threads it likes. The table and chains are frozen at
// compile time, so the context pool's mutex is the only shared mutable
// state touched per request.

use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;

use crate::context::{Context, ContextPool, ContextState};
use crate::error::MazurkaError;
use crate::http::Exchange;
use crate::matcher::{Lookup, Matcher};
use crate::middleware::{ErrorView, Flow, Middleware, View};
use crate::router::Timeout;

/// One route after chain composition: the flat before/view/after sequence,
/// the resolved error view, and the optional deadline.
#[derive(Clone)]
pub(crate) struct CompiledRoute {
    pub(crate) before: Vec<Middleware>,
    pub(crate) view: View,
    pub(crate) after: Vec<Middleware>,
    pub(crate) error_view: ErrorView,
    pub(crate) timeout: Option<Timeout>,
}

/// Route table for one hostname.
pub(crate) struct Table {
    pub(crate) matcher: Matcher,
    pub(crate) routes: Vec<CompiledRoute>,
    pub(crate) not_found: Option<View>,
    pub(crate) method_not_allowed: Option<View>,
    pub(crate) default_error: ErrorView,
}

/// Immutable dispatch table produced by [`Router::compile`](crate::Router::compile).
pub struct Dispatch {
    table: Table,
    vhosts: HashMap<String, Table>,
    pool: ContextPool,
}

impl Dispatch {
    pub(crate) fn new(table: Table, vhosts: HashMap<String, Table>, pool: ContextPool) -> Self {
        Dispatch {
            table,
            vhosts,
            pool,
        }
    }

    /// The inbound entry point: one call per request, no return value. All
    /// outcomes land on `exchange.response`.
    pub fn handle(&self, exchange: &mut Exchange) {
        let host = exchange.request.host.clone();
        let table = host
            .as_deref()
            .and_then(|host| self.vhosts.get(host))
            .unwrap_or(&self.table);

        let mut state = self.pool.acquire();
        let lookup = table.matcher.lookup(
            exchange.request.method,
            &exchange.request.path,
            &mut state.params,
        );

        match lookup {
            Lookup::Found(idx) => {
                let route = &table.routes[idx];
                match &route.timeout {
                    Some(timeout) => {
                        // Timed routes run on a detached exchange with a
                        // fresh state: an abandoned worker must never touch
                        // a recycled pool slot.
                        let mut detached = Box::<ContextState>::default();
                        std::mem::swap(&mut detached.params, &mut state.params);
                        run_with_timeout(route.clone(), timeout.clone(), exchange, detached);
                    }
                    None => run_route(route, exchange, &mut state),
                }
            }
            Lookup::MethodNotAllowed(allowed) => {
                let allow = allowed
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                exchange.response.status = 405;
                exchange.response.set_header("Allow", allow);
                match &table.method_not_allowed {
                    Some(view) => {
                        let mut ctx = Context::new(exchange, &mut state);
                        if let Err(err) = view.call(&mut ctx) {
                            fail(&table.default_error, &mut ctx, err);
                        }
                    }
                    None => {
                        exchange.response.set_header("Content-Type", "text/plain; charset=utf-8");
                        exchange.response.set_body("Method Not Allowed");
                    }
                }
            }
            Lookup::NotFound => {
                exchange.response.status = 404;
                match &table.not_found {
                    Some(view) => {
                        let mut ctx = Context::new(exchange, &mut state);
                        if let Err(err) = view.call(&mut ctx) {
                            fail(&table.default_error, &mut ctx, err);
                        }
                    }
                    None => {
                        exchange.response.set_header("Content-Type", "text/plain; charset=utf-8");
                        exchange.response.set_body("Not Found");
                    }
                }
            }
        }

        // Exactly one release per request, whichever path was taken.
        self.pool.release(state);
    }

    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }
}

/// Walk the composed chain: before-middleware, then the view (unless a
/// before element flagged it skipped), then after-middleware. `Halt`
/// short-circuits the rest of the chain silently; `Fail` and view errors go
/// through the error view exactly once.
fn run_route(route: &CompiledRoute, exchange: &mut Exchange, state: &mut ContextState) {
    let mut ctx = Context::new(exchange, state);

    for mw in &route.before {
        match mw.call(&mut ctx) {
            Flow::Continue => {}
            Flow::Halt => return,
            Flow::Fail(err) => {
                fail(&route.error_view, &mut ctx, err);
                return;
            }
        }
    }

    if !ctx.view_skipped() {
        if let Err(err) = route.view.call(&mut ctx) {
            fail(&route.error_view, &mut ctx, err);
            return;
        }
    }

    for mw in &route.after {
        match mw.call(&mut ctx) {
            Flow::Continue => {}
            Flow::Halt => return,
            Flow::Fail(err) => {
                fail(&route.error_view, &mut ctx, err);
                return;
            }
        }
    }
}

/// Error state: keep a status the failing element already set, otherwise
/// derive one from the error itself, then log and render.
fn fail(error_view: &ErrorView, ctx: &mut Context, err: MazurkaError) {
    let status = if ctx.exchange.response.status == 200 {
        err.status_code()
    } else {
        ctx.exchange.response.status
    };
    tracing::error!(error = %err, status, path = %ctx.exchange.request.path, "request failed");
    error_view.call(ctx, &err, status);
}

/// Race the chain against a deadline. The chain runs on its own thread
/// against a copy of the exchange; if the deadline fires first the client
/// gets the configured timeout response and the worker's copy is dropped
/// whenever it finishes, so late writes never reach the real response.
fn run_with_timeout(
    route: CompiledRoute,
    timeout: Timeout,
    exchange: &mut Exchange,
    mut state: Box<ContextState>,
) {
    let mut work = Exchange {
        request: exchange.request.clone(),
        response: std::mem::take(&mut exchange.response),
    };

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        run_route(&route, &mut work, &mut state);
        let _ = tx.send(work);
    });

    match rx.recv_timeout(timeout.duration) {
        Ok(done) => exchange.response = done.response,
        Err(_) => {
            tracing::warn!(
                path = %exchange.request.path,
                after_ms = timeout.duration.as_millis() as u64,
                "handler exceeded deadline"
            );
            exchange.response.status = timeout.status;
            exchange.response.set_header("Content-Type", "text/plain; charset=utf-8");
            exchange.response.set_body(timeout.message.clone());
        }
    }
}

/// Writes the error's message as a plain body with the derived status.
/// Production deployments usually override this per group to hide internals.
pub(crate) fn default_error_view() -> ErrorView {
    ErrorView::new(|ctx: &mut Context, err: &MazurkaError, status: u16| {
        ctx.exchange.response.status = status;
        ctx.exchange
            .response
            .set_header("Content-Type", "text/plain; charset=utf-8");
        ctx.exchange.response.set_body(err.to_string());
    })
}
