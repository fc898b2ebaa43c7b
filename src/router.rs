// src/router.rs
//
// Mutable registration phase. Groups live in an arena indexed by `usize`
// with the parent relation stored as an index, so the hierarchy carries no
// owning references; `Group` and `RouteRef` are fluent handles over that
// arena. `compile()` consumes the router and freezes everything into an
// immutable `Dispatch` table.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::Config;
use crate::context::{Context, ContextPool};
use crate::dispatch::{default_error_view, CompiledRoute, Dispatch, Table};
use crate::error::{MazurkaError, MazurkaResult};
use crate::matcher::Matcher;
use crate::middleware::{compose_chain, ErrorView, GroupLayer, Middleware, View};
use crate::static_files::StaticFiles;

/// Per-route deadline. When the composed handler overruns the duration, the
/// client sees this status and message instead of whatever the handler was
/// still producing.
#[derive(Debug, Clone)]
pub struct Timeout {
    pub duration: Duration,
    pub status: u16,
    pub message: String,
}

pub(crate) struct GroupNode {
    prefix: String,
    parent: Option<usize>,
    before: Vec<Middleware>,
    after: Vec<Middleware>,
    skip: Vec<Middleware>,
    error_view: Option<ErrorView>,
    handle_options: bool,
}

pub(crate) struct RouteDef {
    method: crate::http::Method,
    pattern: String,
    group: usize,
    view: View,
    before: Vec<Middleware>,
    after: Vec<Middleware>,
    skip: Vec<Middleware>,
    timeout: Option<Timeout>,
}

/// Route and group registry for one server instance (or one virtual host).
///
/// Everything here is mutable until [`Router::compile`] runs; after that the
/// dispatch table is read-only and shared freely across request threads.
pub struct Router {
    groups: Vec<GroupNode>,
    routes: Vec<RouteDef>,
    vhosts: Vec<(String, Router)>,
    not_found: Option<View>,
    method_not_allowed: Option<View>,
    debug: bool,
    pool_capacity: usize,
}

impl Router {
    pub fn new() -> Self {
        Router {
            groups: vec![GroupNode {
                prefix: String::new(),
                parent: None,
                before: Vec::new(),
                after: Vec::new(),
                skip: Vec::new(),
                error_view: None,
                handle_options: true,
            }],
            routes: Vec::new(),
            vhosts: Vec::new(),
            not_found: None,
            method_not_allowed: None,
            debug: false,
            pool_capacity: 512,
        }
    }

    pub fn with_config(config: &Config) -> Self {
        let mut router = Router::new();
        router.debug = config.debug;
        router.pool_capacity = config.context_pool_size;
        router
    }

    /// Enable the synthetic chain logger prepended to every route's chain.
    pub fn set_debug(&mut self, on: bool) -> &mut Self {
        self.debug = on;
        self
    }

    /// How many idle context states the pool retains.
    pub fn set_pool_capacity(&mut self, capacity: usize) -> &mut Self {
        self.pool_capacity = capacity;
        self
    }

    /// Handle on the root group.
    pub fn root(&mut self) -> Group<'_> {
        Group { router: self, id: 0 }
    }

    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        let id = self.add_group(0, prefix);
        Group { router: self, id }
    }

    pub fn route(
        &mut self,
        method: &str,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        let id = self.add_route(0, method, pattern, View::new(view));
        RouteRef { router: self, id }
    }

    /// Register an already-built view, e.g. one produced by
    /// [`StaticFiles::into_view`].
    pub fn mount(&mut self, method: &str, pattern: &str, view: View) -> RouteRef<'_> {
        let id = self.add_route(0, method, pattern, view);
        RouteRef { router: self, id }
    }

    pub fn get(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("GET", pattern, view)
    }

    pub fn post(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("POST", pattern, view)
    }

    pub fn put(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("PUT", pattern, view)
    }

    pub fn delete(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("DELETE", pattern, view)
    }

    pub fn patch(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("PATCH", pattern, view)
    }

    pub fn head(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("HEAD", pattern, view)
    }

    pub fn options(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("OPTIONS", pattern, view)
    }

    /// Root-group before-middleware, runs ahead of every route's own chain.
    pub fn before(&mut self, mw: Middleware) -> &mut Self {
        self.groups[0].before.push(mw);
        self
    }

    pub fn after(&mut self, mw: Middleware) -> &mut Self {
        self.groups[0].after.push(mw);
        self
    }

    pub fn skip(&mut self, mw: Middleware) -> &mut Self {
        self.groups[0].skip.push(mw);
        self
    }

    pub fn error_view(
        &mut self,
        f: impl Fn(&mut Context, &MazurkaError, u16) + Send + Sync + 'static,
    ) -> &mut Self {
        self.groups[0].error_view = Some(ErrorView::new(f));
        self
    }

    /// Toggle automatic OPTIONS responders for routes under the root group.
    pub fn handle_options(&mut self, on: bool) -> &mut Self {
        self.groups[0].handle_options = on;
        self
    }

    pub fn not_found(
        &mut self,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.not_found = Some(View::new(view));
        self
    }

    pub fn method_not_allowed(
        &mut self,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.method_not_allowed = Some(View::new(view));
        self
    }

    /// Serve `files` under `prefix/*filepath`.
    pub fn static_files(&mut self, prefix: &str, files: StaticFiles) -> RouteRef<'_> {
        let pattern = format!("{}/*filepath", prefix.trim_end_matches('/'));
        self.mount("GET", &pattern, files.into_view())
    }

    /// Alternate route table for one hostname. Must be configured before
    /// [`Router::compile`]; the hostname map is frozen with everything else.
    pub fn virtual_host(&mut self, host: &str) -> &mut Router {
        if self.vhosts.iter().any(|(h, _)| h == host) {
            panic!("a router is already registered for virtual host {host}");
        }
        self.vhosts.push((host.to_string(), Router::new()));
        &mut self.vhosts.last_mut().expect("just pushed").1
    }

    fn add_group(&mut self, parent: usize, prefix: &str) -> usize {
        // Children inherit the auto-OPTIONS flag; the error view is
        // inherited implicitly by the compile-time walk up the chain.
        let handle_options = self.groups[parent].handle_options;
        self.groups.push(GroupNode {
            prefix: prefix.to_string(),
            parent: Some(parent),
            before: Vec::new(),
            after: Vec::new(),
            skip: Vec::new(),
            error_view: None,
            handle_options,
        });
        self.groups.len() - 1
    }

    fn add_route(&mut self, group: usize, method: &str, pattern: &str, view: View) -> usize {
        let method = crate::http::Method::parse(method).unwrap_or_else(|| {
            panic!("invalid HTTP method {method:?}: route methods must be registered uppercase")
        });
        self.routes.push(RouteDef {
            method,
            pattern: pattern.to_string(),
            group,
            view,
            before: Vec::new(),
            after: Vec::new(),
            skip: Vec::new(),
            timeout: None,
        });
        self.routes.len() - 1
    }

    fn full_url(&self, group: usize, pattern: &str) -> String {
        let mut prefixes = Vec::new();
        let mut cursor = Some(group);
        while let Some(id) = cursor {
            prefixes.push(self.groups[id].prefix.as_str());
            cursor = self.groups[id].parent;
        }
        prefixes.reverse();
        let mut url = prefixes.concat();
        url.push_str(pattern);
        url
    }

    /// Freeze the router into an immutable dispatch table. Nothing can be
    /// registered or reconfigured afterwards; the table is shared read-only
    /// across request threads.
    pub fn compile(mut self) -> Dispatch {
        let pool = ContextPool::new(self.pool_capacity);
        let vhosts = std::mem::take(&mut self.vhosts);
        let mut host_tables = HashMap::new();
        for (host, sub) in vhosts {
            if !sub.vhosts.is_empty() {
                panic!("virtual host {host} cannot itself declare virtual hosts");
            }
            host_tables.insert(host, sub.compile_table());
        }
        let table = self.compile_table();
        Dispatch::new(table, host_tables, pool)
    }

    fn compile_table(self) -> Table {
        let mut matcher = Matcher::new();
        let mut compiled: Vec<CompiledRoute> = Vec::new();

        // Full-URL registry in registration order; drives Allow enumeration
        // and the synthetic OPTIONS pass.
        struct UrlEntry {
            url: String,
            routes: Vec<usize>,
            has_options: bool,
        }
        let mut urls: Vec<UrlEntry> = Vec::new();

        for (idx, route) in self.routes.iter().enumerate() {
            let url = self.full_url(route.group, &route.pattern);
            let is_options = route.method == crate::http::Method::Options;
            match urls.iter_mut().find(|e| e.url == url) {
                Some(entry) => {
                    entry.routes.push(idx);
                    entry.has_options |= is_options;
                }
                None => urls.push(UrlEntry {
                    url,
                    routes: vec![idx],
                    has_options: is_options,
                }),
            }
        }

        for (idx, route) in self.routes.iter().enumerate() {
            compiled.push(self.compile_route(route));
            let url = self.full_url(route.group, &route.pattern);
            matcher.insert(route.method, &url, idx);
        }

        // Synthesize an OPTIONS responder per URL unless the user registered
        // one or the owning group opted out. It advertises every other
        // method on the URL and then forwards to the first-registered view,
        // reusing that route's composed chain.
        for entry in &urls {
            let first = entry.routes[0];
            if entry.has_options || !self.groups[self.routes[first].group].handle_options {
                continue;
            }
            let others: Vec<&'static str> = entry
                .routes
                .iter()
                .map(|&i| self.routes[i].method.as_str())
                .filter(|m| *m != "OPTIONS")
                .collect();
            let allow = if others.is_empty() {
                "OPTIONS".to_string()
            } else {
                others.join(", ")
            };

            let mut synthetic = compiled[first].clone();
            let target = synthetic.view.clone();
            synthetic.view = View::new(move |ctx: &mut Context| {
                ctx.response().set_header("Allow", allow.clone());
                target.call(ctx)
            });
            compiled.push(synthetic);
            matcher.insert(crate::http::Method::Options, &entry.url, compiled.len() - 1);
        }

        Table {
            matcher,
            routes: compiled,
            not_found: self.not_found,
            method_not_allowed: self.method_not_allowed,
            default_error: default_error_view(),
        }
    }

    fn compile_route(&self, route: &RouteDef) -> CompiledRoute {
        let mut layers: Vec<GroupLayer<'_>> = Vec::new();
        let mut cursor = Some(route.group);
        while let Some(id) = cursor {
            let g = &self.groups[id];
            layers.push((&g.before[..], &g.after[..], &g.skip[..]));
            cursor = g.parent;
        }

        let (before, after) = compose_chain(
            &route.before,
            &route.after,
            &route.skip,
            &layers,
            self.debug,
        );

        // Innermost group with an error view wins; default otherwise.
        let mut error_view = None;
        let mut cursor = Some(route.group);
        while let Some(id) = cursor {
            if let Some(ev) = &self.groups[id].error_view {
                error_view = Some(ev.clone());
                break;
            }
            cursor = self.groups[id].parent;
        }

        CompiledRoute {
            before,
            view: route.view.clone(),
            after,
            error_view: error_view.unwrap_or_else(default_error_view),
            timeout: route.timeout.clone(),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent handle on one group in the arena.
pub struct Group<'r> {
    router: &'r mut Router,
    id: usize,
}

impl<'r> Group<'r> {
    /// Child scope under this group's prefix.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        let id = self.router.add_group(self.id, prefix);
        Group {
            router: &mut *self.router,
            id,
        }
    }

    pub fn before(&mut self, mw: Middleware) -> &mut Self {
        self.router.groups[self.id].before.push(mw);
        self
    }

    pub fn after(&mut self, mw: Middleware) -> &mut Self {
        self.router.groups[self.id].after.push(mw);
        self
    }

    /// Exclude a middleware instance (by identity) from every chain under
    /// this group, no matter which ancestor attached it.
    pub fn skip(&mut self, mw: Middleware) -> &mut Self {
        self.router.groups[self.id].skip.push(mw);
        self
    }

    pub fn error_view(
        &mut self,
        f: impl Fn(&mut Context, &MazurkaError, u16) + Send + Sync + 'static,
    ) -> &mut Self {
        self.router.groups[self.id].error_view = Some(ErrorView::new(f));
        self
    }

    pub fn handle_options(&mut self, on: bool) -> &mut Self {
        self.router.groups[self.id].handle_options = on;
        self
    }

    pub fn route(
        &mut self,
        method: &str,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        let id = self.router.add_route(self.id, method, pattern, View::new(view));
        RouteRef {
            router: &mut *self.router,
            id,
        }
    }

    pub fn mount(&mut self, method: &str, pattern: &str, view: View) -> RouteRef<'_> {
        let id = self.router.add_route(self.id, method, pattern, view);
        RouteRef {
            router: &mut *self.router,
            id,
        }
    }

    pub fn get(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("GET", pattern, view)
    }

    pub fn post(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("POST", pattern, view)
    }

    pub fn put(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("PUT", pattern, view)
    }

    pub fn delete(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("DELETE", pattern, view)
    }

    pub fn patch(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("PATCH", pattern, view)
    }

    pub fn head(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("HEAD", pattern, view)
    }

    pub fn options(
        &mut self,
        pattern: &str,
        view: impl Fn(&mut Context) -> MazurkaResult<()> + Send + Sync + 'static,
    ) -> RouteRef<'_> {
        self.route("OPTIONS", pattern, view)
    }

    pub fn static_files(&mut self, prefix: &str, files: StaticFiles) -> RouteRef<'_> {
        let pattern = format!("{}/*filepath", prefix.trim_end_matches('/'));
        self.mount("GET", &pattern, files.into_view())
    }
}

/// Fluent handle on one registered route, valid until `compile()`.
pub struct RouteRef<'r> {
    router: &'r mut Router,
    id: usize,
}

impl<'r> RouteRef<'r> {
    pub fn before(&mut self, mw: Middleware) -> &mut Self {
        self.router.routes[self.id].before.push(mw);
        self
    }

    pub fn after(&mut self, mw: Middleware) -> &mut Self {
        self.router.routes[self.id].after.push(mw);
        self
    }

    pub fn skip(&mut self, mw: Middleware) -> &mut Self {
        self.router.routes[self.id].skip.push(mw);
        self
    }

    /// Deadline with the conventional 408 status.
    pub fn timeout(&mut self, duration: Duration, message: impl Into<String>) -> &mut Self {
        self.timeout_with_code(duration, message, 408)
    }

    pub fn timeout_with_code(
        &mut self,
        duration: Duration,
        message: impl Into<String>,
        status: u16,
    ) -> &mut Self {
        self.router.routes[self.id].timeout = Some(Timeout {
            duration,
            status,
            message: message.into(),
        });
        self
    }
}
