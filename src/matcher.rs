// src/matcher.rs
//
// Segment trie behind the compiled dispatch table. Patterns support static
// segments, `:name` parameters and a trailing `*name` wildcard. Nodes carry
// route indices into the compiled arena, never handlers, and the per-node
// method table preserves insertion order so `Allow` headers come out
// deterministic.

use crate::http::Method;

#[derive(Debug)]
struct Node {
    path: String,
    routes: Vec<(Method, usize)>,
    children: Vec<Node>,
    is_param: bool,
    param_name: Option<String>,
    is_wildcard: bool,
}

impl Node {
    fn new(path: String) -> Self {
        Node {
            path,
            routes: Vec::new(),
            children: Vec::new(),
            is_param: false,
            param_name: None,
            is_wildcard: false,
        }
    }

    fn route_for(&self, method: Method) -> Option<usize> {
        self.routes
            .iter()
            .find(|(m, _)| *m == method)
            .map(|(_, idx)| *idx)
    }
}

#[derive(Debug)]
pub(crate) enum Lookup {
    /// Index into the compiled route arena; params were written to the
    /// caller's buffer.
    Found(usize),
    /// The path exists but not under this method.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

#[derive(Debug)]
pub(crate) struct Matcher {
    root: Node,
}

impl Matcher {
    pub(crate) fn new() -> Self {
        Matcher {
            root: Node::new(String::new()),
        }
    }

    /// Insert a compiled route. Duplicate method+path registrations are a
    /// configuration error and abort startup.
    pub(crate) fn insert(&mut self, method: Method, path: &str, route: usize) {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut current = &mut self.root;

        for segment in segments {
            let is_param = segment.starts_with(':');
            let is_wildcard = segment.starts_with('*');

            let param_name = if is_param || is_wildcard {
                Some(segment[1..].to_string())
            } else {
                None
            };

            let segment_path = if is_param || is_wildcard {
                String::new()
            } else {
                segment.to_string()
            };

            let mut found_idx = None;
            for (i, child) in current.children.iter().enumerate() {
                if child.is_param == is_param && child.is_wildcard == is_wildcard {
                    if is_param || is_wildcard || child.path == segment_path {
                        found_idx = Some(i);
                        break;
                    }
                }
            }

            if let Some(idx) = found_idx {
                current = &mut current.children[idx];
            } else {
                let mut node = Node::new(segment_path);
                node.is_param = is_param;
                node.param_name = param_name;
                node.is_wildcard = is_wildcard;
                current.children.push(node);
                current = current.children.last_mut().unwrap();
            }
        }

        if current.routes.iter().any(|(m, _)| *m == method) {
            panic!("a handler is already registered for {method} {path}");
        }
        current.routes.push((method, route));
    }

    /// Resolve method+path against the trie, writing captured parameters
    /// into `params`.
    pub(crate) fn lookup(
        &self,
        method: Method,
        path: &str,
        params: &mut Vec<(String, String)>,
    ) -> Lookup {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if let Some(route) = Self::match_method(&self.root, method, &segments, 0, params) {
            return Lookup::Found(route);
        }
        params.clear();

        // Second pass ignores the method so a path hit under a different
        // method yields 405 with its Allow set instead of 404.
        match Self::find_routes(&self.root, &segments, 0) {
            Some(routes) => {
                Lookup::MethodNotAllowed(routes.iter().map(|(m, _)| *m).collect())
            }
            None => Lookup::NotFound,
        }
    }

    fn match_method(
        node: &Node,
        method: Method,
        segments: &[&str],
        depth: usize,
        params: &mut Vec<(String, String)>,
    ) -> Option<usize> {
        if depth == segments.len() {
            if let Some(route) = node.route_for(method) {
                return Some(route);
            }
            // A trailing wildcard still matches with an empty remainder,
            // e.g. `/site/` against `/site/*filepath`.
            for child in &node.children {
                if child.is_wildcard {
                    if let Some(route) = child.route_for(method) {
                        if let Some(name) = &child.param_name {
                            params.push((name.clone(), String::new()));
                        }
                        return Some(route);
                    }
                }
            }
            return None;
        }

        let segment = segments[depth];

        for child in &node.children {
            if !child.is_param && !child.is_wildcard && child.path == segment {
                if let Some(route) = Self::match_method(child, method, segments, depth + 1, params)
                {
                    return Some(route);
                }
            }
        }

        for child in &node.children {
            if child.is_param {
                let mark = params.len();
                if let Some(name) = &child.param_name {
                    params.push((name.clone(), segment.to_string()));
                }
                if let Some(route) = Self::match_method(child, method, segments, depth + 1, params)
                {
                    return Some(route);
                }
                params.truncate(mark);
            }
        }

        for child in &node.children {
            if child.is_wildcard {
                if let Some(route) = child.route_for(method) {
                    if let Some(name) = &child.param_name {
                        params.push((name.clone(), segments[depth..].join("/")));
                    }
                    return Some(route);
                }
            }
        }

        None
    }

    fn find_routes<'a>(node: &'a Node, segments: &[&str], depth: usize) -> Option<&'a [(Method, usize)]> {
        if depth == segments.len() {
            if !node.routes.is_empty() {
                return Some(&node.routes);
            }
            for child in &node.children {
                if child.is_wildcard && !child.routes.is_empty() {
                    return Some(&child.routes);
                }
            }
            return None;
        }

        let segment = segments[depth];

        for child in &node.children {
            if !child.is_param && !child.is_wildcard && child.path == segment {
                if let Some(routes) = Self::find_routes(child, segments, depth + 1) {
                    return Some(routes);
                }
            }
        }

        for child in &node.children {
            if child.is_param {
                if let Some(routes) = Self::find_routes(child, segments, depth + 1) {
                    return Some(routes);
                }
            }
        }

        for child in &node.children {
            if child.is_wildcard && !child.routes.is_empty() {
                return Some(&child.routes);
            }
        }

        None
    }
}
