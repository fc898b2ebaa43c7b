use std::sync::{Arc, Mutex};

use mazurka::{Context, Exchange, Flow, MazurkaError, Method, Middleware, Request, Router};

fn exchange(method: Method, path: &str) -> Exchange {
    Exchange::new(Request::new(method, path))
}

fn get(path: &str) -> Exchange {
    exchange(Method::Get, path)
}

type Log = Arc<Mutex<Vec<&'static str>>>;

fn mark(log: &Log, label: &'static str) -> Middleware {
    let log = log.clone();
    Middleware::new(move |_: &mut Context| {
        log.lock().unwrap().push(label);
        Flow::Continue
    })
}

#[test]
fn test_group_and_route_middleware_order() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new();

    {
        let mut v1 = router.group("/v1");
        let a = {
            let log = log.clone();
            Middleware::new(move |ctx: &mut Context| {
                log.lock().unwrap().push("A");
                ctx.response().set_header("X-A", "1");
                Flow::Continue
            })
        };
        v1.before(a);

        let b = {
            let log = log.clone();
            Middleware::new(move |ctx: &mut Context| {
                log.lock().unwrap().push("B");
                ctx.response().set_header("X-B", "1");
                Flow::Continue
            })
        };
        let view_log = log.clone();
        v1.get("/foo", move |ctx: &mut Context| {
            view_log.lock().unwrap().push("V");
            ctx.text("ok");
            Ok(())
        })
        .before(b);
    }

    let dispatch = router.compile();
    let mut ex = get("/v1/foo");
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.status, 200);
    assert_eq!(ex.response.body_str(), "ok");
    assert_eq!(ex.response.header("X-A"), Some("1"));
    assert_eq!(ex.response.header("X-B"), Some("1"));
    assert_eq!(*log.lock().unwrap(), vec!["A", "B", "V"]);
}

#[test]
fn test_full_chain_order_with_afters() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new();
    router.before(mark(&log, "root-before"));
    router.after(mark(&log, "root-after"));

    {
        let mut api = router.group("/api");
        api.before(mark(&log, "group-before"));
        api.after(mark(&log, "group-after"));
        let view_log = log.clone();
        api.get("/x", move |ctx: &mut Context| {
            view_log.lock().unwrap().push("view");
            ctx.text("x");
            Ok(())
        })
        .before(mark(&log, "route-before"))
        .after(mark(&log, "route-after"));
    }

    let dispatch = router.compile();
    let mut ex = get("/api/x");
    dispatch.handle(&mut ex);

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "root-before",
            "group-before",
            "route-before",
            "view",
            "route-after",
            "group-after",
            "root-after",
        ]
    );
}

#[test]
fn test_halt_short_circuits_everything_after_it() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new();

    let reject = {
        let log = log.clone();
        Middleware::new(move |ctx: &mut Context| {
            log.lock().unwrap().push("reject");
            ctx.text_with_status("denied", 401);
            Flow::Halt
        })
    };
    router.before(reject);
    router.after(mark(&log, "after"));

    let view_log = log.clone();
    router.get("/secret", move |ctx: &mut Context| {
        view_log.lock().unwrap().push("view");
        ctx.text("secret");
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = get("/secret");
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.status, 401);
    assert_eq!(ex.response.body_str(), "denied");
    assert_eq!(*log.lock().unwrap(), vec!["reject"]);
}

#[test]
fn test_halt_with_untouched_response_stays_200() {
    let mut router = Router::new();
    router.before(Middleware::new(|_: &mut Context| Flow::Halt));
    router.get("/x", |ctx: &mut Context| {
        ctx.text("never");
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = get("/x");
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.status, 200);
    assert!(ex.response.body.is_empty());
}

#[test]
fn test_skip_view_still_runs_after_middleware() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new();

    router.before(Middleware::new(|ctx: &mut Context| {
        ctx.skip_view();
        Flow::Continue
    }));
    router.after(mark(&log, "after"));

    let view_log = log.clone();
    router.get("/x", move |ctx: &mut Context| {
        view_log.lock().unwrap().push("view");
        ctx.text("view ran");
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = get("/x");
    dispatch.handle(&mut ex);

    assert!(ex.response.body.is_empty());
    assert_eq!(*log.lock().unwrap(), vec!["after"]);
}

#[test]
fn test_error_keeps_status_set_by_failing_middleware() {
    let mut router = Router::new();
    router.before(Middleware::new(|ctx: &mut Context| {
        ctx.error_response(MazurkaError::BadRequest("missing token".into()), 400)
    }));
    router.get("/x", |ctx: &mut Context| {
        ctx.text("never");
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = get("/x");
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.status, 400);
    assert_eq!(ex.response.body_str(), "bad request: missing token");
}

#[test]
fn test_error_with_default_status_derives_from_error() {
    let mut router = Router::new();
    router.get("/boom", |_: &mut Context| {
        Err(MazurkaError::Internal("database gone".into()))
    });

    let dispatch = router.compile();
    let mut ex = get("/boom");
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.status, 500);
    assert_eq!(ex.response.body_str(), "internal error: database gone");
}

#[test]
fn test_view_error_skips_after_middleware() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new();
    router.after(mark(&log, "after"));
    router.get("/boom", |_: &mut Context| {
        Err(MazurkaError::Internal("nope".into()))
    });

    let dispatch = router.compile();
    let mut ex = get("/boom");
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.status, 500);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_group_error_view_overrides_default() {
    let mut router = Router::new();
    {
        let mut admin = router.group("/admin");
        admin.error_view(|ctx: &mut Context, _err: &MazurkaError, status: u16| {
            ctx.html_with_status("<h1>something broke</h1>", status);
        });
        admin.get("/boom", |_: &mut Context| {
            Err(MazurkaError::Internal("secret detail".into()))
        });
    }
    router.get("/boom", |_: &mut Context| {
        Err(MazurkaError::Internal("visible detail".into()))
    });

    let dispatch = router.compile();

    let mut ex = get("/admin/boom");
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.status, 500);
    assert_eq!(ex.response.body_str(), "<h1>something broke</h1>");

    let mut ex = get("/boom");
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.body_str(), "internal error: visible detail");
}

#[test]
fn test_skip_list_applies_per_route_not_per_group() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new();
    let audit = mark(&log, "audit");
    router.before(audit.clone());

    router.get("/tracked", |ctx: &mut Context| {
        ctx.text("tracked");
        Ok(())
    });
    router
        .get("/quiet", |ctx: &mut Context| {
            ctx.text("quiet");
            Ok(())
        })
        .skip(audit);

    let dispatch = router.compile();

    let mut ex = get("/quiet");
    dispatch.handle(&mut ex);
    assert!(log.lock().unwrap().is_empty());

    let mut ex = get("/tracked");
    dispatch.handle(&mut ex);
    assert_eq!(*log.lock().unwrap(), vec!["audit"]);
}

#[test]
fn test_duplicate_middleware_across_groups_runs_twice() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new();
    let shared = mark(&log, "shared");
    router.before(shared.clone());
    {
        let mut inner = router.group("/inner");
        inner.before(shared);
        inner.get("/x", |ctx: &mut Context| {
            ctx.text("x");
            Ok(())
        });
    }

    let dispatch = router.compile();
    let mut ex = get("/inner/x");
    dispatch.handle(&mut ex);
    assert_eq!(*log.lock().unwrap(), vec!["shared", "shared"]);
}

#[test]
fn test_path_params_reach_the_view() {
    let mut router = Router::new();
    router.get("/users/:id/posts/:post", |ctx: &mut Context| {
        let body = format!(
            "{}-{}",
            ctx.param("id").unwrap_or(""),
            ctx.param("post").unwrap_or("")
        );
        ctx.text(body);
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = get("/users/7/posts/42");
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.body_str(), "7-42");
}

#[test]
fn test_context_reuse_never_leaks_state() {
    let mut router = Router::new();
    router.before(Middleware::new(|ctx: &mut Context| {
        if ctx.request().path.starts_with("/skip") {
            ctx.skip_view();
        }
        Flow::Continue
    }));
    router.get("/skip/:id", |ctx: &mut Context| {
        ctx.text("should not run");
        Ok(())
    });
    router.get("/plain", |ctx: &mut Context| {
        let body = format!("params={} skipped={}", ctx.params().len(), ctx.view_skipped());
        ctx.text(body);
        Ok(())
    });

    let dispatch = router.compile();

    // First request dirties the pooled state with a param and the skip flag.
    let mut ex = get("/skip/9");
    dispatch.handle(&mut ex);
    assert!(ex.response.body.is_empty());

    // Second request reuses the same pool slot and must see it pristine.
    let mut ex = get("/plain");
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.body_str(), "params=0 skipped=false");
}

#[test]
fn test_method_not_allowed_lists_methods_in_registration_order() {
    let mut router = Router::new();
    router.handle_options(false);
    router.post("/thing", |ctx: &mut Context| {
        ctx.text("post");
        Ok(())
    });
    router.get("/thing", |ctx: &mut Context| {
        ctx.text("get");
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = exchange(Method::Put, "/thing");
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.status, 405);
    assert_eq!(ex.response.header("Allow"), Some("POST, GET"));
    assert_eq!(ex.response.body_str(), "Method Not Allowed");
}

#[test]
fn test_custom_method_not_allowed_view() {
    let mut router = Router::new();
    router.handle_options(false);
    router.get("/thing", |ctx: &mut Context| {
        ctx.text("get");
        Ok(())
    });
    router.method_not_allowed(|ctx: &mut Context| {
        ctx.text_with_status("try another verb", 405);
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = exchange(Method::Delete, "/thing");
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.status, 405);
    assert_eq!(ex.response.header("Allow"), Some("GET"));
    assert_eq!(ex.response.body_str(), "try another verb");
}

#[test]
fn test_not_found_default_and_custom() {
    let mut router = Router::new();
    router.get("/known", |ctx: &mut Context| {
        ctx.text("known");
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = get("/unknown");
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.status, 404);
    assert_eq!(ex.response.body_str(), "Not Found");

    let mut router = Router::new();
    router.not_found(|ctx: &mut Context| {
        ctx.html_with_status("<h1>lost?</h1>", 404);
        Ok(())
    });
    let dispatch = router.compile();
    let mut ex = get("/unknown");
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.status, 404);
    assert_eq!(ex.response.body_str(), "<h1>lost?</h1>");
}

#[test]
fn test_auto_options_advertises_other_methods() {
    let mut router = Router::new();
    router.get("/thing", |ctx: &mut Context| {
        ctx.text("thing-get");
        Ok(())
    });
    router.post("/thing", |ctx: &mut Context| {
        ctx.text("thing-post");
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = exchange(Method::Options, "/thing");
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.status, 200);
    assert_eq!(ex.response.header("Allow"), Some("GET, POST"));
    // The synthetic responder forwards to the first-registered view.
    assert_eq!(ex.response.body_str(), "thing-get");
}

#[test]
fn test_user_registered_options_is_used_as_is() {
    let mut router = Router::new();
    router.get("/thing", |ctx: &mut Context| {
        ctx.text("get");
        Ok(())
    });
    router.options("/thing", |ctx: &mut Context| {
        ctx.response().set_header("Allow", "GET, OPTIONS, MAGIC");
        ctx.text("custom options");
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = exchange(Method::Options, "/thing");
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.header("Allow"), Some("GET, OPTIONS, MAGIC"));
    assert_eq!(ex.response.body_str(), "custom options");
}

#[test]
fn test_disabled_auto_options_falls_through_to_405() {
    let mut router = Router::new();
    router.handle_options(false);
    router.get("/thing", |ctx: &mut Context| {
        ctx.text("get");
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = exchange(Method::Options, "/thing");
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.status, 405);
    assert_eq!(ex.response.header("Allow"), Some("GET"));
}

#[test]
fn test_virtual_host_routes_to_alternate_table() {
    let mut router = Router::new();
    router.get("/", |ctx: &mut Context| {
        ctx.text("main");
        Ok(())
    });
    router.virtual_host("admin.example.com").get("/", |ctx: &mut Context| {
        ctx.text("admin");
        Ok(())
    });

    let dispatch = router.compile();

    let mut ex = get("/");
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.body_str(), "main");

    let mut ex = get("/");
    ex.request.host = Some("admin.example.com".to_string());
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.body_str(), "admin");

    // Unregistered hosts fall back to the main table.
    let mut ex = get("/");
    ex.request.host = Some("other.example.com".to_string());
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.body_str(), "main");
}

#[test]
fn test_debug_mode_dispatches_normally() {
    let mut router = Router::new();
    router.set_debug(true);
    router.get("/x", |ctx: &mut Context| {
        ctx.text("x");
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = get("/x");
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.body_str(), "x");
}

#[test]
fn test_concurrent_requests_are_independent() {
    let mut router = Router::new();
    router.get("/echo/:id", |ctx: &mut Context| {
        let id = ctx.param("id").unwrap_or("").to_string();
        ctx.text(id);
        Ok(())
    });

    let dispatch = std::sync::Arc::new(router.compile());
    let mut handles = Vec::new();
    for t in 0..8 {
        let dispatch = dispatch.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..200 {
                let id = format!("{t}-{i}");
                let mut ex = get(&format!("/echo/{id}"));
                dispatch.handle(&mut ex);
                assert_eq!(ex.response.body_str(), id);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
#[should_panic(expected = "uppercase")]
fn test_lowercase_method_is_a_configuration_error() {
    let mut router = Router::new();
    router.route("get", "/x", |_: &mut Context| Ok(()));
}

#[test]
#[should_panic(expected = "already registered for virtual host")]
fn test_duplicate_virtual_host_panics() {
    let mut router = Router::new();
    router.virtual_host("a.example.com");
    router.virtual_host("a.example.com");
}

#[test]
#[should_panic(expected = "already registered")]
fn test_duplicate_route_panics_at_compile() {
    let mut router = Router::new();
    router.get("/dup", |_: &mut Context| Ok(()));
    router.get("/dup", |_: &mut Context| Ok(()));
    let _ = router.compile();
}
