use mazurka::{Context, Exchange, MazurkaError, Method, Request, Router};
use serde::{Deserialize, Serialize};

fn get(path: &str) -> Exchange {
    Exchange::new(Request::new(Method::Get, path))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Widget {
    id: u32,
    name: String,
    tags: Vec<String>,
}

#[test]
fn test_json_round_trips_structurally() {
    let widget = Widget {
        id: 7,
        name: "sprocket".to_string(),
        tags: vec!["metal".to_string(), "small".to_string()],
    };

    let expected = widget.clone();
    let mut router = Router::new();
    router.get("/widget", move |ctx: &mut Context| ctx.json(&widget));

    let dispatch = router.compile();
    let mut ex = get("/widget");
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.status, 200);
    assert_eq!(ex.response.header("Content-Type"), Some("application/json"));
    let decoded: Widget = serde_json::from_slice(&ex.response.body).unwrap();
    assert_eq!(decoded, expected);
}

#[test]
fn test_json_with_status() {
    let mut router = Router::new();
    router.post("/widget", |ctx: &mut Context| {
        ctx.json_with_status(&serde_json::json!({"created": true}), 201)
    });

    let dispatch = router.compile();
    let mut ex = Exchange::new(Request::new(Method::Post, "/widget"));
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.status, 201);
    let value: serde_json::Value = serde_json::from_slice(&ex.response.body).unwrap();
    assert_eq!(value["created"], true);
}

#[test]
fn test_text_and_html_content_types() {
    let mut router = Router::new();
    router.get("/t", |ctx: &mut Context| {
        ctx.text("plain");
        Ok(())
    });
    router.get("/h", |ctx: &mut Context| {
        ctx.html("<p>rich</p>");
        Ok(())
    });

    let dispatch = router.compile();

    let mut ex = get("/t");
    dispatch.handle(&mut ex);
    assert_eq!(
        ex.response.header("Content-Type"),
        Some("text/plain; charset=utf-8")
    );
    assert_eq!(ex.response.body_str(), "plain");

    let mut ex = get("/h");
    dispatch.handle(&mut ex);
    assert_eq!(
        ex.response.header("Content-Type"),
        Some("text/html; charset=utf-8")
    );
    assert_eq!(ex.response.body_str(), "<p>rich</p>");
}

#[test]
fn test_raw_sets_exact_content_type() {
    let mut router = Router::new();
    router.get("/bin", |ctx: &mut Context| {
        ctx.raw(vec![0xDE, 0xAD], "application/octet-stream");
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = get("/bin");
    dispatch.handle(&mut ex);
    assert_eq!(
        ex.response.header("Content-Type"),
        Some("application/octet-stream")
    );
    assert_eq!(ex.response.body, vec![0xDE, 0xAD]);
}

#[test]
fn test_redirect_sets_location() {
    let mut router = Router::new();
    router.get("/old", |ctx: &mut Context| {
        ctx.redirect("/new", 301);
        Ok(())
    });

    let dispatch = router.compile();
    let mut ex = get("/old");
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.status, 301);
    assert_eq!(ex.response.header("Location"), Some("/new"));
}

#[test]
fn test_attachment_sets_disposition_and_mime() {
    let dir = std::env::temp_dir().join(format!("mazurka-resp-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("report.csv");
    std::fs::write(&path, "a,b\n1,2\n").unwrap();

    let mut router = Router::new();
    let served = path.clone();
    router.get("/report", move |ctx: &mut Context| {
        ctx.attachment(&served, "report.csv")
    });

    let dispatch = router.compile();
    let mut ex = get("/report");
    dispatch.handle(&mut ex);

    assert_eq!(ex.response.status, 200);
    assert_eq!(ex.response.header("Content-Type"), Some("text/csv"));
    assert_eq!(
        ex.response.header("Content-Disposition"),
        Some("attachment; filename=\"report.csv\"")
    );
    assert_eq!(ex.response.body_str(), "a,b\n1,2\n");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_file_helper_missing_file_becomes_404() {
    let mut router = Router::new();
    router.get("/gone", |ctx: &mut Context| ctx.file("/definitely/not/here.txt"));

    let dispatch = router.compile();
    let mut ex = get("/gone");
    dispatch.handle(&mut ex);
    // Io(NotFound) maps to 404 through the error state.
    assert_eq!(ex.response.status, 404);
}

#[test]
fn test_error_response_defers_rendering_to_error_view() {
    let mut router = Router::new();
    router.get("/teapot", |ctx: &mut Context| {
        match ctx.error_response(MazurkaError::BadRequest("no coffee".into()), 418) {
            mazurka::Flow::Fail(err) => Err(err),
            _ => unreachable!(),
        }
    });

    let dispatch = router.compile();
    let mut ex = get("/teapot");
    dispatch.handle(&mut ex);
    assert_eq!(ex.response.status, 418);
    assert_eq!(ex.response.body_str(), "bad request: no coffee");
}
