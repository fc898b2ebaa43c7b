// src/static_files.rs
//
// Filesystem-backed view for routes mounted under a `*filepath` wildcard.
// The wire-level concerns (sendfile, compression) belong to the protocol
// layer; this collaborator only resolves paths, guards against traversal,
// and fills in the response.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::error::{MazurkaError, MazurkaResult};
use crate::middleware::View;

type RewriteFn = dyn Fn(&str) -> String + Send + Sync;

/// Builder for a static-file view.
///
/// ```no_run
/// use mazurka::{Router, StaticFiles};
///
/// let mut router = Router::new();
/// router.static_files(
///     "/static",
///     StaticFiles::new("./public")
///         .index_names(["index.html"])
///         .cache_duration(std::time::Duration::from_secs(3600)),
/// );
/// ```
pub struct StaticFiles {
    root: PathBuf,
    index_names: Vec<String>,
    generate_index_pages: bool,
    accept_byte_range: bool,
    cache_duration: Option<Duration>,
    path_rewrite: Option<Arc<RewriteFn>>,
    not_found: Option<View>,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StaticFiles {
            root: root.into(),
            index_names: vec!["index.html".to_string()],
            generate_index_pages: false,
            accept_byte_range: false,
            cache_duration: None,
            path_rewrite: None,
            not_found: None,
        }
    }

    /// File names tried when the request resolves to a directory.
    pub fn index_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.index_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Render an HTML listing for directories without an index file.
    pub fn generate_index_pages(mut self, on: bool) -> Self {
        self.generate_index_pages = on;
        self
    }

    /// Honor single `Range: bytes=a-b` requests with 206 responses.
    pub fn accept_byte_range(mut self, on: bool) -> Self {
        self.accept_byte_range = on;
        self
    }

    /// Emit `Cache-Control: max-age` on served files.
    pub fn cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = Some(duration);
        self
    }

    /// Rewrite the captured wildcard path before resolving it on disk.
    pub fn path_rewrite(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.path_rewrite = Some(Arc::new(f));
        self
    }

    /// View invoked instead of the default 404 when nothing matches.
    pub fn not_found(mut self, view: View) -> Self {
        self.not_found = Some(view);
        self
    }

    /// Finish the builder. The resulting view reads the `filepath` wildcard
    /// parameter captured by the mount pattern.
    pub fn into_view(self) -> View {
        let files = Arc::new(self);
        View::new(move |ctx: &mut Context| files.serve(ctx))
    }

    fn serve(&self, ctx: &mut Context) -> MazurkaResult<()> {
        let raw = ctx.param("filepath").unwrap_or("").to_string();
        let rel = match &self.path_rewrite {
            Some(rewrite) => rewrite(&raw),
            None => raw,
        };

        // Any dot-dot segment is an escape attempt, rewritten or not.
        if rel.split(['/', '\\']).any(|seg| seg == "..") {
            return self.miss(ctx, &rel);
        }

        let full = self.root.join(rel.trim_start_matches('/'));
        let meta = match fs::metadata(&full) {
            Ok(meta) => meta,
            Err(_) => return self.miss(ctx, &rel),
        };

        if meta.is_dir() {
            for index in &self.index_names {
                let candidate = full.join(index);
                if candidate.is_file() {
                    return self.send_file(ctx, &candidate);
                }
            }
            if self.generate_index_pages {
                return self.listing(ctx, &full, &rel);
            }
            return self.miss(ctx, &rel);
        }

        self.send_file(ctx, &full)
    }

    fn send_file(&self, ctx: &mut Context, path: &Path) -> MazurkaResult<()> {
        let body = fs::read(path)?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();

        let range = if self.accept_byte_range {
            ctx.request()
                .header("Range")
                .and_then(|r| parse_range(r, body.len() as u64))
        } else {
            None
        };

        let res = ctx.response();
        res.set_header("Content-Type", mime.essence_str().to_string());
        if let Some(modified) = modified {
            res.set_header("Last-Modified", httpdate::fmt_http_date(modified));
        }
        if let Some(duration) = self.cache_duration {
            res.set_header("Cache-Control", format!("max-age={}", duration.as_secs()));
        }
        if self.accept_byte_range {
            res.set_header("Accept-Ranges", "bytes");
        }

        match range {
            Some((start, end)) => {
                res.status = 206;
                res.set_header(
                    "Content-Range",
                    format!("bytes {start}-{end}/{}", body.len()),
                );
                res.set_body(body[start as usize..=end as usize].to_vec());
            }
            None => {
                res.status = 200;
                res.set_body(body);
            }
        }
        Ok(())
    }

    fn listing(&self, ctx: &mut Context, dir: &Path, rel: &str) -> MazurkaResult<()> {
        let mut names: Vec<String> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| {
                let mut name = entry.file_name().to_string_lossy().into_owned();
                if entry.path().is_dir() {
                    name.push('/');
                }
                name
            })
            .collect();
        names.sort();

        let mut html = format!("<html><body><h1>Index of /{rel}</h1><ul>");
        for name in names {
            html.push_str(&format!("<li><a href=\"{name}\">{name}</a></li>"));
        }
        html.push_str("</ul></body></html>");
        ctx.html(html);
        Ok(())
    }

    fn miss(&self, ctx: &mut Context, rel: &str) -> MazurkaResult<()> {
        match &self.not_found {
            Some(view) => view.call(ctx),
            None => Err(MazurkaError::NotFound(rel.to_string())),
        }
    }
}

/// Parse `bytes=a-b` (or the open-ended `bytes=a-`) against a body length.
/// Returns an inclusive byte window, or `None` for anything unsatisfiable.
fn parse_range(header: &str, len: u64) -> Option<(u64, u64)> {
    if len == 0 {
        return None;
    }
    let window = header.strip_prefix("bytes=")?;
    let (start, end) = window.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = match end.trim() {
        "" => len - 1,
        e => e.parse().ok()?,
    };
    if start > end || end >= len {
        return None;
    }
    Some((start, end))
}
