// src/response.rs
//
// Typed response helpers. Each one sets the content type, an optional
// status (200 when omitted), and the body on the context's response.

use std::path::Path;

use serde::Serialize;

use crate::context::Context;
use crate::error::{MazurkaError, MazurkaResult};
use crate::middleware::Flow;

impl Context<'_> {
    pub fn text(&mut self, body: impl Into<Vec<u8>>) {
        self.text_with_status(body, 200);
    }

    pub fn text_with_status(&mut self, body: impl Into<Vec<u8>>, status: u16) {
        let res = self.response();
        res.status = status;
        res.set_header("Content-Type", "text/plain; charset=utf-8");
        res.set_body(body);
    }

    pub fn html(&mut self, body: impl Into<Vec<u8>>) {
        self.html_with_status(body, 200);
    }

    pub fn html_with_status(&mut self, body: impl Into<Vec<u8>>, status: u16) {
        let res = self.response();
        res.status = status;
        res.set_header("Content-Type", "text/html; charset=utf-8");
        res.set_body(body);
    }

    /// Serialize `value` as the JSON body. A serialization failure
    /// propagates without touching the response.
    pub fn json<T: Serialize>(&mut self, value: &T) -> MazurkaResult<()> {
        self.json_with_status(value, 200)
    }

    pub fn json_with_status<T: Serialize>(&mut self, value: &T, status: u16) -> MazurkaResult<()> {
        let body = serde_json::to_vec(value)?;
        let res = self.response();
        res.status = status;
        res.set_header("Content-Type", "application/json");
        res.set_body(body);
        Ok(())
    }

    pub fn raw(&mut self, body: impl Into<Vec<u8>>, content_type: &str) {
        self.raw_with_status(body, content_type, 200);
    }

    pub fn raw_with_status(&mut self, body: impl Into<Vec<u8>>, content_type: &str, status: u16) {
        let res = self.response();
        res.status = status;
        res.set_header("Content-Type", content_type.to_string());
        res.set_body(body);
    }

    /// Redirect with a 3xx status and a `Location` header.
    pub fn redirect(&mut self, location: &str, status: u16) {
        debug_assert!((300..400).contains(&status), "redirect status must be 3xx");
        let res = self.response();
        res.status = status;
        res.set_header("Location", location.to_string());
    }

    /// Send a file's contents inline, content type guessed from the path.
    pub fn file(&mut self, path: impl AsRef<Path>) -> MazurkaResult<()> {
        let path = path.as_ref();
        let body = std::fs::read(path)?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        self.raw(body, mime.essence_str());
        Ok(())
    }

    /// Send a file as a download with a `Content-Disposition: attachment`
    /// header carrying the given filename.
    pub fn attachment(&mut self, path: impl AsRef<Path>, filename: &str) -> MazurkaResult<()> {
        self.file(path)?;
        self.response().set_header(
            "Content-Disposition",
            format!("attachment; filename=\"{filename}\""),
        );
        Ok(())
    }

    /// Set the status (500 when the caller has nothing more specific) and
    /// hand the error back unchanged; the dispatcher's error state does the
    /// logging and rendering.
    pub fn error_response(&mut self, err: MazurkaError, status: u16) -> Flow {
        self.response().status = status;
        Flow::Fail(err)
    }
}
