//! Static file serving
//!
//! Serves files from a directory under a route prefix. Paths are resolved
//! strictly below the root: any `..`, absolute, or empty-segment path is a
//! 404, and directory requests fall back to `index.html`.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::path::{Component, PathBuf};
use std::sync::Arc;
use tracing::debug;

const INDEX_FILE: &str = "index.html";

/// A directory exposed over HTTP.
#[derive(Debug, Clone)]
pub struct StaticDir {
    root: Arc<PathBuf>,
}

impl StaticDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Map a request path onto a file below the root.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let mut path = self.root.as_ref().clone();
        for segment in request_path.split('/').filter(|s| !s.is_empty()) {
            let mut components = std::path::Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(part)), None) => path.push(part),
                _ => return None,
            }
        }
        Some(path)
    }

    /// Read and respond with the file at `request_path`.
    pub async fn serve(&self, request_path: &str) -> Response {
        let Some(mut path) = self.resolve(request_path) else {
            return StatusCode::NOT_FOUND.into_response();
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => path.push(INDEX_FILE),
            Ok(_) => {}
            Err(_) => return StatusCode::NOT_FOUND.into_response(),
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mut response = Response::new(Body::from(bytes));
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(content_type(&path)),
                );
                response
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Static file not readable");
                StatusCode::NOT_FOUND.into_response()
            }
        }
    }
}

/// Handler for `<prefix>/*path`.
pub async fn serve_path(State(dir): State<StaticDir>, Path(path): Path<String>) -> Response {
    dir.serve(&path).await
}

/// Handler for `<prefix>/`.
pub async fn serve_index(State(dir): State<StaticDir>) -> Response {
    dir.serve("").await
}

/// Content type for a file, by extension.
pub fn content_type(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("wasm") => "application/wasm",
        Some("wat") | Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("ico") => "image/x-icon",
        Some("map") => "application/json",
        _ => "application/octet-stream",
    }
}
