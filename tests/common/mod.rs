//! Shared test fixtures and utilities for Pulse integration tests
//!
//! # Usage
//!
//! In your test file, add:
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```
//!
//! # Features
//!
//! - `Workspace`: temporary function source tree and dist directory
//! - Request helpers driving a `Router` with `tower::ServiceExt::oneshot`
//! - The demo handlers from `functions/` as fixtures

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use pulse_remote::config::{ExtensionMetadata, Mode, ServerConfig};
use pulse_remote::FunctionHost;
use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tower::ServiceExt;

pub const ECHO: &str = include_str!("../../functions/echo.wat");
pub const HELLO: &str = include_str!("../../functions/hello/hello-world.wat");
pub const PING: &str = include_str!("../../functions/ping.wat");

/// A handler that always traps.
pub const TRAP: &str = r#"(module
  (memory (export "memory") 1)
  (func (export "handle") unreachable))"#;

/// Syntactically broken module.
pub const BROKEN: &str = "(module (func $broken";

pub const EXTENSION_ID: &str = "wheel";

// ============================================================================
// Network Utilities
// ============================================================================

/// Find an available TCP port for testing
pub fn find_available_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to port 0");
    listener
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

// ============================================================================
// Workspace
// ============================================================================

/// Temporary function sources plus build output
pub struct Workspace {
    pub functions: TempDir,
    pub dist: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            functions: TempDir::new().expect("Failed to create functions dir"),
            dist: TempDir::new().expect("Failed to create dist dir"),
        }
    }

    /// Workspace seeded with the three demo handlers.
    pub fn with_demo_functions() -> Self {
        let ws = Self::new();
        ws.write_function("echo.wat", ECHO);
        ws.write_function("hello/hello-world.wat", HELLO);
        ws.write_function("ping.wat", PING);
        ws
    }

    pub fn functions_dir(&self) -> &Path {
        self.functions.path()
    }

    pub fn server_dir(&self) -> PathBuf {
        self.dist.path().join("server")
    }

    pub fn write_function(&self, rel: &str, source: &str) {
        let path = self.functions.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create function dir");
        }
        fs::write(path, source).expect("Failed to write function");
    }

    pub fn remove_function(&self, rel: &str) {
        fs::remove_file(self.functions.path().join(rel)).expect("Failed to remove function");
    }

    pub fn config(&self, mode: Mode) -> ServerConfig {
        ServerConfig {
            mode,
            http_addr: "127.0.0.1:0".parse().expect("valid addr"),
            functions_dir: self.functions.path().to_path_buf(),
            dist_dir: self.dist.path().to_path_buf(),
            extension: ExtensionMetadata {
                id: EXTENSION_ID.to_string(),
                version: "1.0.0".to_string(),
                display_name: Some("Wheel".to_string()),
                description: None,
            },
            ..Default::default()
        }
    }

    /// Host in preview mode with the initial build done.
    pub async fn preview_host(&self) -> FunctionHost {
        self.host(self.config(Mode::Preview)).await
    }

    pub async fn host(&self, config: ServerConfig) -> FunctionHost {
        let host = FunctionHost::new(config).expect("Failed to create host");
        host.start_background()
            .await
            .expect("Failed to start background tasks");
        host
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Request Helpers
// ============================================================================

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }
}

pub async fn send(router: Router, method: Method, uri: &str, body: impl Into<Body>) -> TestResponse {
    let response = router
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("host", "localhost:3030")
                .body(body.into())
                .expect("valid request"),
        )
        .await
        .expect("router is infallible");

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
        .await
        .expect("Failed to read body")
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(router: Router, uri: &str) -> TestResponse {
    send(router, Method::GET, uri, Body::empty()).await
}

pub async fn post(router: Router, uri: &str, body: impl Into<Body>) -> TestResponse {
    send(router, Method::POST, uri, body).await
}
