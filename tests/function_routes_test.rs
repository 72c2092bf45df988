//! End-to-end tests of `/server-function/*` against the demo handlers

mod common;

use axum::http::{Method, StatusCode};
use common::*;

#[tokio::test]
async fn test_hello_world_get() {
    let ws = Workspace::with_demo_functions();
    let host = ws.preview_host().await;

    let resp = get(host.router(), "/server-function/hello/hello-world").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.text().contains(r#""message":"Hello, world!""#));
    assert_eq!(resp.headers.get("content-type").unwrap(), "application/json");
}

#[tokio::test]
async fn test_hello_world_rejects_post() {
    let ws = Workspace::with_demo_functions();
    let host = ws.preview_host().await;

    let resp = post(host.router(), "/server-function/hello/hello-world", "{}").await;
    assert_eq!(resp.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(resp.text(), "Method Not Allowed");
}

#[tokio::test]
async fn test_echo_roundtrip() {
    let ws = Workspace::with_demo_functions();
    let host = ws.preview_host().await;

    let payload = r#"{"spin":"wheel","slices":[1,2,3]}"#;
    let resp = post(host.router(), "/server-function/echo", payload).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.text(), payload);

    let resp = post(host.router(), "/server-function/echo", "").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.is_empty());
}

#[tokio::test]
async fn test_echo_rejects_get() {
    let ws = Workspace::with_demo_functions();
    let host = ws.preview_host().await;

    let resp = get(host.router(), "/server-function/echo").await;
    assert_eq!(resp.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_raw_value_is_serialized() {
    let ws = Workspace::with_demo_functions();
    let host = ws.preview_host().await;

    let resp = get(host.router(), "/server-function/ping").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json(), serde_json::json!({"pong": true}));
}

#[tokio::test]
async fn test_unknown_function_is_not_found() {
    let ws = Workspace::with_demo_functions();
    let host = ws.preview_host().await;

    for uri in [
        "/server-function/does-not-exist",
        "/server-function/hello",
        "/server-function/hello/hello-world/extra",
        "/server-function/../echo",
        "/server-function/hello/../echo",
    ] {
        let resp = get(host.router(), uri).await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_trap_is_internal_error_without_detail() {
    let ws = Workspace::with_demo_functions();
    ws.write_function("boom.wat", TRAP);
    let host = ws.preview_host().await;

    let resp = get(host.router(), "/server-function/boom").await;
    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.json(), serde_json::json!({"error": "Internal Server Error"}));
    assert!(!resp.text().contains("unreachable"));
}

#[tokio::test]
async fn test_every_method_reaches_the_handler() {
    let ws = Workspace::with_demo_functions();
    let host = ws.preview_host().await;

    for method in [Method::PUT, Method::PATCH, Method::DELETE] {
        let resp = send(host.router(), method.clone(), "/server-function/ping", "x").await;
        assert_eq!(resp.status, StatusCode::OK, "{method}");
    }
}

#[tokio::test]
async fn test_bundle_assets_served() {
    let ws = Workspace::with_demo_functions();
    let host = ws.preview_host().await;

    let manifest = get(host.router(), "/.server-function/mf-manifest.json").await.json();
    let path = manifest["entries"]["echo"]["load_spec"]["path"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = get(host.router(), &format!("/.server-function/{}", path)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.text(), ECHO);

    let resp = get(host.router(), "/.server-function/pulse.config.json").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["id"], EXTENSION_ID);
}
