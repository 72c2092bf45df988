//! Request adapter
//!
//! Bridges HTTP requests on `/server-function/<name>` to the runtime loader:
//! normalizes the incoming request, invokes the handler behind
//! `<remote>/<name>`, and turns the tagged handler result (or the error) into
//! an HTTP response. Every request ends in a well-formed response.

use crate::error::FederationError;
use crate::federation::loader::RuntimeLoader;
use crate::functions::discovery::lookup_key;
use crate::functions::protocol::{append_header, HandlerOutput, NormalizedRequest, NormalizedResponse};
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Route prefix for function invocations.
pub const FUNCTION_PREFIX: &str = "/server-function";

/// Shared state of the function route.
#[derive(Clone)]
pub struct AdapterState {
    pub loader: Arc<RuntimeLoader>,
    /// Remote name (`<id>_server`).
    pub remote: String,
}

impl AdapterState {
    pub fn new(loader: Arc<RuntimeLoader>, remote: impl Into<String>) -> Self {
        Self {
            loader,
            remote: remote.into(),
        }
    }

    /// Run the function `name` with `request`.
    pub async fn dispatch(&self, name: &str, request: NormalizedRequest) -> Response {
        if !is_valid_name(name) {
            return error_response(&FederationError::unresolved(&self.remote, name));
        }

        let key = lookup_key(&self.remote, name);
        match self.loader.load_and_invoke(&key, request).await {
            Ok(output) => output_response(output),
            Err(e) => {
                match &e {
                    FederationError::UnresolvedFunction { .. } => {
                        info!(function = %name, "Function not found")
                    }
                    _ => error!(function = %name, error = %e, "Function invocation failed"),
                }
                error_response(&e)
            }
        }
    }
}

/// axum handler for `/server-function/*name`.
pub async fn invoke_function(
    State(state): State<AdapterState>,
    Path(name): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = normalize_request(&method, &uri, &headers, body);
    state.dispatch(&name, request).await
}

/// Logical names are relative and never climb out of the source root.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('/')
        && name
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Build a [`NormalizedRequest`] from the parts of an HTTP request.
pub fn normalize_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> NormalizedRequest {
    let mut normalized = BTreeMap::new();
    for (name, value) in headers {
        match value.to_str() {
            Ok(value) => append_header(&mut normalized, name.as_str(), value),
            Err(_) => warn!(header = %name, "Dropping non-ASCII header value"),
        }
    }

    let url = absolute_url(uri, headers);
    NormalizedRequest::new(method.as_str(), url, normalized, Some(body))
}

fn absolute_url(uri: &Uri, headers: &HeaderMap) -> String {
    if uri.scheme().is_some() {
        return uri.to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    format!("http://{}{}", host, path)
}

/// Turn a handler result into an HTTP response.
pub fn output_response(output: HandlerOutput) -> Response {
    match output {
        HandlerOutput::Response(resp) => shaped_response(resp),
        HandlerOutput::Value(value) => (StatusCode::OK, Json(value)).into_response(),
    }
}

fn shaped_response(resp: NormalizedResponse) -> Response {
    let Ok(status) = StatusCode::from_u16(resp.status) else {
        error!(status = resp.status, "Handler returned an invalid status");
        return internal_error();
    };

    let mut response = Response::new(Body::from(resp.body));
    *response.status_mut() = status;
    for (name, value) in resp.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().append(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid response header"),
        }
    }
    response
}

/// Map an error onto the response the caller sees.
///
/// Invocation details are never sent to the caller.
pub fn error_response(error: &FederationError) -> Response {
    match error {
        FederationError::UnresolvedFunction { .. } => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
        FederationError::RemoteUnavailable(_) | FederationError::ShuttingDown => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Service Unavailable" })),
        )
            .into_response(),
        _ => internal_error(),
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal Server Error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("echo"));
        assert!(is_valid_name("hello/hello-world"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("/etc/passwd"));
        assert!(!is_valid_name("../secret"));
        assert!(!is_valid_name("a//b"));
        assert!(!is_valid_name("a/./b"));
    }

    #[test]
    fn test_normalize_request() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("example.test:3030"));
        headers.append("X-Tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));

        let uri: Uri = "/server-function/echo?x=1".parse().unwrap();
        let req = normalize_request(&Method::POST, &uri, &headers, Bytes::from_static(b"hi"));
        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "http://example.test:3030/server-function/echo?x=1");
        assert_eq!(req.header("x-tag"), Some("a, b"));
        assert_eq!(req.body.as_deref(), Some(&b"hi"[..]));

        let req = normalize_request(&Method::GET, &uri, &headers, Bytes::from_static(b"ignored"));
        assert!(req.body.is_none());
    }

    #[tokio::test]
    async fn test_value_output_is_json() {
        let resp = output_response(HandlerOutput::Value(json!({"pong": true})));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_string(resp).await, r#"{"pong":true}"#);
    }

    #[tokio::test]
    async fn test_shaped_output_is_copied() {
        let resp = output_response(HandlerOutput::Response(
            NormalizedResponse::new(405)
                .with_header("content-type", "text/plain")
                .with_header("bad header", "x")
                .with_body("Method Not Allowed"),
        ));
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(resp.headers().len(), 1);
        assert_eq!(body_string(resp).await, "Method Not Allowed");
    }

    #[tokio::test]
    async fn test_error_mapping_hides_detail() {
        let resp = error_response(&FederationError::invocation("echo", "secret stack trace"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_string(resp).await;
        assert!(!body.contains("secret"));
        assert_eq!(body, r#"{"error":"Internal Server Error"}"#);

        let resp = error_response(&FederationError::unresolved("wheel_server", "nope"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = error_response(&FederationError::remote("fetch manifest", "refused"));
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
