//! Transport-agnostic request/response types exchanged with function handlers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default status for a shaped response that never set one.
pub const DEFAULT_STATUS: u16 = 200;

/// Methods that never carry a request body.
const BODILESS_METHODS: [&str; 2] = ["GET", "HEAD"];

/// Request handed to a function handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRequest {
    pub method: String,
    pub url: String,
    /// Lower-cased header names; repeated headers are joined with `", "`.
    pub headers: BTreeMap<String, String>,
    /// `None` for bodiless methods.
    pub body: Option<Bytes>,
}

impl NormalizedRequest {
    /// Build a request, dropping the body for GET and HEAD.
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
        body: Option<Bytes>,
    ) -> Self {
        let method = method.into();
        let body = if is_bodiless(&method) { None } else { body };
        Self {
            method,
            url: url.into(),
            headers,
            body,
        }
    }

    /// Shorthand for a GET without headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url, BTreeMap::new(), None)
    }

    /// Shorthand for a POST without headers.
    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new("POST", url, BTreeMap::new(), Some(body.into()))
    }

    /// Add a header (name is lower-cased, repeated values are joined).
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        append_header(&mut self.headers, name, value);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Fully shaped response produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl NormalizedResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        append_header(&mut self.headers, name, value);
        self
    }
}

impl Default for NormalizedResponse {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS)
    }
}

/// What a handler returned: either a response it fully controls, or a plain
/// value for the adapter to serialize.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    Response(NormalizedResponse),
    Value(serde_json::Value),
}

impl HandlerOutput {
    pub fn is_response(&self) -> bool {
        matches!(self, HandlerOutput::Response(_))
    }
}

/// Whether requests with this method are sent without a body.
pub fn is_bodiless(method: &str) -> bool {
    BODILESS_METHODS
        .iter()
        .any(|m| m.eq_ignore_ascii_case(method))
}

/// Insert a header into a normalized map, joining repeated values.
pub fn append_header(headers: &mut BTreeMap<String, String>, name: &str, value: &str) {
    headers
        .entry(name.to_ascii_lowercase())
        .and_modify(|existing| {
            existing.push_str(", ");
            existing.push_str(value);
        })
        .or_insert_with(|| value.to_string());
}
