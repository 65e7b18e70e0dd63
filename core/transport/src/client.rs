//! Transport trait definition and request/response values.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

use outbox_common::{Error, Method, Result};

/// An outgoing network call.
///
/// Header names are stored lower-cased so lookups and persistence are
/// insensitive to the caller's spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a request without headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Shorthand for a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Shorthand for a POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Add or replace a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Set the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set the content type.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("content-type", "application/json").body(body))
    }

    /// Look up a header by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// A response received from the network (or synthesized for queued calls).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Response {
    /// Create a response with an empty body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    /// Create a JSON response.
    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Result<Self> {
        let mut response = Self::new(status);
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response.body = Bytes::from(serde_json::to_vec(value)?);
        Ok(response)
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 3xx.
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as lossy UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Convert a non-2xx response into an `Error::Http`.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Http {
                status: self.status,
                message: status_reason(self.status).to_string(),
            })
        }
    }
}

/// Short reason phrase for common statuses.
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unexpected Status",
    }
}

/// Network-call primitive.
///
/// # Postconditions
/// - `Ok` for every response the server produced, whatever its status
/// - `Err(Error::Network | Error::Timeout)` when the server was not reached
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Client name for logging (e.g., "reqwest", "scripted", "offline").
    fn name(&self) -> &str;

    /// Issue a request.
    async fn send(&self, request: Request) -> Result<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_names_are_lowercased() {
        let request = Request::post("https://app.test/todos").header("X-Csrf-Token", "abc");
        assert_eq!(request.header_value("x-csrf-token"), Some("abc"));
        assert_eq!(request.header_value("X-CSRF-TOKEN"), Some("abc"));
    }

    #[test]
    fn test_json_request_sets_content_type() {
        let request = Request::post("https://app.test/todos")
            .json(&serde_json::json!({ "title": "Buy milk" }))
            .unwrap();
        assert_eq!(request.header_value("content-type"), Some("application/json"));
        assert_eq!(
            request.body.as_deref(),
            Some(br#"{"title":"Buy milk"}"#.as_slice())
        );
    }

    #[test]
    fn test_status_classes() {
        assert!(Response::new(204).is_success());
        assert!(Response::new(302).is_redirect());
        assert!(!Response::new(302).is_success());
        assert!(Response::new(503).error_for_status().is_err());
    }

    #[test]
    fn test_json_response_roundtrip() {
        let response = Response::json(202, &serde_json::json!({ "queued": true })).unwrap();
        let body: serde_json::Value = response.json_body().unwrap();
        assert_eq!(body["queued"], true);
    }
}
