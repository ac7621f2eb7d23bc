//! The transport seam every component talks through.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::error::Result;

/// Streamed request body for payload transfers.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send>>;

/// HTTP method of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A request against the portal API, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API base, without a leading slash (e.g. `uploads/u1`).
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Value of the first query parameter named `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A single fallible HTTP call abstraction.
///
/// Implementations map unreachable servers to
/// [`PortalError::Network`](crate::PortalError::Network) and non-2xx responses
/// to [`PortalError::Api`](crate::PortalError::Api) or
/// [`PortalError::ApiStatus`](crate::PortalError::ApiStatus). They never retry;
/// retry policy belongs to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform an API call and parse the JSON response body.
    ///
    /// An empty success body parses as `Value::Null`.
    async fn call(&self, request: ApiRequest) -> Result<Value>;

    /// Perform an API call and return the raw response body.
    async fn fetch_bytes(&self, request: ApiRequest) -> Result<Vec<u8>>;

    /// Stream a payload with `PUT` to an absolute URL outside the API.
    ///
    /// Used for pre-signed object-storage destinations, so no API
    /// credentials are attached.
    async fn put_object(
        &self,
        url: &str,
        content_type: &str,
        content_length: u64,
        body: ByteStream,
    ) -> Result<()>;
}
