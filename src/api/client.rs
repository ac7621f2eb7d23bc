//! Portal API client with request/response handling.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Body;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;

use super::transport::{ApiRequest, ByteStream, Transport};
use crate::config::PortalConfig;
use crate::error::Result;
use crate::http::HttpClient;

/// Default base URL of the portal API.
const API_URL: &str = "http://localhost/nomad-oasis/api/v1";

/// Portal API client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_url: String,
    access_token: Option<String>,
    request_timeout: Duration,
}

impl ApiClient {
    /// Create a new API client for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.into(),
            access_token: None,
            request_timeout: Duration::from_secs(20),
        }
    }

    /// Create a client from configuration (base URL, token, proxy, timeout).
    pub fn from_config(config: &PortalConfig) -> Result<Self> {
        let http = match &config.proxy {
            Some(proxy) => HttpClient::with_proxy(proxy)?,
            None => HttpClient::new(),
        };

        Ok(Self {
            http,
            base_url: config.api_base.clone(),
            access_token: config.access_token.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    /// Set the bearer token for authenticated requests.
    pub fn set_access_token(&mut self, token: String) {
        self.access_token = Some(token);
    }

    /// Clear the bearer token.
    pub fn clear_access_token(&mut self) {
        self.access_token = None;
    }

    /// Get the current bearer token, if any.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Base URL every request path is joined onto.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_request_timeout(&mut self, request_timeout: Duration) {
        self.request_timeout = request_timeout;
    }

    /// Absolute URL for an API-relative path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn build(&self, request: &ApiRequest) -> reqwest::RequestBuilder {
        let url = self.url(&request.path);
        let mut builder = self
            .http
            .request(request.method.into(), &url)
            .timeout(self.request_timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &self.access_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder
    }

    /// Send an API request. The timeout covers the response body too.
    async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        debug!(method = ?request.method, path = %request.path, "api request");
        self.http.send(self.build(request)).await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(API_URL)
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn call(&self, request: ApiRequest) -> Result<Value> {
        let response = self.send(&request).await?;
        let text = response.text().await?;
        debug!(path = %request.path, bytes = text.len(), "api response");

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn fetch_bytes(&self, request: ApiRequest) -> Result<Vec<u8>> {
        let response = self.send(&request).await?;
        let bytes = response.bytes().await?;
        debug!(path = %request.path, bytes = bytes.len(), "api raw response");
        Ok(bytes.to_vec())
    }

    async fn put_object(
        &self,
        url: &str,
        content_type: &str,
        content_length: u64,
        body: ByteStream,
    ) -> Result<()> {
        debug!(content_type, content_length, "streaming payload to pre-signed url");
        let request = self
            .http
            .request(reqwest::Method::PUT, url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, content_length)
            .body(Body::wrap_stream(body));

        self.http.send(request).await?;
        Ok(())
    }
}
