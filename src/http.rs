//! HTTP client wrapper for portal API requests.

use reqwest::{Client, Method, RequestBuilder, Response};

use crate::api::error::error_from_response;
use crate::error::{PortalError, Result};

/// HTTP client for making requests to the portal and its object storage.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a new HTTP client with a proxy.
    pub fn with_proxy(proxy: &str) -> Result<Self> {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| PortalError::InvalidArgument(format!("Invalid proxy: {}", e)))?;

        let client = Client::builder()
            .proxy(proxy)
            .build()
            .map_err(|e| PortalError::InvalidArgument(format!("Failed to build client: {}", e)))?;

        Ok(Self { client })
    }

    /// Start building a request.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send a request and turn non-2xx responses into API errors.
    ///
    /// Transport failures surface as [`PortalError::Network`]. For error
    /// statuses the body is read and handed to the API error mapping.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status.as_u16(), &body));
        }

        Ok(response)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
