//! In-memory transport for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use super::error::error_from_response;
use super::transport::{ApiRequest, ByteStream, Method, Transport};
use crate::error::{PortalError, Result};

/// A scripted reply for one route.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 2xx with a JSON body.
    Json(Value),
    /// 2xx with a raw body.
    Bytes(Vec<u8>),
    /// Non-2xx with the given body, mapped like a real response.
    Status { status: u16, body: String },
    /// Transport failure, reported as [`PortalError::Network`].
    Unreachable,
}

impl MockReply {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        MockReply::Status {
            status,
            body: body.into(),
        }
    }
}

/// A payload received through [`Transport::put_object`].
#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub url: String,
    pub content_type: String,
    pub content_length: u64,
    pub body: Vec<u8>,
}

/// Scripted transport that records every request.
///
/// Replies are keyed by method and path (query parameters are recorded but
/// not matched). Several replies queued for one route are served in order;
/// the last one is repeated once the queue is down to it. Unscripted routes
/// answer 404.
///
/// # Example
///
/// ```ignore
/// use nomadlib::api::mock::{MockReply, MockTransport};
/// use nomadlib::api::{ApiRequest, Method, Transport};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> nomadlib::Result<()> {
/// let transport = MockTransport::new();
/// transport.reply(Method::Get, "uploads/u1", MockReply::Json(json!({"upload_id": "u1"})));
///
/// let value = transport.call(ApiRequest::get("uploads/u1")).await?;
/// assert_eq!(value["upload_id"], "u1");
/// assert_eq!(transport.request_count(Method::Get, "uploads/u1"), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<MockReply>>>,
    requests: Mutex<Vec<ApiRequest>>,
    puts: Mutex<Vec<RecordedPut>>,
    put_reply: Mutex<Option<MockReply>>,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `method` + `path`.
    pub fn reply(&self, method: Method, path: impl Into<String>, reply: MockReply) {
        lock(&self.routes)
            .entry((method, path.into()))
            .or_default()
            .push_back(reply);
    }

    /// Shorthand for a JSON `GET` reply.
    pub fn reply_get(&self, path: impl Into<String>, body: Value) {
        self.reply(Method::Get, path, MockReply::Json(body));
    }

    /// Shorthand for a JSON `POST` reply.
    pub fn reply_post(&self, path: impl Into<String>, body: Value) {
        self.reply(Method::Post, path, MockReply::Json(body));
    }

    /// Make every pre-signed `PUT` answer with `reply` instead of success.
    pub fn fail_puts_with(&self, reply: MockReply) {
        *lock(&self.put_reply) = Some(reply);
    }

    /// Delay every API call, to keep requests in flight.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// Every API request received so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        lock(&self.requests).clone()
    }

    /// Number of API requests received for `method` + `path`.
    pub fn request_count(&self, method: Method, path: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Every payload received so far.
    pub fn puts(&self) -> Vec<RecordedPut> {
        lock(&self.puts).clone()
    }

    fn next_reply(&self, request: &ApiRequest) -> MockReply {
        let mut routes = lock(&self.routes);
        match routes.get_mut(&(request.method, request.path.clone())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(MockReply::Unreachable),
            Some(queue) => queue.front().cloned().unwrap_or(MockReply::Unreachable),
            None => MockReply::status(404, r#"{"detail": "Not Found"}"#),
        }
    }

    async fn respond(&self, request: ApiRequest) -> Result<MockReply> {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.next_reply(&request);
        lock(&self.requests).push(request);
        resolve(reply)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A genuine `reqwest::Error`, so scripted outages map to [`PortalError::Network`].
fn transport_failure() -> PortalError {
    // An empty URL never builds.
    match reqwest::Client::new().get("").build() {
        Err(e) => PortalError::Network(e),
        Ok(_) => PortalError::InvalidResponse("mock transport failure".into()),
    }
}

fn resolve(reply: MockReply) -> Result<MockReply> {
    match reply {
        MockReply::Status { status, body } => Err(error_from_response(status, &body)),
        MockReply::Unreachable => Err(transport_failure()),
        other => Ok(other),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(&self, request: ApiRequest) -> Result<Value> {
        match self.respond(request).await? {
            MockReply::Json(value) => Ok(value),
            MockReply::Bytes(bytes) if bytes.is_empty() => Ok(Value::Null),
            MockReply::Bytes(bytes) => Ok(serde_json::from_slice(&bytes)?),
            _ => Err(PortalError::InvalidResponse("unexpected mock reply".into())),
        }
    }

    async fn fetch_bytes(&self, request: ApiRequest) -> Result<Vec<u8>> {
        match self.respond(request).await? {
            MockReply::Bytes(bytes) => Ok(bytes),
            MockReply::Json(value) => Ok(serde_json::to_vec(&value)?),
            _ => Err(PortalError::InvalidResponse("unexpected mock reply".into())),
        }
    }

    async fn put_object(
        &self,
        url: &str,
        content_type: &str,
        content_length: u64,
        mut body: ByteStream,
    ) -> Result<()> {
        let mut received = Vec::new();
        while let Some(chunk) = body.next().await {
            received.extend_from_slice(&chunk?);
        }

        lock(&self.puts).push(RecordedPut {
            url: url.to_string(),
            content_type: content_type.to_string(),
            content_length,
            body: received,
        });

        let reply = lock(&self.put_reply).clone();
        match reply {
            Some(reply) => resolve(reply).map(|_| ()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replies_in_order_then_repeat_last() {
        let transport = MockTransport::new();
        transport.reply_get("uploads/u1", json!({"n": 1}));
        transport.reply_get("uploads/u1", json!({"n": 2}));

        let first = transport.call(ApiRequest::get("uploads/u1")).await.unwrap();
        let second = transport.call(ApiRequest::get("uploads/u1")).await.unwrap();
        let third = transport.call(ApiRequest::get("uploads/u1")).await.unwrap();

        assert_eq!(first["n"], 1);
        assert_eq!(second["n"], 2);
        assert_eq!(third["n"], 2);
        assert_eq!(transport.request_count(Method::Get, "uploads/u1"), 3);
    }

    #[tokio::test]
    async fn test_unscripted_route_is_not_found() {
        let transport = MockTransport::new();
        let err = transport.call(ApiRequest::get("nowhere")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_put_records_payload() {
        let transport = MockTransport::new();
        let body: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(b"ab".to_vec()),
            Ok(b"cd".to_vec()),
        ]));

        transport
            .put_object("https://store/u1", "application/gzip", 4, body)
            .await
            .unwrap();

        let puts = transport.puts();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].url, "https://store/u1");
        assert_eq!(puts[0].body, b"abcd");
    }

    #[tokio::test]
    async fn test_failed_put() {
        let transport = MockTransport::new();
        transport.fail_puts_with(MockReply::status(403, "<Error>SignatureDoesNotMatch</Error>"));
        let body: ByteStream = Box::pin(futures::stream::iter(vec![Ok(b"x".to_vec())]));

        let err = transport
            .put_object("https://store/u1", "application/gzip", 1, body)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
    }
}
