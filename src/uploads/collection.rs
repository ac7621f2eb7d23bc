//! Listing, creation and deletion of uploads.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::record::UploadRecord;
use crate::api::{ApiRequest, Transport, encode_path, unwrap_data};
use crate::error::{PortalError, Result};
use crate::pagination::PageInfo;

/// One page of the upload listing.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPage {
    /// Records in server order
    pub uploads: Vec<UploadRecord>,
    /// Total number of uploads across all pages
    pub total: u64,
}

/// Outcome of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAck {
    /// The server deleted the upload.
    Deleted,
    /// The upload did not exist (already deleted); treated as success.
    AlreadyGone,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    pagination: Option<PageInfo>,
    #[serde(default)]
    data: Vec<UploadRecord>,
}

/// The caller's uploads.
#[derive(Clone)]
pub struct UploadCollection {
    transport: Arc<dyn Transport>,
}

impl UploadCollection {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// List one page of uploads.
    ///
    /// Pages are 1-based; `page == 0` or `per_page == 0` is rejected before any request.
    pub async fn list(&self, page: u32, per_page: u32) -> Result<UploadPage> {
        if page == 0 {
            return Err(PortalError::InvalidArgument("page numbers start at 1".into()));
        }
        if per_page == 0 {
            return Err(PortalError::InvalidArgument("per_page must be at least 1".into()));
        }

        let request = ApiRequest::get("uploads")
            .with_query("page", page)
            .with_query("page_size", per_page);
        let value = self.transport.call(request).await?;
        let page = parse_page(value)?;
        debug!(count = page.uploads.len(), total = page.total, "listed uploads");
        Ok(page)
    }

    /// Create a new upload named `name`.
    pub async fn create(&self, name: &str) -> Result<UploadRecord> {
        create_upload(self.transport.as_ref(), name).await
    }

    /// Delete an upload.
    ///
    /// Deleting an id the server no longer knows is not an error, so repeated
    /// deletes are idempotent. Every other failure propagates.
    pub async fn delete(&self, upload_id: &str) -> Result<DeleteAck> {
        let path = format!("uploads/{}", encode_path(upload_id));
        match self.transport.call(ApiRequest::delete(path)).await {
            Ok(_) => {
                info!(upload_id, "upload deleted");
                Ok(DeleteAck::Deleted)
            }
            Err(e) if e.is_not_found() => {
                debug!(upload_id, "upload already gone");
                Ok(DeleteAck::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }
}

/// `POST /uploads`, shared by the collection and the resource.
pub(crate) async fn create_upload(transport: &dyn Transport, name: &str) -> Result<UploadRecord> {
    let value = transport
        .call(ApiRequest::post("uploads", json!({ "name": name })))
        .await?;
    let record: UploadRecord = serde_json::from_value(unwrap_data(value))?;
    info!(upload_id = %record.upload_id, name, "upload created");
    Ok(record)
}

fn parse_page(value: Value) -> Result<UploadPage> {
    match value {
        // Older servers answer with a bare array.
        Value::Array(_) => {
            let uploads: Vec<UploadRecord> = serde_json::from_value(value)?;
            Ok(UploadPage {
                total: uploads.len() as u64,
                uploads,
            })
        }
        Value::Object(_) => {
            let response: ListResponse = serde_json::from_value(value)?;
            let total = match response.pagination {
                Some(info) => info.total,
                None => response.data.len() as u64,
            };
            Ok(UploadPage {
                uploads: response.data,
                total,
            })
        }
        other => Err(PortalError::InvalidResponse(format!(
            "expected an upload listing, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Method;
    use crate::api::mock::{MockReply, MockTransport};

    fn collection() -> (Arc<MockTransport>, UploadCollection) {
        let transport = Arc::new(MockTransport::new());
        let collection = UploadCollection::new(transport.clone());
        (transport, collection)
    }

    #[tokio::test]
    async fn test_list_second_page() {
        let (transport, collection) = collection();
        let data: Vec<Value> = (10..20)
            .map(|i| json!({"upload_id": format!("u{}", i), "process_status": "SUCCESS"}))
            .collect();
        transport.reply_get(
            "uploads",
            json!({"pagination": {"total": 25, "page": 2, "page_size": 10}, "data": data}),
        );

        let page = collection.list(2, 10).await.unwrap();
        assert_eq!(page.uploads.len(), 10);
        assert_eq!(page.total, 25);
        assert_eq!(page.uploads[0].upload_id, "u10");
        assert_eq!(page.uploads[9].upload_id, "u19");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query_value("page"), Some("2"));
        assert_eq!(requests[0].query_value("page_size"), Some("10"));
    }

    #[tokio::test]
    async fn test_list_bare_array() {
        let (transport, collection) = collection();
        transport.reply_get("uploads", json!([{"upload_id": "u1"}, {"upload_id": "u2"}]));

        let page = collection.list(1, 10).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.uploads[1].upload_id, "u2");
    }

    #[tokio::test]
    async fn test_list_rejects_page_zero() {
        let (transport, collection) = collection();
        let err = collection.list(0, 10).await.unwrap_err();
        assert!(matches!(err, PortalError::InvalidArgument(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_list_rejects_scalar() {
        let (transport, collection) = collection();
        transport.reply_get("uploads", json!("nope"));
        let err = collection.list(1, 10).await.unwrap_err();
        assert!(matches!(err, PortalError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_create() {
        let (transport, collection) = collection();
        transport.reply_post("uploads", json!({"upload_id": "u1", "data": {"upload_id": "u1"}}));

        let record = collection.create("sample").await.unwrap();
        assert_eq!(record.upload_id, "u1");
        assert!(record.presigned_url.is_none());

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].body, Some(json!({"name": "sample"})));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (transport, collection) = collection();
        transport.reply(Method::Delete, "uploads/u1", MockReply::Json(json!({"upload_id": "u1"})));
        transport.reply(
            Method::Delete,
            "uploads/u1",
            MockReply::status(404, r#"{"detail": "The specified upload_id was not found."}"#),
        );

        assert_eq!(collection.delete("u1").await.unwrap(), DeleteAck::Deleted);
        assert_eq!(collection.delete("u1").await.unwrap(), DeleteAck::AlreadyGone);
        assert_eq!(transport.request_count(Method::Delete, "uploads/u1"), 2);
    }

    #[tokio::test]
    async fn test_delete_propagates_other_errors() {
        let (transport, collection) = collection();
        transport.reply(
            Method::Delete,
            "uploads/u1",
            MockReply::status(401, r#"{"detail": "Unauthorized"}"#),
        );
        let err = collection.delete("u1").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "API error 401: Unauthorized");

        transport.reply(Method::Delete, "uploads/u2", MockReply::Unreachable);
        let err = collection.delete("u2").await.unwrap_err();
        assert!(matches!(err, PortalError::Network(_)));
        assert_eq!(err.status(), None);
        assert_eq!(transport.request_count(Method::Delete, "uploads/u2"), 1);
    }
}
