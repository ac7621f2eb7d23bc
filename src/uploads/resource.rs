//! Single-upload operations: create, refresh and payload transfer.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::collection::create_upload;
use super::record::{UploadPatch, UploadRecord};
use crate::api::{ApiRequest, ByteStream, Transport, encode_path, unwrap_data};
use crate::error::{PortalError, Result, TransferError, TransferFailure};
use crate::progress::{ProgressCallback, TransferProgress};

/// Content type of every upload payload.
pub const PAYLOAD_CONTENT_TYPE: &str = "application/gzip";

/// Default size of the chunks handed to the transport.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Result of a payload transfer. Both arms carry the record.
pub type TransferResult = std::result::Result<UploadRecord, TransferFailure>;

/// Operations on one upload's server-side record.
#[derive(Clone)]
pub struct UploadResource {
    transport: Arc<dyn Transport>,
    chunk_size: usize,
}

impl UploadResource {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the transfer chunk size. Zero is bumped to one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Create a new upload named `name`.
    ///
    /// The returned record carries a `presigned_url` only if the server is
    /// already prepared to accept a payload; otherwise [`refresh`](Self::refresh)
    /// until it does.
    pub async fn create(&self, name: &str) -> Result<UploadRecord> {
        create_upload(self.transport.as_ref(), name).await
    }

    /// Re-fetch `record` by id and merge every returned field into it.
    pub async fn refresh(&self, record: &mut UploadRecord) -> Result<()> {
        let path = format!("uploads/{}", encode_path(&record.upload_id));
        let value = self.transport.call(ApiRequest::get(path)).await?;
        let patch: UploadPatch = serde_json::from_value(unwrap_data(value))?;
        if let Some(id) = patch.upload_id.as_deref().filter(|id| *id != record.upload_id) {
            warn!(expected = %record.upload_id, got = id, "refresh returned a different upload id");
        }

        record.apply(patch);
        debug!(upload_id = %record.upload_id, status = %record.status, "upload refreshed");
        Ok(())
    }

    /// Refresh `record` until processing finishes.
    ///
    /// Sleeps `interval` between polls and gives up with
    /// [`PortalError::Timeout`] after `max_polls` refreshes without a
    /// terminal status. Errors from a refresh end the wait immediately.
    pub async fn wait_until_settled(
        &self,
        record: &mut UploadRecord,
        interval: Duration,
        max_polls: u32,
    ) -> Result<()> {
        for poll in 0..max_polls {
            if poll > 0 {
                tokio::time::sleep(interval).await;
            }
            self.refresh(record).await?;
            if record.status.is_terminal() {
                info!(upload_id = %record.upload_id, status = %record.status, "upload settled");
                return Ok(());
            }
        }

        Err(PortalError::Timeout(format!(
            "upload {} still {} after {} polls",
            record.upload_id, record.status, max_polls
        )))
    }

    /// Stream a local file to the upload's pre-signed destination.
    ///
    /// Fails with [`TransferError::MissingPresignedUrl`] before touching the
    /// file or the network if the record has no destination yet. `progress`
    /// is called after each chunk is handed to the transport and may return
    /// `false` to cancel; cancelling `cancel` has the same effect. Either way
    /// the outcome is [`TransferError::Aborted`].
    ///
    /// # Example
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use nomadlib::{ApiClient, UploadResource};
    /// # use tokio_util::sync::CancellationToken;
    /// # async fn example() -> nomadlib::Result<()> {
    /// let uploads = UploadResource::new(Arc::new(ApiClient::default()));
    /// let mut record = uploads.create("sample").await?;
    /// uploads.refresh(&mut record).await?;
    ///
    /// match uploads.upload_file(record, "sample.tar.gz", None, &CancellationToken::new()).await {
    ///     Ok(record) => println!("transferred {}", record.upload_id),
    ///     Err(failure) if failure.error.is_aborted() => println!("cancelled"),
    ///     Err(failure) => println!("failed: {}, retry {}", failure, failure.record.upload_id),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn upload_file(
        &self,
        record: UploadRecord,
        path: impl AsRef<Path>,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> TransferResult {
        let path = path.as_ref();
        let Some(url) = record.presigned_url.clone() else {
            return Err(TransferFailure::new(record, TransferError::MissingPresignedUrl));
        };

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let opened = async {
            let file = tokio::fs::File::open(path).await?;
            let size = file.metadata().await?.len();
            Ok::<_, io::Error>((file, size))
        }
        .await;
        let (file, size) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                return Err(TransferFailure::new(
                    record,
                    TransferError::Failed(PortalError::Io(e)),
                ));
            }
        };

        let chunks = ReaderStream::with_capacity(file, self.chunk_size)
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()));
        self.transfer(record, &url, chunks, size, filename, progress, cancel)
            .await
    }

    /// Stream an in-memory payload to the upload's pre-signed destination.
    ///
    /// Same contract as [`upload_file`](Self::upload_file).
    pub async fn upload_bytes(
        &self,
        record: UploadRecord,
        data: Vec<u8>,
        filename: &str,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> TransferResult {
        let Some(url) = record.presigned_url.clone() else {
            return Err(TransferFailure::new(record, TransferError::MissingPresignedUrl));
        };

        let size = data.len() as u64;
        let chunks: Vec<io::Result<Vec<u8>>> = data
            .chunks(self.chunk_size)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        self.transfer(
            record,
            &url,
            stream::iter(chunks),
            size,
            filename.to_string(),
            progress,
            cancel,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn transfer<S>(
        &self,
        record: UploadRecord,
        url: &str,
        chunks: S,
        size: u64,
        filename: String,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> TransferResult
    where
        S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
    {
        // Child token so a progress callback abort never cancels the caller's token.
        let abort = cancel.child_token();
        let body = report_progress(chunks, size, filename, progress, abort.clone());
        debug!(upload_id = %record.upload_id, size, "starting payload transfer");

        let outcome = tokio::select! {
            biased;
            _ = abort.cancelled() => Err(TransferError::Aborted),
            result = self.transport.put_object(url, PAYLOAD_CONTENT_TYPE, size, body) => {
                result.map_err(|e| {
                    if abort.is_cancelled() {
                        TransferError::Aborted
                    } else {
                        TransferError::Failed(e)
                    }
                })
            }
        };

        match outcome {
            Ok(()) => {
                info!(upload_id = %record.upload_id, size, "payload transferred");
                Ok(record)
            }
            Err(TransferError::Aborted) => {
                info!(upload_id = %record.upload_id, "payload transfer cancelled");
                Err(TransferFailure::new(record, TransferError::Aborted))
            }
            Err(error) => {
                warn!(upload_id = %record.upload_id, %error, "payload transfer failed");
                Err(TransferFailure::new(record, error))
            }
        }
    }
}

/// Wrap `chunks` so the callback sees the running byte count.
///
/// A callback returning `false` cancels `abort` and ends the body with an error.
fn report_progress<S>(
    chunks: S,
    total: u64,
    filename: String,
    mut progress: Option<ProgressCallback>,
    abort: CancellationToken,
) -> ByteStream
where
    S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
{
    let mut done = 0u64;
    Box::pin(chunks.map(move |chunk| {
        if abort.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "transfer cancelled"));
        }
        let chunk = chunk?;
        done += chunk.len() as u64;

        if let Some(callback) = progress.as_mut() {
            if !callback(&TransferProgress::new(done, total, filename.as_str())) {
                abort.cancel();
                return Err(io::Error::new(io::ErrorKind::Interrupted, "transfer cancelled"));
            }
        }
        Ok(chunk)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    use serde_json::json;

    use crate::api::Method;
    use crate::api::mock::{MockReply, MockTransport};
    use crate::uploads::UploadStatus;

    fn resource(chunk_size: usize) -> (Arc<MockTransport>, UploadResource) {
        let transport = Arc::new(MockTransport::new());
        let resource = UploadResource::new(transport.clone()).with_chunk_size(chunk_size);
        (transport, resource)
    }

    fn ready_record() -> UploadRecord {
        let mut record = UploadRecord::new("u1");
        record.presigned_url = Some("https://store/u1".to_string());
        record
    }

    fn recording_progress() -> (Arc<Mutex<Vec<u64>>>, ProgressCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Box::new(move |p: &TransferProgress| {
            sink.lock().unwrap().push(p.done);
            true
        });
        (seen, callback)
    }

    #[tokio::test]
    async fn test_upload_lifecycle() {
        let (transport, uploads) = resource(4);
        transport.reply_post("uploads", json!({"upload_id": "u1", "upload_name": "sample"}));
        transport.reply_get(
            "uploads/u1",
            json!({"data": {"upload_id": "u1", "presigned_url": "https://store/u1", "process_status": "PENDING"}}),
        );
        transport.reply_get("uploads/u1", json!({"data": {"upload_id": "u1", "process_status": "PROCESSING"}}));
        transport.reply_get("uploads/u1", json!({"data": {"upload_id": "u1", "process_status": "READY", "entries": 2}}));

        let mut record = uploads.create("sample").await.unwrap();
        assert_eq!(record.upload_id, "u1");
        assert!(record.presigned_url.is_none());

        uploads.refresh(&mut record).await.unwrap();
        assert_eq!(record.presigned_url.as_deref(), Some("https://store/u1"));
        assert_eq!(record.name.as_deref(), Some("sample"));

        let (seen, progress) = recording_progress();
        let record = uploads
            .upload_bytes(record, b"0123456789".to_vec(), "sample.tar.gz", Some(progress), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![4, 8, 10]);

        let puts = transport.puts();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].url, "https://store/u1");
        assert_eq!(puts[0].content_type, "application/gzip");
        assert_eq!(puts[0].content_length, 10);
        assert_eq!(puts[0].body, b"0123456789");

        let mut record = record;
        uploads.refresh(&mut record).await.unwrap();
        assert_eq!(record.status, UploadStatus::Processing);
        uploads.refresh(&mut record).await.unwrap();
        assert_eq!(record.status, UploadStatus::Ready);
        assert_eq!(record.entries, Some(2));
        // Not in the later responses, so kept from the earlier refresh.
        assert_eq!(record.presigned_url.as_deref(), Some("https://store/u1"));
    }

    #[tokio::test]
    async fn test_refresh_with_cleared_url_refuses_transfer() {
        let (transport, uploads) = resource(4);
        transport.reply_get(
            "uploads/u1",
            json!({"upload_id": "u1", "presigned_url": null, "process_status": "PROCESSING"}),
        );

        let mut record = UploadRecord::new("u1");
        record.presigned_url = Some("https://store/u1".to_string());
        uploads.refresh(&mut record).await.unwrap();
        assert!(record.presigned_url.is_none());
        assert_eq!(record.status, UploadStatus::Processing);

        let failure = uploads
            .upload_bytes(record, b"0123".to_vec(), "sample.tar.gz", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, TransferError::MissingPresignedUrl));
        assert!(transport.puts().is_empty());
    }

    #[tokio::test]
    async fn test_missing_presigned_url_fails_before_io() {
        let (transport, uploads) = resource(4);
        let record = UploadRecord::new("u1");

        let failure = uploads
            .upload_file(record.clone(), "/does/not/exist.tar.gz", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, TransferError::MissingPresignedUrl));
        assert_eq!(failure.record, record);

        let failure = uploads
            .upload_bytes(record, vec![1, 2, 3], "x.tar.gz", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, TransferError::MissingPresignedUrl));

        assert!(transport.requests().is_empty());
        assert!(transport.puts().is_empty());
    }

    #[tokio::test]
    async fn test_upload_file_streams_in_chunks() {
        let (transport, uploads) = resource(3);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abcdefgh").unwrap();
        file.flush().unwrap();

        let (seen, progress) = recording_progress();
        let record = uploads
            .upload_file(ready_record(), file.path(), Some(progress), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.upload_id, "u1");

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.last(), Some(&8));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(transport.puts()[0].body, b"abcdefgh");
        assert_eq!(transport.puts()[0].content_length, 8);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_a_failure() {
        let (transport, uploads) = resource(4);
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.tar.gz");

        let failure = uploads
            .upload_file(ready_record(), &missing, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, TransferError::Failed(PortalError::Io(_))));
        assert_eq!(failure.record, ready_record());
        assert!(transport.puts().is_empty());
    }

    #[tokio::test]
    async fn test_progress_callback_aborts() {
        let (_transport, uploads) = resource(2);
        let callback: ProgressCallback = Box::new(|p: &TransferProgress| p.done < 4);
        let cancel = CancellationToken::new();

        let failure = uploads
            .upload_bytes(ready_record(), b"abcdefgh".to_vec(), "x.tar.gz", Some(callback), &cancel)
            .await
            .unwrap_err();
        assert!(failure.error.is_aborted());
        assert_eq!(failure.record, ready_record());
        // The caller's token stays usable.
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts() {
        let (transport, uploads) = resource(2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = uploads
            .upload_bytes(ready_record(), b"abcd".to_vec(), "x.tar.gz", None, &cancel)
            .await
            .unwrap_err();
        assert!(failure.error.is_aborted());
        assert!(transport.puts().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_returns_record() {
        let (transport, uploads) = resource(4);
        transport.fail_puts_with(MockReply::status(403, "<Error>AccessDenied</Error>"));

        let failure = uploads
            .upload_bytes(ready_record(), b"abcd".to_vec(), "x.tar.gz", None, &CancellationToken::new())
            .await
            .unwrap_err();
        match &failure.error {
            TransferError::Failed(e) => assert_eq!(e.status(), Some(403)),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(failure.record, ready_record());
        assert!(!failure.error.is_aborted());
    }

    #[tokio::test]
    async fn test_wait_until_settled() {
        let (transport, uploads) = resource(4);
        transport.reply_get("uploads/u1", json!({"upload_id": "u1", "process_status": "RUNNING"}));
        transport.reply_get("uploads/u1", json!({"upload_id": "u1", "process_status": "RUNNING"}));
        transport.reply_get("uploads/u1", json!({"upload_id": "u1", "process_status": "SUCCESS"}));

        let mut record = UploadRecord::new("u1");
        uploads
            .wait_until_settled(&mut record, Duration::from_millis(1), 10)
            .await
            .unwrap();
        assert_eq!(record.status, UploadStatus::Ready);
        assert_eq!(transport.request_count(Method::Get, "uploads/u1"), 3);
    }

    #[tokio::test]
    async fn test_wait_until_settled_times_out() {
        let (transport, uploads) = resource(4);
        transport.reply_get("uploads/u1", json!({"upload_id": "u1", "process_status": "PROCESSING"}));

        let mut record = UploadRecord::new("u1");
        let err = uploads
            .wait_until_settled(&mut record, Duration::from_millis(1), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Timeout(_)));
        assert_eq!(transport.request_count(Method::Get, "uploads/u1"), 3);
    }

    #[tokio::test]
    async fn test_refresh_error_propagates() {
        let (transport, uploads) = resource(4);
        transport.reply(Method::Get, "uploads/u1", MockReply::status(500, "not json"));

        let mut record = ready_record();
        let err = uploads.refresh(&mut record).await.unwrap_err();
        match err {
            PortalError::ApiStatus { status, status_text } => {
                assert_eq!(status, 500);
                assert_eq!(status_text, "Internal Server Error");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(record, ready_record());
    }
}
