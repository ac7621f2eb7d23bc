//! # nomadlib
//!
//! Rust client library for the upload and file-browsing API of a NOMAD
//! scientific-data portal.
//!
//! ## Features
//!
//! - **Uploads**:
//!   - Create, list (paginated) and delete uploads. Deleting an upload that is
//!     already gone succeeds.
//!   - Refresh an upload record with a field-level merge, or poll until
//!     processing settles.
//!   - Stream an archive to the upload's pre-signed URL with progress
//!     callbacks and cancellation. A failed transfer hands the record back.
//! - **File tree**:
//!   - Lazily list an upload's directories, one level per expand.
//!   - Annotate mainfiles with their parser via the entries query.
//!   - Per-path cache with expand/collapse state; concurrent expands of one
//!     path share a single request.
//!   - Read raw files, optionally a byte range.
//! - **Entry queries**: filtered, paginated metadata queries.
//!
//! Every component talks through the [`Transport`](api::Transport) trait.
//! [`ApiClient`] implements it over reqwest; enable the `mock` feature for a
//! scripted in-memory transport.
//!
//! ## Example: Upload a file
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use nomadlib::{Portal, PortalConfig, make_progress_bar};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> nomadlib::Result<()> {
//! let portal = Portal::connect(PortalConfig::load()?)?;
//! let uploads = portal.upload_resource();
//!
//! // The pre-signed URL shows up once the server is ready for the payload
//! let mut record = uploads.create("sample").await?;
//! uploads.refresh(&mut record).await?;
//!
//! let cancel = CancellationToken::new();
//! let mut record = match uploads
//!     .upload_file(record, "sample.tar.gz", Some(make_progress_bar()), &cancel)
//!     .await
//! {
//!     Ok(record) => record,
//!     Err(failure) => {
//!         eprintln!("{}", failure);
//!         return Ok(());
//!     }
//! };
//!
//! uploads.wait_until_settled(&mut record, Duration::from_secs(2), 60).await?;
//! println!("{} is {}", record.upload_id, record.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Example: Browse an upload
//!
//! ```no_run
//! use nomadlib::{Portal, PortalConfig};
//!
//! # async fn example() -> nomadlib::Result<()> {
//! let portal = Portal::connect(PortalConfig::default())?;
//! let tree = portal.tree("upload_id");
//!
//! tree.expand("").await?;
//! if let Some(root) = tree.read("") {
//!     for entry in &root.content {
//!         match &entry.parser {
//!             Some(parser) => println!("{} [{}]", entry.name, parser),
//!             None => println!("{}", entry.name),
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod archive;
pub mod config;
pub mod error;
pub mod http;
pub mod pagination;
pub mod portal;
pub mod progress;
pub mod tree;
pub mod uploads;

// Re-export commonly used types
pub use api::{ApiClient, ApiRequest, Method, Transport};
pub use archive::{ArchiveQuery, EntryMetadata, EntryQuery, QueryPage};
pub use config::PortalConfig;
pub use error::{PortalError, Result, TransferError, TransferFailure};
pub use pagination::{Order, PageInfo, PageRequest};
pub use portal::Portal;
pub use progress::{ProgressCallback, TransferProgress, make_progress_bar};
pub use tree::{ChildEntry, DirectoryNode, FetchState, RawFileOptions, RemoteTree, TreeOptions};
pub use uploads::{
    DeleteAck, UploadCollection, UploadPage, UploadRecord, UploadResource, UploadStatus,
};
