//! Upload lifecycle: records, the upload collection and per-upload operations.

pub mod collection;
pub mod record;
pub mod resource;

pub use collection::{DeleteAck, UploadCollection, UploadPage};
pub use record::{UploadPatch, UploadRecord, UploadStatus};
pub use resource::{PAYLOAD_CONTENT_TYPE, TransferResult, UploadResource};
