//! Lazy remote file tree of an upload.
//!
//! [`RemoteTree`] fetches one directory level at a time from the upload's raw
//! directory listing, annotates mainfiles with their parser, and caches the
//! result per normalized path.

pub mod adaptor;
pub mod listing;
pub mod node;
pub mod path;

pub use adaptor::{RemoteTree, TreeOptions};
pub use listing::{RawFileOptions, short_parser_name};
pub use node::{ChildEntry, DirectoryNode, FetchState};
pub use path::{join_path, normalize_path, parent_path};
