//! Lazily fetched, path-keyed cache of an upload's directory tree.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::listing::{RawFileOptions, enrich, fetch_directory, fetch_raw_file};
use super::node::{ChildEntry, DirectoryNode, FetchState};
use super::path::normalize_path;
use crate::api::Transport;
use crate::archive::{ArchiveQuery, DEFAULT_OWNER};
use crate::error::{PortalError, Result};

/// Page size of directory listings unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

type ListingResult = std::result::Result<Vec<ChildEntry>, Arc<PortalError>>;
type Listing = Shared<BoxFuture<'static, ListingResult>>;

/// Cache slot of one path.
enum Slot {
    Fetching {
        generation: u64,
        open: bool,
        /// Slot state before this fetch, restored if the fetch is cancelled
        prior: Option<Box<Slot>>,
        listing: Listing,
    },
    Loaded(DirectoryNode),
    Failed {
        error: Arc<PortalError>,
        stale: Option<DirectoryNode>,
    },
}

impl Slot {
    fn state(&self) -> FetchState {
        match self {
            Slot::Fetching { .. } => FetchState::Fetching,
            Slot::Loaded(_) => FetchState::Loaded,
            Slot::Failed { .. } => FetchState::Error,
        }
    }

    /// Content visible to readers, possibly stale.
    fn node(&self) -> Option<&DirectoryNode> {
        match self {
            Slot::Loaded(node) => Some(node),
            Slot::Failed { stale, .. } => stale.as_ref(),
            Slot::Fetching { prior, .. } => prior.as_deref().and_then(Slot::node),
        }
    }
}

/// Settings for a [`RemoteTree`].
#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Owner scope of the parser enrichment query
    pub owner: String,
    /// Page size for directory listings
    pub page_size: u32,
    /// Cancelled when the owning view goes away
    pub cancel: CancellationToken,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            owner: DEFAULT_OWNER.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            cancel: CancellationToken::new(),
        }
    }
}

/// Where directory listings come from. Shared with running fetch tasks.
struct Source {
    transport: Arc<dyn Transport>,
    archive: ArchiveQuery,
    upload_id: String,
    owner: String,
    page_size: u32,
}

impl Source {
    /// List `dir`, then annotate its files. Enrichment failures are logged only.
    async fn list_and_enrich(&self, dir: &str) -> Result<Vec<ChildEntry>> {
        let mut content =
            fetch_directory(self.transport.as_ref(), &self.upload_id, dir, self.page_size).await?;

        if let Err(error) = enrich(&self.archive, &self.owner, &self.upload_id, dir, &mut content).await {
            warn!(upload_id = %self.upload_id, path = dir, %error, "parser enrichment failed");
        }
        Ok(content)
    }
}

struct Inner {
    source: Arc<Source>,
    cancel: CancellationToken,
    generation: AtomicU64,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Inner {
    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn upload_id(&self) -> &str {
        &self.source.upload_id
    }

    /// Store the outcome of fetch `generation` if it still owns `path`.
    fn commit(&self, path: &str, generation: u64, result: &ListingResult) {
        let mut slots = self.slots();
        match slots.remove(path) {
            Some(Slot::Fetching {
                generation: current,
                open,
                prior,
                ..
            }) if current == generation => {
                let next = match result {
                    Ok(content) => Some(Slot::Loaded(DirectoryNode {
                        path: path.to_string(),
                        open,
                        content: content.clone(),
                    })),
                    Err(error) if error.is_cancelled() => {
                        debug!(upload_id = %self.upload_id(), path, "directory fetch cancelled");
                        prior.map(|slot| *slot)
                    }
                    Err(error) => {
                        debug!(upload_id = %self.upload_id(), path, %error, "directory fetch failed");
                        Some(Slot::Failed {
                            error: Arc::clone(error),
                            stale: prior.and_then(|slot| slot.node().cloned()),
                        })
                    }
                };
                if let Some(next) = next {
                    slots.insert(path.to_string(), next);
                }
            }
            // Superseded, invalidated or already restored by a cancel.
            Some(other) => {
                slots.insert(path.to_string(), other);
            }
            None => {}
        }
    }

    /// Return every path being fetched to the state it had before the fetch.
    fn restore_fetching(&self) {
        let mut slots = self.slots();
        let fetching: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Fetching { .. }))
            .map(|(path, _)| path.clone())
            .collect();

        for path in fetching {
            if let Some(Slot::Fetching {
                prior: Some(prior), ..
            }) = slots.remove(&path)
            {
                slots.insert(path, *prior);
            }
        }
    }
}

/// Remote directory tree of one upload.
///
/// Directories are fetched on [`expand`](Self::expand) and cached by
/// normalized path. A loaded path is never fetched again unless
/// [`refresh`](Self::refresh)ed or [`invalidate`](Self::invalidate)d, so its
/// content can be stale. Concurrent expands of one path share one request.
///
/// Cloning is cheap and every clone sees the same cache.
///
/// # Example
/// ```no_run
/// # use std::sync::Arc;
/// # use nomadlib::{ApiClient, RemoteTree};
/// # async fn example() -> nomadlib::Result<()> {
/// let tree = RemoteTree::new(Arc::new(ApiClient::default()), "u1");
/// tree.expand("").await?;
/// if let Some(root) = tree.read("") {
///     for entry in &root.content {
///         println!("{} {:?}", entry.name, entry.parser);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RemoteTree {
    inner: Arc<Inner>,
}

impl RemoteTree {
    /// Create a tree for `upload_id` with default options.
    pub fn new(transport: Arc<dyn Transport>, upload_id: impl Into<String>) -> Self {
        Self::with_options(transport, upload_id, TreeOptions::default())
    }

    pub fn with_options(
        transport: Arc<dyn Transport>,
        upload_id: impl Into<String>,
        options: TreeOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source: Arc::new(Source {
                    archive: ArchiveQuery::new(transport.clone()),
                    transport,
                    upload_id: upload_id.into(),
                    owner: options.owner,
                    page_size: options.page_size.max(1),
                }),
                cancel: options.cancel,
                generation: AtomicU64::new(0),
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn upload_id(&self) -> &str {
        self.inner.upload_id()
    }

    /// Open `path`, fetching it unless it is already loaded.
    ///
    /// A loaded path is marked open without any request. A path being fetched
    /// is joined. Otherwise the directory is listed and then enriched with
    /// parser names; a failed enrichment still loads the listing.
    ///
    /// The fetch runs as a Tokio task and updates the cache even if this
    /// future is dropped before it completes.
    pub async fn expand(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        let listing = {
            let mut slots = self.inner.slots();
            match slots.get_mut(&path) {
                Some(Slot::Loaded(node)) => {
                    node.open = true;
                    debug!(upload_id = %self.inner.upload_id(), path = %path, "directory cache hit");
                    return Ok(());
                }
                Some(Slot::Fetching { open, listing, .. }) => {
                    *open = true;
                    listing.clone()
                }
                _ => self.start_fetch(&mut slots, &path)?,
            }
        };

        listing.await.map(|_| ()).map_err(PortalError::from_shared)
    }

    /// Re-fetch `path` even if it is loaded, joining a fetch already in flight.
    ///
    /// The previous content stays readable until the new listing arrives.
    pub async fn refresh(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        let listing = {
            let mut slots = self.inner.slots();
            match slots.get_mut(&path) {
                Some(Slot::Fetching { open, listing, .. }) => {
                    *open = true;
                    listing.clone()
                }
                _ => self.start_fetch(&mut slots, &path)?,
            }
        };

        listing.await.map(|_| ()).map_err(PortalError::from_shared)
    }

    /// Cached node of `path`. Never fetches.
    ///
    /// While a refresh is in flight or after it failed, this is the content of
    /// the last successful listing.
    pub fn read(&self, path: &str) -> Option<DirectoryNode> {
        let path = normalize_path(path);
        self.inner.slots().get(&path).and_then(Slot::node).cloned()
    }

    pub fn state(&self, path: &str) -> FetchState {
        let path = normalize_path(path);
        self.inner
            .slots()
            .get(&path)
            .map_or(FetchState::Unfetched, Slot::state)
    }

    /// Message of the error that ended the last fetch of `path`.
    pub fn last_error(&self, path: &str) -> Option<String> {
        let path = normalize_path(path);
        match self.inner.slots().get(&path) {
            Some(Slot::Failed { error, .. }) => Some(error.to_string()),
            _ => None,
        }
    }

    /// Close `path`, keeping its content for a cheap re-expand.
    pub fn collapse(&self, path: &str) {
        let path = normalize_path(path);
        match self.inner.slots().get_mut(&path) {
            Some(Slot::Loaded(node)) => node.open = false,
            Some(Slot::Fetching { open, .. }) => *open = false,
            Some(Slot::Failed {
                stale: Some(node), ..
            }) => node.open = false,
            _ => {}
        }
    }

    /// Forget `path` so the next expand fetches it again.
    ///
    /// A fetch in flight for `path` still completes for its callers but no
    /// longer updates the cache.
    pub fn invalidate(&self, path: &str) {
        let path = normalize_path(path);
        if self.inner.slots().remove(&path).is_some() {
            debug!(upload_id = %self.inner.upload_id(), path = %path, "directory invalidated");
        }
    }

    /// Forget every cached path.
    pub fn clear(&self) {
        self.inner.slots().clear();
    }

    /// Paths currently cached, in no particular order.
    pub fn cached_paths(&self) -> Vec<String> {
        self.inner.slots().keys().cloned().collect()
    }

    /// Read a raw file of the upload, optionally a byte range of it.
    pub async fn read_file(&self, path: &str, options: RawFileOptions) -> Result<Vec<u8>> {
        if self.inner.cancel.is_cancelled() {
            return Err(PortalError::Cancelled);
        }
        let path = normalize_path(path);
        let source = &self.inner.source;
        let read = fetch_raw_file(source.transport.as_ref(), &source.upload_id, &path, options);
        tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => Err(PortalError::Cancelled),
            result = read => result,
        }
    }

    /// Cancel every fetch in flight and refuse new ones.
    ///
    /// Call this when the owning view goes away. Paths being fetched return to
    /// the state they had before the fetch.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
        self.inner.restore_fetching();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Token the tree's requests are tied to.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Put `path` into the fetching state and create the shared listing.
    fn start_fetch(
        &self,
        slots: &mut HashMap<String, Slot>,
        path: &str,
    ) -> Result<Listing> {
        if self.inner.cancel.is_cancelled() {
            return Err(PortalError::Cancelled);
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let source = Arc::clone(&self.inner.source);
        let tree: Weak<Inner> = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        let dir = path.to_string();

        // The task commits its own result, so no waiter has to outlive it.
        let task = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Arc::new(PortalError::Cancelled)),
                result = source.list_and_enrich(&dir) => result.map_err(Arc::new),
            };
            if let Some(inner) = tree.upgrade() {
                inner.commit(&dir, generation, &result);
            }
            result
        });
        let listing = async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(Arc::new(PortalError::Cancelled)),
                Err(e) => Err(Arc::new(PortalError::InvalidResponse(format!(
                    "directory fetch task failed: {}",
                    e
                )))),
            }
        }
        .boxed()
        .shared();

        let prior = slots.remove(path).map(Box::new);
        slots.insert(
            path.to_string(),
            Slot::Fetching {
                generation,
                open: true,
                prior,
                listing: listing.clone(),
            },
        );
        debug!(upload_id = %self.inner.upload_id(), path, generation, "fetching directory");
        Ok(listing)
    }
}
