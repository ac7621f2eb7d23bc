//! Top-level handle tying configuration, transport and components together.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{ApiClient, Transport};
use crate::archive::ArchiveQuery;
use crate::config::PortalConfig;
use crate::error::Result;
use crate::tree::{RemoteTree, TreeOptions};
use crate::uploads::{UploadCollection, UploadResource};

/// Connection to one portal API.
///
/// Hands out the upload, query and tree components, all sharing one
/// transport. Cloning is cheap.
///
/// # Example
/// ```no_run
/// use nomadlib::{Portal, PortalConfig};
///
/// # async fn example() -> nomadlib::Result<()> {
/// let mut config = PortalConfig::new("https://nomad-lab.eu/prod/v1/api/v1");
/// config.access_token = Some("token".to_string());
/// let portal = Portal::connect(config)?;
///
/// let page = portal.uploads().list(1, 10).await?;
/// println!("{} uploads", page.total);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Portal {
    config: PortalConfig,
    transport: Arc<dyn Transport>,
}

impl Portal {
    /// Connect with the reqwest transport built from `config`.
    pub fn connect(config: PortalConfig) -> Result<Self> {
        config.validate()?;
        let client = ApiClient::from_config(&config)?;
        info!(api_base = %config.api_base, authenticated = config.access_token.is_some(), "portal client ready");
        Ok(Self {
            config,
            transport: Arc::new(client),
        })
    }

    /// Connect using [`PortalConfig::load`].
    pub fn from_env() -> Result<Self> {
        Self::connect(PortalConfig::load()?)
    }

    /// Use a custom transport, e.g. a mock in tests.
    pub fn with_transport(config: PortalConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn uploads(&self) -> UploadCollection {
        UploadCollection::new(self.transport())
    }

    /// Per-upload operations, streaming payloads in the configured chunk size.
    pub fn upload_resource(&self) -> UploadResource {
        UploadResource::new(self.transport()).with_chunk_size(self.config.transfer_chunk_size)
    }

    pub fn archive(&self) -> ArchiveQuery {
        ArchiveQuery::new(self.transport())
    }

    /// File tree of `upload_id` with its own cancellation token.
    pub fn tree(&self, upload_id: &str) -> RemoteTree {
        self.tree_with_cancel(upload_id, CancellationToken::new())
    }

    /// File tree of `upload_id` tied to `cancel`, typically a child of the
    /// owning view's token.
    pub fn tree_with_cancel(&self, upload_id: &str, cancel: CancellationToken) -> RemoteTree {
        let options = TreeOptions {
            owner: self.config.owner.clone(),
            page_size: self.config.directory_page_size,
            cancel,
        };
        RemoteTree::with_options(self.transport(), upload_id, options)
    }
}
