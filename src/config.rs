//! Client configuration.

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::archive::DEFAULT_OWNER;
use crate::error::{PortalError, Result};
use crate::tree::adaptor::DEFAULT_PAGE_SIZE;
use crate::uploads::resource::DEFAULT_CHUNK_SIZE;

/// Connection and paging settings for a portal client.
#[derive(Debug, Deserialize, Clone)]
pub struct PortalConfig {
    /// Base URL of the REST API. Default: "http://localhost/nomad-oasis/api/v1".
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Bearer token sent with every API request (never with pre-signed transfers).
    #[serde(default)]
    pub access_token: Option<String>,
    /// Optional HTTP/SOCKS proxy URL.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Per-request timeout for API calls, in seconds. Default: 20.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Page size used when walking paginated directory listings. Default: 100.
    #[serde(default = "default_directory_page_size")]
    pub directory_page_size: u32,
    /// Size of the chunks streamed to the pre-signed destination. Default: 64 KiB.
    #[serde(default = "default_transfer_chunk_size")]
    pub transfer_chunk_size: usize,
    /// Owner scope used for entry queries. Default: "visible".
    #[serde(default = "default_owner")]
    pub owner: String,
}

fn default_api_base() -> String {
    "http://localhost/nomad-oasis/api/v1".into()
}
fn default_request_timeout_secs() -> u64 {
    20
}
fn default_directory_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}
fn default_transfer_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_owner() -> String {
    DEFAULT_OWNER.into()
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            access_token: None,
            proxy: None,
            request_timeout_secs: default_request_timeout_secs(),
            directory_page_size: default_directory_page_size(),
            transfer_chunk_size: default_transfer_chunk_size(),
            owner: default_owner(),
        }
    }
}

impl PortalConfig {
    /// Create a configuration pointing at `api_base` with every other field defaulted.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Self::default()
        }
    }

    /// Load configuration from `config/nomad.*` (optional) and the environment.
    ///
    /// Environment variables override the file, e.g. `NOMAD__API_BASE` or
    /// `NOMAD__ACCESS_TOKEN`.
    pub fn load() -> Result<Self> {
        let s = Config::builder()
            .add_source(File::with_name("config/nomad").required(false))
            .add_source(Environment::with_prefix("NOMAD").separator("__"))
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the client cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.api_base.trim().is_empty() {
            return Err(PortalError::InvalidArgument("api_base must not be empty".into()));
        }
        if self.directory_page_size == 0 {
            return Err(PortalError::InvalidArgument(
                "directory_page_size must be at least 1".into(),
            ));
        }
        if self.transfer_chunk_size == 0 {
            return Err(PortalError::InvalidArgument(
                "transfer_chunk_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Request timeout as a [`Duration`](std::time::Duration).
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}
