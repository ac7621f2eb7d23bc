//! Filtered, paginated queries over processed entry metadata.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::api::{ApiRequest, Transport};
use crate::error::{PortalError, Result};
use crate::pagination::{PageInfo, PageRequest};

/// Owner scope applied when none is given.
pub const DEFAULT_OWNER: &str = "visible";

/// Request body for `POST /entries/query`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryQuery {
    /// Owner scope (`visible`, `user`, `public`, ...)
    pub owner: String,
    /// Filter predicate, one key per quantity (`upload_id`, `mainfile:any`, ...)
    pub filter: Map<String, Value>,
    /// Fields to return; `None` returns the server default projection
    pub include: Option<Vec<String>>,
    pub pagination: PageRequest,
}

impl EntryQuery {
    pub fn new() -> Self {
        Self {
            owner: DEFAULT_OWNER.to_string(),
            filter: Map::new(),
            include: None,
            pagination: PageRequest::default(),
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Add one filter criterion.
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(key.into(), value.into());
        self
    }

    /// Restrict to the entries of one upload.
    pub fn upload(self, upload_id: &str) -> Self {
        self.filter("upload_id", upload_id)
    }

    /// Restrict to entries whose mainfile is any of `mainfiles`.
    pub fn mainfiles<I, S>(self, mainfiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list: Vec<Value> = mainfiles
            .into_iter()
            .map(|m| Value::String(m.into()))
            .collect();
        self.filter("mainfile:any", list)
    }

    /// Only return these fields.
    pub fn include<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn paginate(mut self, pagination: PageRequest) -> Self {
        self.pagination = pagination;
        self
    }

    /// JSON body as the endpoint expects it.
    pub fn to_body(&self) -> Result<Value> {
        let mut body = json!({
            "owner": self.owner,
            "query": self.filter,
            "pagination": serde_json::to_value(&self.pagination)?,
        });
        if let Some(include) = &self.include {
            body["required"] = json!({ "include": include });
        }
        Ok(body)
    }
}

impl Default for EntryQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata of one processed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default)]
    pub entry_id: String,
    #[serde(default)]
    pub upload_id: Option<String>,
    /// Path of the mainfile relative to the upload root
    #[serde(default)]
    pub mainfile: Option<String>,
    /// Full parser name, e.g. `parsers/vasp`
    #[serde(default)]
    pub parser_name: Option<String>,
    /// Every other field the server returned
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage<T> {
    pub data: Vec<T>,
    pub total: u64,
    /// Cursor for the next page, absent on the last page
    pub next_page_after_value: Option<String>,
}

#[derive(Deserialize)]
struct QueryResponse<T> {
    #[serde(default)]
    pagination: Option<PageInfo>,
    data: Vec<T>,
}

/// Stateless client for the entries query endpoint.
#[derive(Clone)]
pub struct ArchiveQuery {
    transport: Arc<dyn Transport>,
}

impl ArchiveQuery {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Run `query` and return one page of entry metadata.
    pub async fn query(&self, query: &EntryQuery) -> Result<QueryPage<EntryMetadata>> {
        self.query_as(query).await
    }

    /// Run `query`, deserializing each record into `T`.
    pub async fn query_as<T: DeserializeOwned>(&self, query: &EntryQuery) -> Result<QueryPage<T>> {
        let request = ApiRequest::post("entries/query", query.to_body()?);
        let value = self.transport.call(request).await?;
        if !value.is_object() {
            return Err(PortalError::InvalidResponse(
                "entries query did not return an object".into(),
            ));
        }

        let response: QueryResponse<T> = serde_json::from_value(value)?;
        let (total, next_page_after_value) = match response.pagination {
            Some(info) => (info.total, info.next_page_after_value),
            None => (response.data.len() as u64, None),
        };
        debug!(count = response.data.len(), total, "entries query");

        Ok(QueryPage {
            data: response.data,
            total,
            next_page_after_value,
        })
    }
}
