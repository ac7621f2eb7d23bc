//! Pagination request and response shapes shared by the listing endpoints.

use serde::{Deserialize, Serialize};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

/// Requested page of a listing. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRequest {
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_after_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
}

impl PageRequest {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            page: None,
            page_after_value: None,
            order_by: None,
            order: None,
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn after(mut self, value: impl Into<String>) -> Self {
        self.page_after_value = Some(value.into());
        self
    }

    pub fn order_by(mut self, key: impl Into<String>, order: Order) -> Self {
        self.order_by = Some(key.into());
        self.order = Some(order);
        self
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Pagination block returned next to a page of results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default, deserialize_with = "after_value")]
    pub next_page_after_value: Option<String>,
}

/// The API reports cursors as strings, but older servers send numbers.
fn after_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
