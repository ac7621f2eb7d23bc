//! Directory nodes and their entries.

use serde::{Deserialize, Serialize};

/// One child of a remote directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub name: String,
    pub is_file: bool,
    /// Size in bytes, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Short parser name (`vasp`), only on files recognised as a mainfile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

impl ChildEntry {
    pub fn file(name: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            name: name.into(),
            is_file: true,
            size,
            parser: None,
            entry_id: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_file: false,
            size: None,
            parser: None,
            entry_id: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        !self.is_file
    }
}

/// A fetched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryNode {
    /// Normalized path, `""` for the upload root
    pub path: String,
    /// Expansion state
    pub open: bool,
    /// Children in server order
    pub content: Vec<ChildEntry>,
}

impl DirectoryNode {
    pub fn new(path: impl Into<String>, content: Vec<ChildEntry>) -> Self {
        Self {
            path: path.into(),
            open: true,
            content,
        }
    }

    /// Iterate over the file children.
    pub fn files(&self) -> impl Iterator<Item = &ChildEntry> {
        self.content.iter().filter(|e| e.is_file)
    }

    /// Iterate over the directory children.
    pub fn directories(&self) -> impl Iterator<Item = &ChildEntry> {
        self.content.iter().filter(|e| e.is_dir())
    }

    /// Look up a child by name.
    pub fn child(&self, name: &str) -> Option<&ChildEntry> {
        self.content.iter().find(|e| e.name == name)
    }
}

/// Fetch state of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Unfetched,
    Fetching,
    Loaded,
    Error,
}
