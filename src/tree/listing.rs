//! Directory listings, parser enrichment and raw file reads.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use super::node::ChildEntry;
use super::path::join_path;
use crate::api::{ApiRequest, Transport, encode_path};
use crate::archive::{ArchiveQuery, EntryMetadata, EntryQuery};
use crate::error::{PortalError, Result};
use crate::pagination::{PageInfo, PageRequest};

/// Fields requested from the entries query when annotating files.
const ENRICH_FIELDS: [&str; 3] = ["entry_id", "mainfile", "parser_name"];

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    is_file: bool,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    entry_id: Option<String>,
    #[serde(default)]
    parser_name: Option<String>,
}

impl From<RawEntry> for ChildEntry {
    fn from(raw: RawEntry) -> Self {
        // Directories never carry parser data.
        let (parser, entry_id) = if raw.is_file {
            (raw.parser_name.as_deref().map(short_parser_name), raw.entry_id)
        } else {
            (None, None)
        };
        ChildEntry {
            name: raw.name,
            is_file: raw.is_file,
            size: raw.size,
            parser,
            entry_id,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryMetadata {
    #[serde(default)]
    content: Vec<RawEntry>,
}

/// `rawdir` response; older servers put `content` at the top level.
#[derive(Debug, Deserialize)]
struct RawDirResponse {
    #[serde(default)]
    directory_metadata: Option<DirectoryMetadata>,
    #[serde(default)]
    content: Option<Vec<RawEntry>>,
    #[serde(default)]
    pagination: Option<PageInfo>,
}

impl RawDirResponse {
    fn into_parts(self) -> Result<(Vec<RawEntry>, Option<u64>)> {
        let total = self.pagination.map(|p| p.total);
        match (self.directory_metadata, self.content) {
            (Some(metadata), _) => Ok((metadata.content, total)),
            (None, Some(content)) => Ok((content, total)),
            (None, None) => Err(PortalError::InvalidResponse(
                "directory listing has no content".into(),
            )),
        }
    }
}

/// Strip the `parsers/` namespace from a parser name.
pub fn short_parser_name(parser_name: &str) -> String {
    parser_name
        .strip_prefix("parsers/")
        .unwrap_or(parser_name)
        .to_string()
}

/// API path of the directory listing for `path` (normalized) in `upload_id`.
pub(crate) fn rawdir_endpoint(upload_id: &str, path: &str) -> String {
    format!("uploads/{}/rawdir/{}", encode_path(upload_id), encode_path(path))
}

/// List the immediate children of `path`, following pages until the reported total.
pub(crate) async fn fetch_directory(
    transport: &dyn Transport,
    upload_id: &str,
    path: &str,
    page_size: u32,
) -> Result<Vec<ChildEntry>> {
    let endpoint = rawdir_endpoint(upload_id, path);
    let mut content: Vec<ChildEntry> = Vec::new();
    let mut page = 1u32;

    loop {
        let request = ApiRequest::get(endpoint.clone())
            .with_query("include_entry_info", false)
            .with_query("page", page)
            .with_query("page_size", page_size);
        let response: RawDirResponse = serde_json::from_value(transport.call(request).await?)?;
        let (entries, total) = response.into_parts()?;
        let received = entries.len();
        content.extend(entries.into_iter().map(ChildEntry::from));

        match total {
            Some(total) if received > 0 && (content.len() as u64) < total => page += 1,
            _ => break,
        }
    }

    debug!(upload_id, path, entries = content.len(), pages = page, "directory listed");
    Ok(content)
}

/// Attach parser names and entry ids to the files in `content`.
///
/// Issues no request when `content` has no files. Records are matched to
/// entries by exact equality of the full upload-relative path.
pub(crate) async fn enrich(
    archive: &ArchiveQuery,
    owner: &str,
    upload_id: &str,
    dir: &str,
    content: &mut [ChildEntry],
) -> Result<()> {
    let mainfiles: Vec<String> = content
        .iter()
        .filter(|e| e.is_file)
        .map(|e| join_path(dir, &e.name))
        .collect();
    if mainfiles.is_empty() {
        return Ok(());
    }

    let page_size = u32::try_from(mainfiles.len()).unwrap_or(u32::MAX);
    let query = EntryQuery::new()
        .owner(owner)
        .upload(upload_id)
        .mainfiles(mainfiles)
        .include(ENRICH_FIELDS)
        .paginate(PageRequest::new(page_size));
    let page = archive.query(&query).await?;

    let by_mainfile: HashMap<&str, &EntryMetadata> = page
        .data
        .iter()
        .filter_map(|m| m.mainfile.as_deref().map(|mainfile| (mainfile, m)))
        .collect();

    let mut matched = 0usize;
    for entry in content.iter_mut().filter(|e| e.is_file) {
        let Some(metadata) = by_mainfile.get(join_path(dir, &entry.name).as_str()) else {
            continue;
        };
        if let Some(parser_name) = metadata.parser_name.as_deref() {
            entry.parser = Some(short_parser_name(parser_name));
        }
        if !metadata.entry_id.is_empty() {
            entry.entry_id = Some(metadata.entry_id.clone());
        }
        matched += 1;
    }

    debug!(upload_id, dir, matched, "directory enriched");
    Ok(())
}

/// Byte range and decoding of a raw file read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawFileOptions {
    /// First byte to return
    pub offset: u64,
    /// Number of bytes to return; `None` reads to the end
    pub length: Option<u64>,
    /// Decompress `.gz` files on the server
    pub decompress: bool,
}

impl RawFileOptions {
    /// Read `length` bytes starting at `offset`.
    pub fn range(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length: Some(length),
            decompress: false,
        }
    }

    pub fn decompressed(mut self) -> Self {
        self.decompress = true;
        self
    }

    /// A non-zero offset needs a positive length, as the server demands.
    pub fn validate(&self) -> Result<()> {
        if self.offset > 0 && !self.length.is_some_and(|l| l > 0) {
            return Err(PortalError::InvalidArgument(
                "an offset requires a positive length".into(),
            ));
        }
        Ok(())
    }
}

/// Read the contents of a raw file.
pub(crate) async fn fetch_raw_file(
    transport: &dyn Transport,
    upload_id: &str,
    path: &str,
    options: RawFileOptions,
) -> Result<Vec<u8>> {
    options.validate()?;
    if path.is_empty() {
        return Err(PortalError::InvalidArgument("no file path given".into()));
    }

    let mut request = ApiRequest::get(format!(
        "uploads/{}/raw/{}",
        encode_path(upload_id),
        encode_path(path)
    ));
    if options.offset > 0 {
        request = request.with_query("offset", options.offset);
    }
    if let Some(length) = options.length {
        request = request.with_query("length", length);
    }
    if options.decompress {
        request = request.with_query("decompress", true);
    }

    let bytes = transport.fetch_bytes(request).await?;
    debug!(upload_id, path, bytes = bytes.len(), "raw file read");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::api::Method;
    use crate::api::mock::{MockReply, MockTransport};

    #[test]
    fn test_short_parser_name() {
        assert_eq!(short_parser_name("parsers/vasp"), "vasp");
        assert_eq!(short_parser_name("vasp"), "vasp");
        assert_eq!(short_parser_name("parsers/eels/x"), "eels/x");
    }

    #[test]
    fn test_rawdir_endpoint() {
        assert_eq!(rawdir_endpoint("u1", ""), "uploads/u1/rawdir/");
        assert_eq!(rawdir_endpoint("u1", "sub dir/x"), "uploads/u1/rawdir/sub%20dir/x");
    }

    #[test]
    fn test_directory_entries_drop_parser() {
        let raw: RawEntry = serde_json::from_value(json!({
            "name": "sub", "is_file": false, "parser_name": "parsers/vasp", "entry_id": "e1"
        }))
        .unwrap();
        let entry = ChildEntry::from(raw);
        assert!(entry.parser.is_none());
        assert!(entry.entry_id.is_none());
    }

    #[tokio::test]
    async fn test_fetch_follows_pages() {
        let transport = MockTransport::new();
        transport.reply_get(
            "uploads/u1/rawdir/sub",
            json!({
                "path": "sub",
                "directory_metadata": {"content": [
                    {"name": "1.aux", "is_file": true, "size": 8},
                    {"name": "2.aux", "is_file": true, "size": 8}
                ]},
                "pagination": {"total": 3, "page": 1, "page_size": 2}
            }),
        );
        transport.reply_get(
            "uploads/u1/rawdir/sub",
            json!({
                "path": "sub",
                "directory_metadata": {"content": [
                    {"name": "mainfile.json", "is_file": true, "size": 3237,
                     "entry_id": "id_01", "parser_name": "parsers/vasp"}
                ]},
                "pagination": {"total": 3, "page": 2, "page_size": 2}
            }),
        );

        let content = fetch_directory(&transport, "u1", "sub", 2).await.unwrap();
        let names: Vec<&str> = content.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["1.aux", "2.aux", "mainfile.json"]);
        assert_eq!(content[2].parser.as_deref(), Some("vasp"));
        assert_eq!(content[2].entry_id.as_deref(), Some("id_01"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].query_value("page"), Some("1"));
        assert_eq!(requests[1].query_value("page"), Some("2"));
        assert_eq!(requests[0].query_value("include_entry_info"), Some("false"));
        assert_eq!(requests[0].query_value("page_size"), Some("2"));
    }

    #[tokio::test]
    async fn test_fetch_stops_on_short_total() {
        let transport = MockTransport::new();
        // Server claims more than it delivers; an empty page ends the walk.
        transport.reply_get(
            "uploads/u1/rawdir/",
            json!({"directory_metadata": {"content": [{"name": "a", "is_file": true}]}, "pagination": {"total": 5}}),
        );
        transport.reply_get(
            "uploads/u1/rawdir/",
            json!({"directory_metadata": {"content": []}, "pagination": {"total": 5}}),
        );

        let content = fetch_directory(&transport, "u1", "", 10).await.unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(transport.request_count(Method::Get, "uploads/u1/rawdir/"), 2);
    }

    #[tokio::test]
    async fn test_fetch_legacy_shape() {
        let transport = MockTransport::new();
        transport.reply_get(
            "uploads/u1/rawdir/",
            json!({"content": [{"name": "a.json", "is_file": true}, {"name": "sub", "is_file": false}]}),
        );
        let content = fetch_directory(&transport, "u1", "", 100).await.unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(transport.requests().len(), 1);

        let transport = MockTransport::new();
        transport.reply_get("uploads/u1/rawdir/", json!({"path": ""}));
        let err = fetch_directory(&transport, "u1", "", 100).await.unwrap_err();
        assert!(matches!(err, PortalError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_enrich_matches_full_paths() {
        let transport = Arc::new(MockTransport::new());
        transport.reply_post(
            "entries/query",
            json!({"data": [
                {"entry_id": "e1", "mainfile": "sub/a.json", "parser_name": "parsers/vasp"},
                {"entry_id": "e9", "mainfile": "b.json", "parser_name": "parsers/exciting"}
            ]}),
        );
        let archive = ArchiveQuery::new(transport.clone());
        let mut content = vec![
            ChildEntry::file("a.json", None),
            ChildEntry::file("b.json", None),
            ChildEntry::directory("deeper"),
        ];

        enrich(&archive, "visible", "u1", "sub", &mut content).await.unwrap();
        assert_eq!(content[0].parser.as_deref(), Some("vasp"));
        assert_eq!(content[0].entry_id.as_deref(), Some("e1"));
        // `b.json` lives in the root, not in `sub`.
        assert!(content[1].parser.is_none());
        assert!(content[2].parser.is_none());

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["owner"], "visible");
        assert_eq!(body["query"]["upload_id"], "u1");
        assert_eq!(body["query"]["mainfile:any"], json!(["sub/a.json", "sub/b.json"]));
        assert_eq!(body["pagination"]["page_size"], 2);
        assert_eq!(body["required"]["include"], json!(["entry_id", "mainfile", "parser_name"]));
    }

    #[tokio::test]
    async fn test_enrich_skips_directories_only() {
        let transport = Arc::new(MockTransport::new());
        let archive = ArchiveQuery::new(transport.clone());
        let mut content = vec![ChildEntry::directory("sub")];

        enrich(&archive, "visible", "u1", "", &mut content).await.unwrap();
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_raw_file_options() {
        assert!(RawFileOptions::default().validate().is_ok());
        assert!(RawFileOptions::range(0, 0).validate().is_ok());
        assert!(RawFileOptions::range(10, 5).validate().is_ok());
        assert!(RawFileOptions::range(10, 0).validate().is_err());

        let options = RawFileOptions {
            offset: 10,
            length: None,
            decompress: false,
        };
        assert!(matches!(options.validate(), Err(PortalError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_fetch_raw_file() {
        let transport = MockTransport::new();
        transport.reply(
            Method::Get,
            "uploads/u1/raw/sub/a.json",
            MockReply::Bytes(b"{\"a\":".to_vec()),
        );

        let bytes = fetch_raw_file(&transport, "u1", "sub/a.json", RawFileOptions::range(0, 5).decompressed())
            .await
            .unwrap();
        assert_eq!(bytes, b"{\"a\":");

        let request = &transport.requests()[0];
        assert_eq!(request.query_value("offset"), None);
        assert_eq!(request.query_value("length"), Some("5"));
        assert_eq!(request.query_value("decompress"), Some("true"));

        let err = fetch_raw_file(&transport, "u1", "sub/a.json", RawFileOptions::range(3, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::InvalidArgument(_)));
        assert_eq!(transport.requests().len(), 1);
    }
}
