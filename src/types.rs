//! Request and response shapes of the Morphik API and the file tools
//!
//! These are passthrough types: the gateway deserializes what Morphik
//! returns and relays it to the MCP client without mutating it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Free-form JSON object
pub type Metadata = HashMap<String, Value>;

/// A document stored in Morphik
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub owner: HashMap<String, String>,
    #[serde(default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_info: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_files: Option<Vec<StorageFileInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control: Option<HashMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Where one version of a document's bytes lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFileInfo {
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Body of `POST /ingest/text`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestTextRequest {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Metadata>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_colpali: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_user_id: Option<String>,
}

/// Form fields of `POST /ingest/file`; the file bytes travel separately
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFileRequest {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Metadata>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_colpali: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_user_id: Option<String>,
}

/// A scored chunk from `POST /retrieve/chunks`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    pub content: String,
    pub score: f64,
    pub document_id: String,
    pub chunk_number: u32,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl ChunkResult {
    /// Split an inline `data:<mime>;base64,<payload>` image into its parts
    pub fn inline_image(&self) -> Option<(String, String)> {
        if !self.content_type.starts_with("image/") {
            return None;
        }
        let rest = self.content.strip_prefix("data:")?;
        let (header, data) = rest.split_once(',')?;
        let mime = header.strip_suffix(";base64")?;
        let mime = if mime.is_empty() {
            self.content_type.clone()
        } else {
            mime.to_string()
        };
        Some((mime, data.to_string()))
    }
}

/// A scored document from `POST /retrieve/docs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    pub score: f64,
    pub document_id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub content: DocumentContent,
    #[serde(default)]
    pub additional_metadata: Metadata,
}

/// Inline text or a download URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Url,
    String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentContent {
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// A folder scope: one folder name or several
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FolderScope {
    One(String),
    Many(Vec<String>),
}

/// Body of `POST /retrieve/chunks` and `POST /retrieve/docs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_reranking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_colpali: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hop_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_paths: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<FolderScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_user_id: Option<String>,
}

/// Arguments of `POST /documents`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListDocumentsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_filters: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Entry kind in a directory listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListDirectoryResult {
    pub entries: Vec<DirectoryEntry>,
}

/// Metadata for one file or directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub is_directory: bool,
    pub is_file: bool,
    /// Octal permission bits, e.g. "644"
    pub permissions: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilesResult {
    pub matches: Vec<String>,
    /// Set when the search stopped at the result cap
    #[serde(default)]
    pub truncated: bool,
}
