//! MCP tool definitions for the Morphik gateway

use serde_json::json;

use super::protocol::ToolDefinition;

pub const INGEST_TEXT: &str = "ingest-text";
pub const INGEST_FILE_FROM_PATH: &str = "ingest-file-from-path";
pub const RETRIEVE_CHUNKS: &str = "retrieve-chunks";
pub const RETRIEVE_DOCS: &str = "retrieve-docs";
pub const LIST_DOCUMENTS: &str = "list-documents";
pub const GET_DOCUMENT: &str = "get-document";
pub const DELETE_DOCUMENT: &str = "delete-document";
pub const LIST_ALLOWED_DIRECTORIES: &str = "list-allowed-directories";
pub const LIST_DIRECTORY: &str = "list-directory";
pub const SEARCH_FILES: &str = "search-files";
pub const GET_FILE_INFO: &str = "get-file-info";

/// All tool definitions: (name, description, JSON input schema)
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    // Ingestion
    (
        INGEST_TEXT,
        "Ingest a text document into Morphik so it can be retrieved later",
        r#"{
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "Text content to ingest"},
                "filename": {"type": "string", "description": "Optional filename to associate with the text"},
                "metadata": {"type": "object", "description": "Additional metadata as key-value pairs"},
                "rules": {"type": "array", "items": {"type": "object"}, "description": "Metadata extraction / natural-language rules applied during ingestion"},
                "use_colpali": {"type": "boolean", "description": "Embed with ColPali for multimodal retrieval"},
                "folder_name": {"type": "string", "description": "Folder to place the document in"},
                "end_user_id": {"type": "string", "description": "Scope the document to an end user"}
            },
            "required": ["content"]
        }"#,
    ),
    (
        INGEST_FILE_FROM_PATH,
        "Upload a local file (inside an allowed directory) to Morphik",
        r#"{
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to ingest"},
                "metadata": {"type": "object", "description": "Additional metadata as key-value pairs"},
                "rules": {"type": "array", "items": {"type": "object"}},
                "use_colpali": {"type": "boolean", "default": true},
                "folder_name": {"type": "string"},
                "end_user_id": {"type": "string"}
            },
            "required": ["path"]
        }"#,
    ),
    // Retrieval
    (
        RETRIEVE_CHUNKS,
        "Retrieve the chunks most relevant to a query. Image chunks are returned as images.",
        r#"{
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "filters": {"type": "object", "description": "Metadata filters"},
                "k": {"type": "integer", "minimum": 1, "default": 4, "description": "Number of chunks to return"},
                "min_score": {"type": "number", "default": 0, "description": "Minimum relevance score"},
                "use_reranking": {"type": "boolean"},
                "use_colpali": {"type": "boolean", "default": true},
                "padding": {"type": "integer", "minimum": 0, "description": "Neighbouring chunks to include around each hit"},
                "graph_name": {"type": "string"},
                "hop_depth": {"type": "integer", "minimum": 1},
                "include_paths": {"type": "boolean"},
                "folder_name": {"oneOf": [{"type": "string"}, {"type": "array", "items": {"type": "string"}}]},
                "end_user_id": {"type": "string"}
            },
            "required": ["query"]
        }"#,
    ),
    (
        RETRIEVE_DOCS,
        "Retrieve the documents most relevant to a query",
        r#"{
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "filters": {"type": "object", "description": "Metadata filters"},
                "k": {"type": "integer", "minimum": 1, "default": 4},
                "min_score": {"type": "number", "default": 0},
                "use_reranking": {"type": "boolean"},
                "use_colpali": {"type": "boolean", "default": true},
                "folder_name": {"oneOf": [{"type": "string"}, {"type": "array", "items": {"type": "string"}}]},
                "end_user_id": {"type": "string"}
            },
            "required": ["query"]
        }"#,
    ),
    // Documents
    (
        LIST_DOCUMENTS,
        "List documents with optional metadata filters and pagination",
        r#"{
            "type": "object",
            "properties": {
                "document_filters": {"type": "object", "description": "Metadata filters"},
                "skip": {"type": "integer", "minimum": 0, "default": 0},
                "limit": {"type": "integer", "minimum": 1, "default": 100}
            }
        }"#,
    ),
    (
        GET_DOCUMENT,
        "Get a document's metadata by its ID",
        r#"{
            "type": "object",
            "properties": {
                "document_id": {"type": "string", "description": "External document ID"}
            },
            "required": ["document_id"]
        }"#,
    ),
    (
        DELETE_DOCUMENT,
        "Delete a document and its chunks",
        r#"{
            "type": "object",
            "properties": {
                "document_id": {"type": "string", "description": "External document ID"}
            },
            "required": ["document_id"]
        }"#,
    ),
    // Local files
    (
        LIST_ALLOWED_DIRECTORIES,
        "List the directories the file tools may access",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
    (
        LIST_DIRECTORY,
        "List files and directories inside a directory",
        r#"{
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory to list"}
            },
            "required": ["path"]
        }"#,
    ),
    (
        SEARCH_FILES,
        "Recursively search for files and directories whose name contains a pattern (case-insensitive)",
        r#"{
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory to search from"},
                "pattern": {"type": "string", "description": "Substring to look for in names"},
                "exclude_patterns": {"type": "array", "items": {"type": "string"}, "default": [], "description": "Glob patterns to skip, e.g. node_modules or **/*.log"}
            },
            "required": ["path", "pattern"]
        }"#,
    ),
    (
        GET_FILE_INFO,
        "Get size, timestamps and permissions of a file or directory",
        r#"{
            "type": "object",
            "properties": {
                "path": {"type": "string"}
            },
            "required": ["path"]
        }"#,
    ),
];

/// Get all tool definitions as ToolDefinition structs
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).unwrap_or(json!({})),
        })
        .collect()
}

/// Names listed under `required` in a tool's input schema
pub fn required_arguments(tool: &str) -> Vec<String> {
    TOOL_DEFINITIONS
        .iter()
        .find(|(name, _, _)| *name == tool)
        .and_then(|(_, _, schema)| serde_json::from_str::<serde_json::Value>(schema).ok())
        .and_then(|schema| {
            schema.get("required").and_then(|r| r.as_array()).map(|r| {
                r.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
        })
        .unwrap_or_default()
}
