//! The Morphik MCP server: protocol dispatch and tool implementations

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::protocol::{
    codes, methods, CallToolParams, InitializeResult, McpHandler, McpRequest, McpResponse,
    ToolCallResult, ToolContent,
};
use super::session::ServerFactory;
use super::tools::{self, get_tool_definitions, required_arguments};
use crate::client::MorphikClient;
use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::files::FileSandbox;
use crate::types::{IngestFileRequest, IngestTextRequest, ListDocumentsRequest, RetrieveRequest};

pub const SERVER_NAME: &str = "morphik";

#[derive(Debug, Deserialize)]
struct DocumentIdArgs {
    document_id: String,
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct SearchFilesArgs {
    path: String,
    pattern: String,
    #[serde(default)]
    exclude_patterns: Vec<String>,
}

/// Protocol server for one session
pub struct MorphikServer {
    config: Arc<Config>,
    client: MorphikClient,
    sandbox: FileSandbox,
}

impl MorphikServer {
    pub fn new(config: Arc<Config>, client: MorphikClient) -> Self {
        let sandbox = FileSandbox::new(config.allowed_directories.clone());
        Self {
            config,
            client,
            sandbox,
        }
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<ToolCallResult> {
        match name {
            tools::INGEST_TEXT => self.tool_ingest_text(args).await,
            tools::INGEST_FILE_FROM_PATH => self.tool_ingest_file(args).await,
            tools::RETRIEVE_CHUNKS => self.tool_retrieve_chunks(args).await,
            tools::RETRIEVE_DOCS => self.tool_retrieve_docs(args).await,
            tools::LIST_DOCUMENTS => self.tool_list_documents(args).await,
            tools::GET_DOCUMENT => self.tool_get_document(args).await,
            tools::DELETE_DOCUMENT => self.tool_delete_document(args).await,
            tools::LIST_ALLOWED_DIRECTORIES => Ok(self.tool_list_allowed_directories()),
            tools::LIST_DIRECTORY => self.tool_list_directory(args).await,
            tools::SEARCH_FILES => self.tool_search_files(args).await,
            tools::GET_FILE_INFO => self.tool_get_file_info(args).await,
            other => Err(GatewayError::InvalidParams(format!("Unknown tool: {}", other))),
        }
    }

    async fn tool_ingest_text(&self, args: Value) -> Result<ToolCallResult> {
        let request: IngestTextRequest = parse_args(tools::INGEST_TEXT, args)?;
        non_empty("content", &request.content)?;
        let document = self.client.ingest_text(&request).await?;
        Ok(ToolCallResult::json(&document))
    }

    async fn tool_ingest_file(&self, args: Value) -> Result<ToolCallResult> {
        let request: IngestFileRequest = parse_args(tools::INGEST_FILE_FROM_PATH, args)?;
        let sandbox = self.sandbox.clone();
        let requested = request.path.clone();
        let path = blocking(move || {
            let path = sandbox.resolve(&requested)?;
            if !path.is_file() {
                return Err(GatewayError::NotFound(format!("not a file: {}", requested)));
            }
            Ok(path)
        })
        .await?;
        let document = self.client.ingest_file(&path, &request).await?;
        Ok(ToolCallResult::json(&document))
    }

    async fn tool_retrieve_chunks(&self, args: Value) -> Result<ToolCallResult> {
        let request: RetrieveRequest = parse_args(tools::RETRIEVE_CHUNKS, args)?;
        non_empty("query", &request.query)?;
        let chunks = self.client.retrieve_chunks(&request).await?;
        if chunks.is_empty() {
            return Ok(ToolCallResult::text("No relevant chunks found."));
        }

        let mut content = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            match chunk.inline_image() {
                Some((mime_type, data)) => {
                    content.push(ToolContent::Text {
                        text: serde_json::to_string_pretty(&json!({
                            "document_id": chunk.document_id,
                            "chunk_number": chunk.chunk_number,
                            "score": chunk.score,
                            "filename": chunk.filename,
                            "metadata": chunk.metadata,
                        }))?,
                    });
                    content.push(ToolContent::Image { data, mime_type });
                }
                None => content.push(ToolContent::Text {
                    text: serde_json::to_string_pretty(chunk)?,
                }),
            }
        }
        Ok(ToolCallResult {
            content,
            is_error: None,
        })
    }

    async fn tool_retrieve_docs(&self, args: Value) -> Result<ToolCallResult> {
        let request: RetrieveRequest = parse_args(tools::RETRIEVE_DOCS, args)?;
        non_empty("query", &request.query)?;
        let docs = self.client.retrieve_docs(&request).await?;
        if docs.is_empty() {
            return Ok(ToolCallResult::text("No relevant documents found."));
        }
        Ok(ToolCallResult::json(&docs))
    }

    async fn tool_list_documents(&self, args: Value) -> Result<ToolCallResult> {
        let request: ListDocumentsRequest = parse_args(tools::LIST_DOCUMENTS, args)?;
        let docs = self.client.list_documents(&request).await?;
        Ok(ToolCallResult::json(&docs))
    }

    async fn tool_get_document(&self, args: Value) -> Result<ToolCallResult> {
        let DocumentIdArgs { document_id } = parse_args(tools::GET_DOCUMENT, args)?;
        non_empty("document_id", &document_id)?;
        let document = self.client.get_document(&document_id).await?;
        Ok(ToolCallResult::json(&document))
    }

    async fn tool_delete_document(&self, args: Value) -> Result<ToolCallResult> {
        let DocumentIdArgs { document_id } = parse_args(tools::DELETE_DOCUMENT, args)?;
        non_empty("document_id", &document_id)?;
        let ack = self.client.delete_document(&document_id).await?;
        Ok(ToolCallResult::json(&ack))
    }

    fn tool_list_allowed_directories(&self) -> ToolCallResult {
        let dirs: Vec<String> = self
            .config
            .allowed_directories
            .iter()
            .map(|d| d.to_string_lossy().to_string())
            .collect();
        ToolCallResult::json(&json!({ "directories": dirs }))
    }

    async fn tool_list_directory(&self, args: Value) -> Result<ToolCallResult> {
        let PathArgs { path } = parse_args(tools::LIST_DIRECTORY, args)?;
        let sandbox = self.sandbox.clone();
        let listing = blocking(move || sandbox.list_directory(&path)).await?;
        Ok(ToolCallResult::json(&listing))
    }

    async fn tool_search_files(&self, args: Value) -> Result<ToolCallResult> {
        let SearchFilesArgs {
            path,
            pattern,
            exclude_patterns,
        } = parse_args(tools::SEARCH_FILES, args)?;
        non_empty("pattern", &pattern)?;
        let sandbox = self.sandbox.clone();
        let found =
            blocking(move || sandbox.search_files(&path, &pattern, &exclude_patterns)).await?;
        Ok(ToolCallResult::json(&found))
    }

    async fn tool_get_file_info(&self, args: Value) -> Result<ToolCallResult> {
        let PathArgs { path } = parse_args(tools::GET_FILE_INFO, args)?;
        let sandbox = self.sandbox.clone();
        let info = blocking(move || sandbox.file_info(&path)).await?;
        Ok(ToolCallResult::json(&info))
    }
}

#[async_trait]
impl McpHandler for MorphikServer {
    async fn handle_request(&self, request: McpRequest) -> McpResponse {
        match request.method.as_str() {
            methods::INITIALIZE => McpResponse::success(
                request.id,
                json!(InitializeResult::new(SERVER_NAME, env!("CARGO_PKG_VERSION"))),
            ),
            methods::PING => McpResponse::success(request.id, json!({})),
            m if m.starts_with("notifications/") => McpResponse::success(request.id, Value::Null),
            methods::LIST_TOOLS => McpResponse::success(
                request.id,
                json!({ "tools": get_tool_definitions() }),
            ),
            methods::CALL_TOOL => {
                let params: CallToolParams = match serde_json::from_value(request.params) {
                    Ok(p) => p,
                    Err(e) => {
                        return McpResponse::error(
                            request.id,
                            codes::INVALID_PARAMS,
                            format!("Invalid params: {}", e),
                        )
                    }
                };
                let args = params.arguments.unwrap_or_else(|| json!({}));
                tracing::debug!(tool = %params.name, "tool call");

                match self.call_tool(&params.name, args).await {
                    Ok(result) => McpResponse::success(request.id, json!(result)),
                    Err(e @ GatewayError::InvalidParams(_)) => McpResponse::from_error(request.id, e),
                    Err(e) => {
                        if e.is_remote() {
                            tracing::warn!(tool = %params.name, "Morphik API call failed: {}", e);
                        } else {
                            tracing::warn!(tool = %params.name, "tool failed: {}", e);
                        }
                        McpResponse::success(request.id, json!(ToolCallResult::error(e.to_string())))
                    }
                }
            }
            _ => McpResponse::error(
                request.id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        }
    }

    fn close(&self) {
        tracing::trace!("morphik server closed");
    }
}

/// Builds one `MorphikServer` per session from shared immutable state
#[derive(Clone)]
pub struct MorphikServerFactory {
    config: Arc<Config>,
    client: MorphikClient,
}

impl MorphikServerFactory {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = MorphikClient::new(&config)?;
        Ok(Self { config, client })
    }
}

impl ServerFactory for MorphikServerFactory {
    fn create_server(&self) -> Box<dyn McpHandler> {
        Box::new(MorphikServer::new(self.config.clone(), self.client.clone()))
    }
}

/// Deserialize tool arguments, naming the first missing required field
fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    let args = match args {
        Value::Null => Value::Object(Map::new()),
        Value::Object(map) => Value::Object(map),
        _ => {
            return Err(GatewayError::InvalidParams(
                "arguments must be an object".to_string(),
            ))
        }
    };
    for field in required_arguments(tool) {
        if args.get(&field).map_or(true, Value::is_null) {
            return Err(GatewayError::InvalidParams(format!(
                "missing required argument: {}",
                field
            )));
        }
    }
    serde_json::from_value(args)
        .map_err(|e| GatewayError::InvalidParams(format!("invalid arguments for {}: {}", tool, e)))
}

fn non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GatewayError::InvalidParams(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(())
}

/// Run blocking filesystem work off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GatewayError::Internal(format!("file task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn server(config: Config) -> MorphikServer {
        let config = Arc::new(config);
        let client = MorphikClient::new(&config).unwrap();
        MorphikServer::new(config, client)
    }

    fn request(method: &str, params: Value) -> McpRequest {
        McpRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(1)),
            method: method.into(),
            params,
        }
    }

    #[tokio::test]
    async fn test_initialize() {
        let s = server(Config::default());
        let resp = s.handle_request(request("initialize", json!({}))).await;
        let result = resp.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(result["protocolVersion"], "2024-11-05");
    }

    #[tokio::test]
    async fn test_tools_list_contains_every_tool() {
        let s = server(Config::default());
        let resp = s.handle_request(request("tools/list", Value::Null)).await;
        assert!(resp.error.is_none());
        let names: Vec<String> = resp.result.unwrap()["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        let expected: Vec<String> = tools::TOOL_DEFINITIONS
            .iter()
            .map(|(n, _, _)| n.to_string())
            .collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_missing_required_argument_is_invalid_params() {
        let s = server(Config::default());
        let resp = s
            .handle_request(request(
                "tools/call",
                json!({"name": "retrieve-chunks", "arguments": {"k": 2}}),
            ))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, codes::INVALID_PARAMS);
        assert!(err.message.contains("query"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_wrong_argument_type_is_invalid_params() {
        let s = server(Config::default());
        let resp = s
            .handle_request(request(
                "tools/call",
                json!({"name": "ingest-text", "arguments": {"content": 42}}),
            ))
            .await;
        assert_eq!(resp.error.unwrap().code, codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let s = server(Config::default());
        let resp = s
            .handle_request(request("tools/call", json!({"name": "nope"})))
            .await;
        assert_eq!(resp.error.unwrap().code, codes::INVALID_PARAMS);

        let resp = s.handle_request(request("resources/list", json!({}))).await;
        assert_eq!(resp.error.unwrap().code, codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_file_tool_without_sandbox_is_tool_error() {
        let s = server(Config::default());
        let resp = s
            .handle_request(request(
                "tools/call",
                json!({"name": "list-directory", "arguments": {"path": "/tmp"}}),
            ))
            .await;
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Access denied"));
    }

    #[tokio::test]
    async fn test_list_allowed_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let s = server(Config {
            allowed_directories: vec![root.clone()],
            ..Config::default()
        });
        let resp = s
            .handle_request(request(
                "tools/call",
                json!({"name": "list-allowed-directories"}),
            ))
            .await;
        let text = resp.result.unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["directories"][0], root.to_string_lossy().as_ref());
    }

    #[tokio::test]
    async fn test_ingest_file_rejects_directories_as_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir(root.join("folder")).unwrap();
        let s = server(Config {
            allowed_directories: vec![root.clone()],
            ..Config::default()
        });

        for path in [root.join("folder"), root.join("absent.pdf")] {
            let resp = s
                .handle_request(request(
                    "tools/call",
                    json!({"name": "ingest-file-from-path", "arguments": {"path": path}}),
                ))
                .await;
            assert!(resp.error.is_none(), "{:?}", resp.error);
            let result = resp.result.unwrap();
            assert_eq!(result["isError"], true);
            assert!(result["content"][0]["text"]
                .as_str()
                .unwrap()
                .contains("not a file"));
        }
    }

    #[test]
    fn test_parse_args_rejects_non_object() {
        let err = parse_args::<PathArgs>(tools::LIST_DIRECTORY, json!([1, 2])).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidParams(_)));
    }
}
