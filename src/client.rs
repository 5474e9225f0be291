//! HTTP client for the Morphik REST API

use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::types::{
    ChunkResult, Document, DocumentResult, IngestFileRequest, IngestTextRequest,
    ListDocumentsRequest, RetrieveRequest,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Morphik API client
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone)]
pub struct MorphikClient {
    http: reqwest::Client,
    base: Url,
}

impl MorphikClient {
    /// Create a client for the configured API base
    pub fn new(config: &Config) -> Result<Self> {
        let base = Url::parse(&config.api_base)
            .map_err(|e| GatewayError::Config(format!("invalid API base: {}", e)))?;

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| GatewayError::Config("auth token is not a valid header".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self { http, base })
    }

    /// Ingest a text document
    pub async fn ingest_text(&self, request: &IngestTextRequest) -> Result<Document> {
        self.post_json(&["ingest", "text"], request).await
    }

    /// Upload a file from disk
    pub async fn ingest_file(&self, path: &Path, request: &IngestFileRequest) -> Result<Document> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        let mut form = Form::new().part("file", Part::bytes(bytes).file_name(filename));
        if let Some(metadata) = &request.metadata {
            form = form.text("metadata", serde_json::to_string(metadata)?);
        }
        if let Some(rules) = &request.rules {
            form = form.text("rules", serde_json::to_string(rules)?);
        }
        if let Some(use_colpali) = request.use_colpali {
            form = form.text("use_colpali", use_colpali.to_string());
        }
        if let Some(folder) = &request.folder_name {
            form = form.text("folder_name", folder.clone());
        }
        if let Some(user) = &request.end_user_id {
            form = form.text("end_user_id", user.clone());
        }

        let response = self
            .http
            .post(self.endpoint(&["ingest", "file"])?)
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }

    /// Retrieve scored chunks
    pub async fn retrieve_chunks(&self, request: &RetrieveRequest) -> Result<Vec<ChunkResult>> {
        self.post_json(&["retrieve", "chunks"], request).await
    }

    /// Retrieve scored documents
    pub async fn retrieve_docs(&self, request: &RetrieveRequest) -> Result<Vec<DocumentResult>> {
        self.post_json(&["retrieve", "docs"], request).await
    }

    /// List documents with optional metadata filters
    pub async fn list_documents(&self, request: &ListDocumentsRequest) -> Result<Vec<Document>> {
        let mut url = self.endpoint(&["documents"])?;
        if request.skip.is_some() || request.limit.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(skip) = request.skip {
                query.append_pair("skip", &skip.to_string());
            }
            if let Some(limit) = request.limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        let filters = request.document_filters.clone().unwrap_or_default();

        let response = self.http.post(url).json(&filters).send().await?;
        decode(response).await
    }

    /// Fetch one document by its external id
    pub async fn get_document(&self, document_id: &str) -> Result<Document> {
        let response = self
            .http
            .get(self.endpoint(&["documents", document_id])?)
            .send()
            .await?;
        decode(response).await
    }

    /// Delete one document; returns Morphik's acknowledgement body
    pub async fn delete_document(&self, document_id: &str) -> Result<Value> {
        let response = self
            .http
            .delete(self.endpoint(&["documents", document_id])?)
            .send()
            .await?;
        decode(response).await
    }

    async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.endpoint(segments)?)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    /// Append percent-encoded path segments to the API base
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Config("API base cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Api {
        status: status.as_u16(),
        message: error_detail(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        }),
    })
}

/// Pull a human-readable message out of a Morphik error body
fn error_detail(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(body.trim().to_string()),
        },
        _ => Some(body.trim().to_string()),
    }
}
