//! REST client for sessions and workspace files.
//!
//! Failures come back to the caller only; nothing here touches the live connection.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::Endpoints;
use crate::session::{Session, SessionDetail};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{status}: {detail}")]
    Status {
        status: reqwest::StatusCode,
        detail: String,
    },
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status, .. } if *status == reqwest::StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub is_directory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileListing {
    #[serde(default)]
    pub files: Vec<FileInfo>,
    #[serde(default)]
    pub directory: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub size: u64,
}

/// One saved task output of a session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputSummary {
    pub filename: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct SessionList {
    sessions: Vec<Session>,
}

#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Clone)]
pub struct ApiClient {
    endpoints: Endpoints,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            client: reqwest::Client::new(),
        }
    }

    fn session_url(&self, session_id: &str, rest: &str) -> String {
        self.endpoints
            .api(&format!("/sessions/{}{}", urlencoding::encode(session_id), rest))
    }

    fn files_url(&self, session_id: &str, rest: &str) -> String {
        self.endpoints
            .api(&format!("/files/{}{}", urlencoding::encode(session_id), rest))
    }

    /// GET /api/sessions
    pub async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        let res = self.client.get(self.endpoints.api("/sessions")).send().await?;
        let list: SessionList = json(res).await?;
        Ok(list.sessions)
    }

    /// GET /api/sessions/{id}
    pub async fn get_session(&self, session_id: &str) -> Result<SessionDetail, ApiError> {
        let res = self.client.get(self.session_url(session_id, "")).send().await?;
        json(res).await
    }

    /// DELETE /api/sessions/{id}. Returns the server's confirmation text.
    pub async fn delete_session(&self, session_id: &str) -> Result<String, ApiError> {
        let res = self.client.delete(self.session_url(session_id, "")).send().await?;
        let ack: Ack = json(res).await?;
        Ok(ack.message)
    }

    /// POST /api/sessions/{id}/save
    pub async fn save_session(&self, session_id: &str) -> Result<String, ApiError> {
        let res = self.client.post(self.session_url(session_id, "/save")).send().await?;
        let ack: Ack = json(res).await?;
        Ok(ack.message)
    }

    /// GET /api/files/{id}/list, optionally scoped to a sub-directory.
    pub async fn list_files(&self, session_id: &str, sub_path: Option<&str>) -> Result<FileListing, ApiError> {
        let mut req = self.client.get(self.files_url(session_id, "/list"));
        if let Some(p) = sub_path.filter(|p| !p.is_empty()) {
            req = req.query(&[("path", p)]);
        }
        json(req.send().await?).await
    }

    /// GET /api/files/{id}/read: text content of one workspace file.
    pub async fn read_file(&self, session_id: &str, path: &str) -> Result<FileContent, ApiError> {
        let res = self
            .client
            .get(self.files_url(session_id, "/read"))
            .query(&[("path", path)])
            .send()
            .await?;
        json(res).await
    }

    /// GET /api/files/{id}/download: raw bytes of one workspace file.
    pub async fn download_file(&self, session_id: &str, path: &str) -> Result<Vec<u8>, ApiError> {
        let res = self
            .client
            .get(self.files_url(session_id, "/download"))
            .query(&[("path", path)])
            .send()
            .await?;
        let res = check(res).await?;
        Ok(res.bytes().await?.to_vec())
    }

    /// GET /api/files/{id}/outputs
    pub async fn list_outputs(&self, session_id: &str) -> Result<Vec<OutputSummary>, ApiError> {
        let res = self.client.get(self.files_url(session_id, "/outputs")).send().await?;
        json(res).await
    }

    /// GET /api/files/{id}/outputs/{filename}. Output documents have no fixed shape.
    pub async fn get_output(&self, session_id: &str, filename: &str) -> Result<serde_json::Value, ApiError> {
        let url = self.files_url(session_id, &format!("/outputs/{}", urlencoding::encode(filename)));
        let res = self.client.get(url).send().await?;
        json(res).await
    }
}

async fn check(res: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => status.canonical_reason().unwrap_or("error").to_string(),
        Err(_) => body,
    };
    log::debug!("api error {}: {}", status, detail);
    Err(ApiError::Status { status, detail })
}

async fn json<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, ApiError> {
    Ok(check(res).await?.json().await?)
}
