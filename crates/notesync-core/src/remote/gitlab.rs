//! GitLab repository adapter
//!
//! Stores each record as a file in a GitLab project through the v4
//! repository API, authenticated with a private token.

use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{collection_dir, commit_message, record_path, RemoteStore};
use crate::config::GitlabSettings;
use crate::error::RemoteError;
use crate::models::{CollectionType, Record};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TREE_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct FileCommit<'a> {
    branch: &'a str,
    content: String,
    encoding: &'a str,
    commit_message: String,
}

/// Remote store backed by a GitLab project
pub struct GitlabStore {
    client: Client,
    api_base: Url,
    /// Project id or path; replaced by the numeric id once authenticated
    project: RwLock<String>,
    token: String,
    branch: String,
    profile: String,
}

impl GitlabStore {
    /// Create an adapter for one profile
    pub fn new(settings: &GitlabSettings, profile: impl Into<String>) -> Result<Self> {
        let api_base = Url::parse(&format!("{}/api/v4/", settings.server_url))
            .with_context(|| format!("Invalid GitLab server URL: {}", settings.server_url))?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("notesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base,
            project: RwLock::new(settings.project_id.clone()),
            token: settings.api_key.clone(),
            branch: settings.branch.clone(),
            profile: profile.into(),
        })
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    fn project(&self) -> String {
        match self.project.read() {
            Ok(project) => project.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// `projects/<project>/<segments...>`, each segment percent-encoded
    fn project_url(&self, segments: &[&str]) -> Url {
        project_url(&self.api_base, &self.project(), segments)
    }

    fn file_url(&self, path: &str) -> Url {
        let mut url = self.project_url(&["repository", "files", path]);
        url.query_pairs_mut().append_pair("ref", &self.branch);
        url
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&FileCommit<'_>>,
    ) -> Result<Response, RemoteError> {
        let mut request = self
            .client
            .request(method, url)
            .header("PRIVATE-TOKEN", &self.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(transport_error)
    }
}

#[async_trait]
impl RemoteStore for GitlabStore {
    async fn authenticate(&self) -> Result<(), RemoteError> {
        let url = self.project_url(&[]);
        let response = self.send(Method::GET, url, None).await?;
        let info: ProjectInfo = parse_json(response, "project").await?;

        debug!("Authenticated against GitLab project {}", info.id);
        if let Ok(mut project) = self.project.write() {
            *project = info.id.to_string();
        }
        Ok(())
    }

    async fn list(&self, collection: CollectionType) -> Result<Vec<String>, RemoteError> {
        let dir = collection_dir(&self.profile, collection);
        let mut names = Vec::new();
        let mut page = 1u32;

        loop {
            let mut url = self.project_url(&["repository", "tree"]);
            url.query_pairs_mut()
                .append_pair("path", &dir)
                .append_pair("ref", &self.branch)
                .append_pair("per_page", &TREE_PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());

            let response = self.send(Method::GET, url, None).await?;

            // First sync of this collection: nothing stored yet
            if response.status() == StatusCode::NOT_FOUND {
                debug!("No remote directory {}, treating as empty", dir);
                return Ok(Vec::new());
            }

            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u32>().ok());

            let entries: Vec<TreeEntry> = parse_json(response, &dir).await?;
            names.extend(
                entries
                    .into_iter()
                    .filter(|e| e.kind == "blob")
                    .map(|e| e.name),
            );

            match next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(names)
    }

    async fn read(&self, collection: CollectionType, id: &str) -> Result<Record, RemoteError> {
        let path = record_path(&self.profile, collection, id);
        let response = self.send(Method::GET, self.file_url(&path), None).await?;
        let file: FileContent = parse_json(response, &path).await?;
        decode_record(&file)
    }

    async fn write(
        &self,
        collection: CollectionType,
        record: &Record,
        is_create: bool,
    ) -> Result<(), RemoteError> {
        let path = record_path(&self.profile, collection, &record.id);
        let content =
            serde_json::to_string(record).map_err(|e| RemoteError::Decode(e.to_string()))?;
        let body = FileCommit {
            branch: &self.branch,
            content,
            encoding: "text",
            commit_message: commit_message(collection),
        };

        let method = if is_create { Method::POST } else { Method::PUT };
        let url = self.project_url(&["repository", "files", path.as_str()]);
        let response = self.send(method, url, Some(&body)).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status.as_u16(), &path, body));
        }
        Ok(())
    }
}

fn project_url(api_base: &Url, project: &str, segments: &[&str]) -> Url {
    let mut url = api_base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().push("projects").push(project);
        for segment in segments {
            path.push(segment);
        }
    }
    url
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    // Only failures to reach the server count as lost connectivity
    if error.is_connect() || error.is_timeout() || error.is_request() {
        return RemoteError::Network {
            message: error.to_string(),
        };
    }
    if error.is_decode() || error.is_body() {
        return RemoteError::Decode(error.to_string());
    }
    warn!("GitLab request failed: {}", error);
    RemoteError::Request(error.to_string())
}

async fn parse_json<T: for<'de> Deserialize<'de>>(
    response: Response,
    path: &str,
) -> Result<T, RemoteError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RemoteError::from_status(status.as_u16(), path, body));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| RemoteError::Decode(format!("{}: {}", path, e)))
}

fn decode_record(file: &FileContent) -> Result<Record, RemoteError> {
    let text = match file.encoding.as_deref() {
        Some("base64") => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(file.content.trim())
                .map_err(|e| RemoteError::Decode(format!("invalid base64 content: {}", e)))?;
            String::from_utf8(bytes)
                .map_err(|e| RemoteError::Decode(format!("content is not UTF-8: {}", e)))?
        }
        _ => file.content.clone(),
    };

    serde_json::from_str(&text).map_err(|e| RemoteError::Decode(format!("invalid record: {}", e)))
}
