// Google Cloud Storage backend over the JSON API

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::{ObjectStore, StoreError};
use crate::gcp::TokenSource;

const GCS_API_URL: &str = "https://storage.googleapis.com";
const REQUEST_TIMEOUT_SECS: u64 = 300;

pub struct GcsStore {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
    project: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

impl GcsStore {
    pub fn new(tokens: Arc<dyn TokenSource>, project: Option<String>) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: GCS_API_URL.to_string(),
            tokens,
            project,
        })
    }

    /// Override the API endpoint (emulators, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| StoreError::InvalidPath(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidPath(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn bearer(&self) -> Result<String, StoreError> {
        Ok(format!("Bearer {}", self.tokens.access_token().await?))
    }
}

/// Map a non-success response to a typed error
async fn check_status(
    response: Response,
    bucket: &str,
    path: &str,
) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => StoreError::NotFound {
            bucket: bucket.to_string(),
            path: path.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::Unauthorized(format!("{}: {}", status, body))
        }
        _ => StoreError::Transport(format!("{}: {}", status, body)),
    })
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

/// `<name>.part` next to `path`
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Stream `chunks` into a sibling `.part` file, then rename it over `local_path`
///
/// On any failure the partial file is removed and `local_path` is left as it was.
async fn write_atomically<S, B>(local_path: &Path, chunks: S) -> Result<(), StoreError>
where
    S: Stream<Item = Result<B, StoreError>>,
    B: AsRef<[u8]>,
{
    let partial = partial_path(local_path);
    futures::pin_mut!(chunks);

    let result = async {
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| StoreError::io(&partial, e))?;
        while let Some(chunk) = chunks.next().await {
            file.write_all(chunk?.as_ref())
                .await
                .map_err(|e| StoreError::io(&partial, e))?;
        }
        file.flush().await.map_err(|e| StoreError::io(&partial, e))?;
        drop(file);

        tokio::fs::rename(&partial, local_path)
            .await
            .map_err(|e| StoreError::io(local_path, e))
    }
    .await;

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&partial).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %partial.display(), error = %e, "Failed to remove partial download");
            }
        }
    }
    result
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn get_to_file(
        &self,
        bucket: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), StoreError> {
        let url = self.url(&["storage", "v1", "b", bucket, "o", remote_path])?;
        let response = self
            .client
            .get(url)
            .query(&[("alt", "media")])
            .header("Authorization", self.bearer().await?)
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response, bucket, remote_path).await?;

        // Nothing is written until the object is known to exist
        let chunks = response.bytes_stream().map(|chunk| chunk.map_err(transport));
        write_atomically(local_path, chunks).await
    }

    async fn put_from_file(
        &self,
        bucket: &str,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<(), StoreError> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| StoreError::io(local_path, e))?;

        let url = self.url(&["upload", "storage", "v1", "b", bucket, "o"])?;
        let response = self
            .client
            .post(url)
            .query(&[("uploadType", "media"), ("name", remote_path)])
            .header("Authorization", self.bearer().await?)
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(transport)?;
        check_status(response, bucket, remote_path).await?;

        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let url = self.url(&["storage", "v1", "b", bucket, "o"])?;
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(url.clone())
                .query(&[("prefix", prefix), ("fields", "items(name),nextPageToken")])
                .header("Authorization", self.bearer().await?);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await.map_err(transport)?;
            let response = check_status(response, bucket, prefix).await?;
            let page: ObjectList = response.json().await.map_err(transport)?;

            names.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        names.sort();
        Ok(names)
    }

    async fn check_access(&self) -> Result<(), StoreError> {
        let project = self.project_id()?;
        let url = self.url(&["storage", "v1", "b"])?;
        let response = self
            .client
            .get(url)
            .query(&[("project", project.as_str()), ("maxResults", "1")])
            .header("Authorization", self.bearer().await?)
            .send()
            .await
            .map_err(transport)?;
        check_status(response, "", "").await?;
        Ok(())
    }

    fn project_id(&self) -> Result<String, StoreError> {
        self.project.clone().ok_or(StoreError::MissingProject)
    }

    fn name(&self) -> &str {
        "gcs"
    }
}
