// Access token sources for Google APIs
//
// Selection order: configured static token, then the credential file's
// type, then the metadata server available inside Vertex AI containers.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;

use super::credentials::{CredentialKind, Credentials};

const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Tokens are reused for this long, well inside Google's one hour lifetime
const TOKEN_REUSE_SECS: u64 = 45 * 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Request(String),

    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("gcloud failed: {0}")]
    Command(String),

    #[error("credential file is missing '{0}'")]
    MissingField(&'static str),
}

/// Anything that can hand out a bearer token
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;

    /// Short label for logs
    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// A token supplied up front (GCP_ACCESS_TOKEN)
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Refresh-token exchange for `authorized_user` files (gcloud ADC)
pub struct AuthorizedUser {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl AuthorizedUser {
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, AuthError> {
        let file = credentials.file();
        Ok(Self {
            client: http_client()?,
            token_url: OAUTH_TOKEN_URL.to_string(),
            client_id: file.client_id.clone().ok_or(AuthError::MissingField("client_id"))?,
            client_secret: file
                .client_secret
                .clone()
                .ok_or(AuthError::MissingField("client_secret"))?,
            refresh_token: file
                .refresh_token
                .clone()
                .ok_or(AuthError::MissingField("refresh_token"))?,
        })
    }

    /// Override the token endpoint (tests)
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

#[async_trait]
impl TokenSource for AuthorizedUser {
    async fn access_token(&self) -> Result<String, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        parse_token_response(response).await
    }

    fn name(&self) -> &str {
        "authorized_user"
    }
}

/// Service account keys are exchanged by the gcloud CLI
///
/// The credential override is set on the child process only.
pub struct GcloudCli {
    program: String,
    credentials_path: PathBuf,
}

impl GcloudCli {
    pub fn new(credentials_path: PathBuf) -> Self {
        Self {
            program: "gcloud".to_string(),
            credentials_path,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl TokenSource for GcloudCli {
    async fn access_token(&self) -> Result<String, AuthError> {
        let output = Command::new(&self.program)
            .args(["auth", "print-access-token", "--quiet"])
            .env("CLOUDSDK_AUTH_CREDENTIAL_FILE_OVERRIDE", &self.credentials_path)
            .output()
            .await
            .map_err(|e| AuthError::Command(format!("could not run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(AuthError::Command(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(AuthError::Command("empty token".to_string()));
        }
        Ok(token)
    }

    fn name(&self) -> &str {
        "gcloud"
    }
}

/// Compute metadata server token for the attached service account
pub struct MetadataServer {
    client: Client,
    url: String,
}

impl MetadataServer {
    pub fn new() -> Result<Self, AuthError> {
        Ok(Self {
            client: http_client()?,
            url: METADATA_TOKEN_URL.to_string(),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl TokenSource for MetadataServer {
    async fn access_token(&self) -> Result<String, AuthError> {
        let response = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        parse_token_response(response).await
    }

    fn name(&self) -> &str {
        "metadata"
    }
}

/// Reuses a token from the inner source until it is close to expiry
pub struct CachedToken {
    inner: Box<dyn TokenSource>,
    cached: Mutex<Option<(String, Instant)>>,
    reuse_for: Duration,
}

impl CachedToken {
    pub fn new(inner: Box<dyn TokenSource>) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
            reuse_for: Duration::from_secs(TOKEN_REUSE_SECS),
        }
    }
}

#[async_trait]
impl TokenSource for CachedToken {
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some((token, fetched_at)) = cached.as_ref() {
            if fetched_at.elapsed() < self.reuse_for {
                return Ok(token.clone());
            }
        }

        let token = self.inner.access_token().await?;
        tracing::debug!(source = self.inner.name(), "Fetched new access token");
        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Pick a token source for the given credentials
pub fn token_source(
    credentials: Option<&Credentials>,
    static_token: Option<&str>,
) -> Result<Arc<dyn TokenSource>, AuthError> {
    let inner: Box<dyn TokenSource> = match (static_token, credentials) {
        (Some(token), _) => return Ok(Arc::new(StaticToken::new(token))),
        (None, Some(creds)) => match creds.kind() {
            CredentialKind::AuthorizedUser => Box::new(AuthorizedUser::from_credentials(creds)?),
            CredentialKind::ServiceAccount | CredentialKind::Unknown => {
                Box::new(GcloudCli::new(creds.path().to_path_buf()))
            }
        },
        (None, None) => Box::new(MetadataServer::new()?),
    };

    tracing::debug!(source = inner.name(), "Selected token source");
    Ok(Arc::new(CachedToken::new(inner)))
}

fn http_client() -> Result<Client, AuthError> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| AuthError::Request(format!("failed to create HTTP client: {}", e)))
}

async fn parse_token_response(response: reqwest::Response) -> Result<String, AuthError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| AuthError::Request(format!("malformed token response: {}", e)))?;
    Ok(token.access_token)
}
