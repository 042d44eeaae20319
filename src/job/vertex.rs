// Vertex AI custom job client over the REST API

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::{JobService, JobSpec, SubmitError, SubmittedJob};
use crate::gcp::TokenSource;

const REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct VertexAiClient {
    client: Client,
    base_url: String,
    project: String,
    region: String,
    tokens: Arc<dyn TokenSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomJobResponse {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl VertexAiClient {
    /// Client for the regional endpoint of `region`
    pub fn new(
        project: impl Into<String>,
        region: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, SubmitError> {
        let region = region.into();
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SubmitError::Service(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("https://{}-aiplatform.googleapis.com", region),
            project: project.into(),
            region,
            tokens,
        })
    }

    /// Override the API endpoint (tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn jobs_url(&self) -> Result<Url, SubmitError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SubmitError::Config(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| SubmitError::Config(self.base_url.clone()))?
            .pop_if_empty()
            .extend([
                "v1",
                "projects",
                self.project.as_str(),
                "locations",
                self.region.as_str(),
                "customJobs",
            ]);
        Ok(url)
    }
}

#[async_trait]
impl JobService for VertexAiClient {
    async fn create_custom_job(&self, spec: &JobSpec) -> Result<SubmittedJob, SubmitError> {
        let url = self.jobs_url()?;
        let token = self.tokens.access_token().await?;

        tracing::debug!(url = %url, display_name = %spec.display_name, "Creating custom job");

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(spec)
            .send()
            .await
            .map_err(|e| SubmitError::Service(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    SubmitError::Service(format!("permission denied ({}): {}", status, body))
                }
                _ => SubmitError::Service(format!("{}: {}", status, body)),
            });
        }

        let created: CustomJobResponse = response
            .json()
            .await
            .map_err(|e| SubmitError::Service(format!("unexpected response: {}", e)))?;

        Ok(SubmittedJob {
            resource_name: created.name,
            display_name: created
                .display_name
                .unwrap_or_else(|| spec.display_name.clone()),
            state: created.state,
        })
    }

    fn name(&self) -> &str {
        "vertex-ai"
    }
}
