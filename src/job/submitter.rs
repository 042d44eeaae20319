// Job submitter
//
// Start → CredentialsConfigured → TagResolved → JobDefined → Submitted.
// Stages only move forward; a failure ends the submission.

use anyhow::Result;
use chrono::Utc;
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use tracing::info;

use super::{compose_image_uri, JobService, JobSpec, SubmitError, SubmittedJob, VertexAiClient};
use crate::config::Settings;
use crate::gcp::{self, token_source, Credentials};
use crate::storage::{build_client, ObjectStoreClient};
use crate::training::log_section;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubmitStage {
    Start,
    CredentialsConfigured,
    TagResolved,
    JobDefined,
    Submitted,
}

impl SubmitStage {
    pub fn next(self) -> Option<Self> {
        match self {
            SubmitStage::Start => Some(SubmitStage::CredentialsConfigured),
            SubmitStage::CredentialsConfigured => Some(SubmitStage::TagResolved),
            SubmitStage::TagResolved => Some(SubmitStage::JobDefined),
            SubmitStage::JobDefined => Some(SubmitStage::Submitted),
            SubmitStage::Submitted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == SubmitStage::Submitted
    }
}

impl fmt::Display for SubmitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubmitStage::Start => "start",
            SubmitStage::CredentialsConfigured => "credentials-configured",
            SubmitStage::TagResolved => "tag-resolved",
            SubmitStage::JobDefined => "job-defined",
            SubmitStage::Submitted => "submitted",
        };
        f.write_str(name)
    }
}

pub struct JobSubmitter {
    settings: Settings,
    credentials: Option<Credentials>,
    store: ObjectStoreClient,
    stage: SubmitStage,
}

impl JobSubmitter {
    /// Configure credentials from the settings and connect to the object store
    pub fn configure(settings: Settings) -> Result<Self> {
        log_section("Configure credentials");
        let credentials = gcp::configure(&settings.cloud.credentials_path);
        let store = build_client(&settings.cloud, credentials.as_ref())?;
        Ok(Self::with_store(settings, credentials, store))
    }

    /// Start from an already connected store; `credentials` is handed to the job service
    pub fn with_store(
        settings: Settings,
        credentials: Option<Credentials>,
        store: ObjectStoreClient,
    ) -> Self {
        let mut submitter = Self {
            settings,
            credentials,
            store,
            stage: SubmitStage::Start,
        };
        submitter.advance();
        submitter
    }

    pub fn stage(&self) -> SubmitStage {
        self.stage
    }

    fn advance(&mut self) {
        if let Some(next) = self.stage.next() {
            info!(from = %self.stage, to = %next, "Submit stage");
            self.stage = next;
        }
    }

    /// Fetch the tag object and build the full image reference
    ///
    /// The downloaded copy is removed as soon as it has been read.
    pub async fn resolve_image(&self) -> Result<String, SubmitError> {
        let cloud = &self.settings.cloud;
        let config = |e: anyhow::Error| SubmitError::Config(format!("{:#}", e));
        let bucket = cloud.bucket().map_err(config)?;
        let tag_path = cloud.container_tag_file().map_err(config)?;
        let registry = cloud.container_registry_path().map_err(config)?;

        let resolution = |reason: String| SubmitError::TagResolution {
            bucket: bucket.to_string(),
            path: tag_path.to_string(),
            reason,
        };

        let work_dir = tempfile::Builder::new()
            .prefix("tabtrain-tag-")
            .tempdir()
            .map_err(|e| resolution(e.to_string()))?;
        let local = work_dir.path().join(
            Path::new(tag_path)
                .file_name()
                .unwrap_or_else(|| OsStr::new("tag.txt")),
        );

        self.store
            .download(bucket, tag_path, &local)
            .await
            .map_err(|e| resolution(e.to_string()))?;
        let text = tokio::fs::read_to_string(&local)
            .await
            .map_err(|e| resolution(e.to_string()))?;
        tokio::fs::remove_file(&local)
            .await
            .map_err(|e| resolution(e.to_string()))?;

        let image = compose_image_uri(registry, &text)?;
        info!(image = %image, "Resolved latest container tag");
        Ok(image)
    }

    /// Resolve the tag, then connect to the job service, define and submit
    ///
    /// `connect` runs only once the tag is known.
    pub async fn run<F>(&mut self, connect: F) -> Result<SubmittedJob, SubmitError>
    where
        F: FnOnce(&Settings, Option<&Credentials>) -> Result<Box<dyn JobService>, SubmitError>,
    {
        log_section("Resolve container tag");
        let image = self.resolve_image().await?;
        self.advance();

        let service = connect(&self.settings, self.credentials.as_ref())?;
        let spec = JobSpec::define(&self.settings, &image, Utc::now())?;
        self.advance();

        log_section("Submit custom job");
        info!(
            display_name = %spec.display_name,
            image = %image,
            machine_type = spec.machine_type().unwrap_or_default(),
            service = service.name(),
            "Submitting custom job"
        );
        let job = service.create_custom_job(&spec).await?;
        self.advance();

        info!(job = %job.resource_name, "Job submitted");
        info!("Check status at {}", self.settings.job.console_url);
        Ok(job)
    }
}

/// Vertex AI client for the configured project and region
///
/// The project falls back to the one named in the credential file.
pub fn connect_vertex(
    settings: &Settings,
    credentials: Option<&Credentials>,
) -> Result<Box<dyn JobService>, SubmitError> {
    let config = |e: anyhow::Error| SubmitError::Config(format!("{:#}", e));
    let cloud = &settings.cloud;

    let project = match credentials.and_then(|c| c.project_id()) {
        Some(inferred) if cloud.project_id.is_none() => inferred.to_string(),
        _ => cloud.project_id().map_err(config)?.to_string(),
    };
    let region = cloud.region().map_err(config)?.to_string();

    let tokens = token_source(credentials, cloud.access_token.as_deref())?;
    info!(project = %project, region = %region, "Connecting to Vertex AI");
    Ok(Box::new(VertexAiClient::new(project, region, tokens)?))
}

/// Configure credentials, resolve the image and submit the job to Vertex AI
pub async fn run_submit(settings: Settings) -> Result<SubmittedJob> {
    let mut submitter = JobSubmitter::configure(settings)?;
    Ok(submitter.run(connect_vertex).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_only_move_forward() {
        let mut stage = SubmitStage::Start;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            stage = next;
            seen.push(stage);
        }
        assert_eq!(seen.len(), 5);
        assert!(stage.is_terminal());
        assert_eq!(stage.to_string(), "submitted");
    }
}
