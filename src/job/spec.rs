// Custom job definition
//
// Mirrors the CustomJob resource body of the Vertex AI REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SubmitError;
use crate::config::Settings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub display_name: String,
    pub job_spec: CustomJobSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomJobSpec {
    pub worker_pool_specs: Vec<WorkerPoolSpec>,
    pub base_output_directory: OutputDirectory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPoolSpec {
    pub machine_spec: MachineSpec,
    pub replica_count: u32,
    pub container_spec: ContainerSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    pub machine_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub image_uri: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDirectory {
    pub output_uri_prefix: String,
}

/// `<registry>:<tag>` from the raw tag file contents
pub fn compose_image_uri(registry: &str, tag_text: &str) -> Result<String, SubmitError> {
    let tag = tag_text.trim();
    if tag.is_empty() {
        return Err(SubmitError::EmptyTag);
    }
    Ok(format!("{}:{}", registry.trim(), tag))
}

/// Variables the remote container needs to run the training pipeline
pub fn forwarded_env(settings: &Settings) -> Result<Vec<EnvVar>, SubmitError> {
    let cloud = &settings.cloud;
    let config = |e: anyhow::Error| SubmitError::Config(format!("{:#}", e));

    Ok(vec![
        EnvVar::new(
            "GCP_CREDENTIALS_PATH",
            settings.job.remote_credentials_path.as_str(),
        ),
        EnvVar::new("GCS_BUCKET", cloud.bucket().map_err(config)?),
        EnvVar::new("GCS_DATA_PATH", cloud.data_path().map_err(config)?),
        EnvVar::new("GCS_MODEL_DIR", cloud.model_dir()),
        EnvVar::new("MODEL_FILENAME", settings.training.model_filename.as_str()),
    ])
}

impl JobSpec {
    /// Single worker pool job staged under `gs://<bucket>`
    pub fn define(
        settings: &Settings,
        image_uri: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SubmitError> {
        let job = &settings.job;
        let bucket = settings
            .cloud
            .bucket()
            .map_err(|e| SubmitError::Config(format!("{:#}", e)))?;
        if job.replica_count == 0 {
            return Err(SubmitError::Config("replica_count must be at least 1".to_string()));
        }

        let output_uri_prefix = format!(
            "gs://{}/aiplatform-custom-job-{}",
            bucket,
            created_at.format("%Y-%m-%d-%H:%M:%S%.3f")
        );

        Ok(Self {
            display_name: job.display_name.clone(),
            job_spec: CustomJobSpec {
                worker_pool_specs: vec![WorkerPoolSpec {
                    machine_spec: MachineSpec {
                        machine_type: job.machine_type.clone(),
                    },
                    replica_count: job.replica_count,
                    container_spec: ContainerSpec {
                        image_uri: image_uri.to_string(),
                        env: forwarded_env(settings)?,
                    },
                }],
                base_output_directory: OutputDirectory { output_uri_prefix },
            },
        })
    }

    pub fn image_uri(&self) -> Option<&str> {
        self.job_spec
            .worker_pool_specs
            .first()
            .map(|pool| pool.container_spec.image_uri.as_str())
    }

    pub fn machine_type(&self) -> Option<&str> {
        self.job_spec
            .worker_pool_specs
            .first()
            .map(|pool| pool.machine_spec.machine_type.as_str())
    }
}
