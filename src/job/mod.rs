// Remote training job submission
//
// `JobService` is the seam to the managed ML job service. The submitter
// resolves the container image, defines the job and hands it over.

use async_trait::async_trait;
use thiserror::Error;

use crate::gcp::AuthError;

pub mod spec;
pub mod submitter;
pub mod vertex;

pub use spec::{
    compose_image_uri, forwarded_env, ContainerSpec, CustomJobSpec, EnvVar, JobSpec, MachineSpec,
    OutputDirectory, WorkerPoolSpec,
};
pub use submitter::{connect_vertex, run_submit, JobSubmitter, SubmitStage};
pub use vertex::VertexAiClient;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("failed to resolve container tag from gs://{bucket}/{path}: {reason}")]
    TagResolution {
        bucket: String,
        path: String,
        reason: String,
    },

    #[error("container tag file is empty")]
    EmptyTag,

    #[error("invalid job configuration: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("job service error: {0}")]
    Service(String),
}

/// Handle returned by the job service for an accepted job
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedJob {
    /// Fully qualified resource name (projects/.../customJobs/<id>)
    pub resource_name: String,
    pub display_name: String,
    pub state: Option<String>,
}

/// Managed service that runs custom training jobs
#[async_trait]
pub trait JobService: Send + Sync {
    /// Create the job; returns as soon as the service accepts it
    async fn create_custom_job(&self, spec: &JobSpec) -> Result<SubmittedJob, SubmitError>;

    fn name(&self) -> &str;
}
