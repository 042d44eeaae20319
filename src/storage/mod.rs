// Object store access
//
// `ObjectStore` is the seam every backend implements with one typed error;
// `ObjectStoreClient` layers the caller-facing contract on top: transfers
// log and propagate, queries log and fall back to a safe default.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::gcp::AuthError;

pub mod client;
pub mod factory;
pub mod fs;
pub mod gcs;

pub use client::ObjectStoreClient;
pub use factory::{build_client, build_store};
pub use fs::FsStore;
pub use gcs::GcsStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: gs://{bucket}/{path}")]
    NotFound { bucket: String, path: String },

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("no project id available")]
    MissingProject,
}

impl StoreError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<AuthError> for StoreError {
    fn from(e: AuthError) -> Self {
        Self::Unauthorized(e.to_string())
    }
}

/// Blob store backend
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write the object to `local_path`, replacing any existing file
    async fn get_to_file(
        &self,
        bucket: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), StoreError>;

    /// Store `local_path` as the object, replacing any existing object
    async fn put_from_file(
        &self,
        bucket: &str,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<(), StoreError>;

    /// Object names under `prefix`, sorted by name
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Cheapest authenticated call the backend offers
    async fn check_access(&self) -> Result<(), StoreError>;

    /// Project the backend bills to
    fn project_id(&self) -> Result<String, StoreError>;

    /// Backend name for logs (e.g., "gcs", "fs")
    fn name(&self) -> &str;
}

/// `gs://bucket/path` form used in logs and outcomes
pub fn gs_uri(bucket: &str, path: &str) -> String {
    format!("gs://{}/{}", bucket, path.trim_start_matches('/'))
}

/// Join a remote directory and a file name; an empty directory means the bucket root
pub fn remote_join(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_join() {
        assert_eq!(remote_join("models", "titanic_model.pkl"), "models/titanic_model.pkl");
        assert_eq!(remote_join("models/", "model_info.txt"), "models/model_info.txt");
        assert_eq!(remote_join("", "model_info.txt"), "model_info.txt");
    }

    #[test]
    fn test_gs_uri() {
        assert_eq!(gs_uri("bkt", "/data/train.csv"), "gs://bkt/data/train.csv");
    }

    #[test]
    fn test_auth_error_maps_to_unauthorized() {
        let err: StoreError = AuthError::Command("no gcloud".to_string()).into();
        assert!(matches!(err, StoreError::Unauthorized(_)));
    }
}
