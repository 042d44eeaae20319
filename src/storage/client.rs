// Object store client
//
// Transfers (download/upload) log and re-raise. Queries (list, auth check,
// project id) log and return an empty/false/None default instead.

use std::path::Path;
use tracing::{error, info, warn};

use super::{gs_uri, ObjectStore, StoreError};
use crate::errors::authentication_failed_error;

pub struct ObjectStoreClient {
    store: Box<dyn ObjectStore>,
}

impl ObjectStoreClient {
    pub fn new(store: Box<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &str {
        self.store.name()
    }

    /// Download an object to a local file
    ///
    /// Missing parent directories are created and an existing file is overwritten.
    pub async fn download(
        &self,
        bucket: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), StoreError> {
        info!(
            source = %gs_uri(bucket, remote_path),
            destination = %local_path.display(),
            "Downloading object"
        );

        let result = self.download_inner(bucket, remote_path, local_path).await;
        match &result {
            Ok(()) => info!(destination = %local_path.display(), "Download complete"),
            Err(e) => error!(source = %gs_uri(bucket, remote_path), error = %e, "Download failed"),
        }
        result
    }

    async fn download_inner(
        &self,
        bucket: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), StoreError> {
        if local_path.as_os_str().is_empty() {
            return Err(StoreError::InvalidPath(
                "destination file name is empty".to_string(),
            ));
        }

        if let Some(parent) = local_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::io(parent, e))?;
            }
        }

        self.store.get_to_file(bucket, remote_path, local_path).await
    }

    /// Upload a local file, replacing any existing object
    pub async fn upload(
        &self,
        bucket: &str,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<(), StoreError> {
        let destination = gs_uri(bucket, remote_path);
        info!(source = %local_path.display(), destination = %destination, "Uploading file");

        let result = if local_path.is_file() {
            self.store.put_from_file(bucket, local_path, remote_path).await
        } else {
            Err(StoreError::io(
                local_path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "local file does not exist"),
            ))
        };

        match &result {
            Ok(()) => info!(destination = %destination, "Upload complete"),
            Err(e) => error!(destination = %destination, error = %e, "Upload failed"),
        }
        result
    }

    /// Object names under `prefix`; empty on failure
    pub async fn list(&self, bucket: &str, prefix: &str) -> Vec<String> {
        match self.try_list(bucket, prefix).await {
            Ok(names) => names,
            Err(e) => {
                warn!(bucket = bucket, prefix = prefix, error = %e, "Listing objects failed");
                Vec::new()
            }
        }
    }

    /// Object names under `prefix` with the failure reason kept
    pub async fn try_list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut names = self.store.list_objects(bucket, prefix).await?;
        names.sort();
        Ok(names)
    }

    /// Whether an authenticated call succeeds; never fails
    pub async fn check_authentication(&self) -> bool {
        match self.store.check_access().await {
            Ok(()) => {
                info!(backend = self.store.name(), "GCP authentication is configured");
                true
            }
            Err(e) => {
                warn!("{}", authentication_failed_error(&e.to_string()));
                false
            }
        }
    }

    /// Active project id, if one can be determined
    pub fn get_project_id(&self) -> Option<String> {
        match self.store.project_id() {
            Ok(project) => Some(project),
            Err(e) => {
                warn!(error = %e, "Could not determine project id");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsStore;
    use std::fs;
    use tempfile::TempDir;

    fn client_with_bucket(root: &Path) -> ObjectStoreClient {
        fs::create_dir_all(root.join("bkt/data")).unwrap();
        fs::write(root.join("bkt/data/train.csv"), "a,b\n1,2\n").unwrap();
        ObjectStoreClient::new(Box::new(FsStore::new(root.to_path_buf())))
    }

    #[tokio::test]
    async fn test_download_creates_parent_dirs_and_overwrites() {
        let remote = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        let client = client_with_bucket(remote.path());

        let dest = local.path().join("nested/dir/train.csv");
        client.download("bkt", "data/train.csv", &dest).await.unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "a,b\n1,2\n");

        fs::write(remote.path().join("bkt/data/train.csv"), "changed").unwrap();
        client.download("bkt", "data/train.csv", &dest).await.unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "changed");
    }

    #[tokio::test]
    async fn test_download_missing_object_is_not_found() {
        let remote = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        let client = client_with_bucket(remote.path());

        let err = client
            .download("bkt", "data/missing.csv", &local.path().join("x.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!local.path().join("x.csv").exists());
    }

    #[tokio::test]
    async fn test_download_rejects_empty_destination() {
        let remote = TempDir::new().unwrap();
        let client = client_with_bucket(remote.path());

        let err = client
            .download("bkt", "data/train.csv", Path::new(""))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_upload_missing_local_file_fails() {
        let remote = TempDir::new().unwrap();
        let client = client_with_bucket(remote.path());

        let err = client
            .upload("bkt", Path::new("/definitely/not/here.pkl"), "models/m.pkl")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[tokio::test]
    async fn test_list_swallows_failures() {
        let remote = TempDir::new().unwrap();
        let client = client_with_bucket(remote.path());

        assert_eq!(client.list("bkt", "data/").await, vec!["data/train.csv"]);
        assert!(client.list("no-such-bucket", "").await.is_empty());
        assert!(client.try_list("no-such-bucket", "").await.is_err());
    }

    #[tokio::test]
    async fn test_check_authentication_never_fails() {
        let remote = TempDir::new().unwrap();
        let client = client_with_bucket(remote.path());
        assert!(client.check_authentication().await);

        let gone = ObjectStoreClient::new(Box::new(FsStore::new(remote.path().join("gone"))));
        assert!(!gone.check_authentication().await);
    }

    #[test]
    fn test_project_id_defaults_to_none() {
        let remote = TempDir::new().unwrap();
        let client = ObjectStoreClient::new(Box::new(FsStore::new(remote.path().to_path_buf())));
        assert_eq!(client.get_project_id(), None);

        let client = ObjectStoreClient::new(Box::new(
            FsStore::new(remote.path().to_path_buf()).with_project("local-project"),
        ));
        assert_eq!(client.get_project_id().as_deref(), Some("local-project"));
    }
}
