// Local filesystem object store
//
// Each bucket is a directory under `root`; object names are relative paths
// with '/' separators. Used for local runs and tests.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use super::{ObjectStore, StoreError};

pub struct FsStore {
    root: PathBuf,
    project: Option<String>,
}

impl FsStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root, project: None }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    fn object_path(&self, bucket: &str, name: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(name.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if bucket.is_empty() || bucket.contains('/') || name.is_empty() || escapes {
            return Err(StoreError::InvalidPath(format!("{}/{}", bucket, name)));
        }
        Ok(self.root.join(bucket).join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn get_to_file(
        &self,
        bucket: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<(), StoreError> {
        let source = self.object_path(bucket, remote_path)?;
        if !source.is_file() {
            return Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                path: remote_path.to_string(),
            });
        }

        tokio::fs::copy(&source, local_path)
            .await
            .map_err(|e| StoreError::io(local_path, e))?;
        Ok(())
    }

    async fn put_from_file(
        &self,
        bucket: &str,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<(), StoreError> {
        let destination = self.object_path(bucket, remote_path)?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        tokio::fs::copy(local_path, &destination)
            .await
            .map_err(|e| StoreError::io(local_path, e))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let bucket_dir = self.root.join(bucket);
        if bucket.is_empty() || !bucket_dir.is_dir() {
            return Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                path: prefix.to_string(),
            });
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&bucket_dir) {
            let entry = entry.map_err(|e| StoreError::Transport(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&bucket_dir) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if name.starts_with(prefix) {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    async fn check_access(&self) -> Result<(), StoreError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Transport(format!(
                "store root {} does not exist",
                self.root.display()
            )))
        }
    }

    fn project_id(&self) -> Result<String, StoreError> {
        self.project.clone().ok_or(StoreError::MissingProject)
    }

    fn name(&self) -> &str {
        "fs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_then_list_sorted() {
        let root = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        let file = local.path().join("f.txt");
        fs::write(&file, "x").unwrap();

        let store = FsStore::new(root.path().to_path_buf());
        store.put_from_file("bkt", &file, "models/b.txt").await.unwrap();
        store.put_from_file("bkt", &file, "models/a.txt").await.unwrap();
        store.put_from_file("bkt", &file, "other/c.txt").await.unwrap();

        let names = store.list_objects("bkt", "models/").await.unwrap();
        assert_eq!(names, vec!["models/a.txt", "models/b.txt"]);
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_bucket() {
        let root = TempDir::new().unwrap();
        let store = FsStore::new(root.path().to_path_buf());
        let err = store
            .get_to_file("bkt", "../secret", Path::new("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }
}
