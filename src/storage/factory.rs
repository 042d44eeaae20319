// Object store factory
//
// Picks a backend from the cloud settings

use anyhow::{Context, Result};

use super::{FsStore, GcsStore, ObjectStore, ObjectStoreClient};
use crate::config::CloudSettings;
use crate::gcp::{token_source, Credentials};

/// Create the backend the settings ask for
pub fn build_store(
    cloud: &CloudSettings,
    credentials: Option<&Credentials>,
) -> Result<Box<dyn ObjectStore>> {
    let project = cloud
        .project_id
        .clone()
        .or_else(|| credentials.and_then(|c| c.project_id()).map(str::to_string));

    if let Some(root) = &cloud.store_root {
        tracing::info!(root = %root.display(), "Using local filesystem object store");
        let mut store = FsStore::new(root.clone());
        if let Some(project) = project {
            store = store.with_project(project);
        }
        return Ok(Box::new(store));
    }

    let tokens = token_source(credentials, cloud.access_token.as_deref())
        .context("Failed to set up GCP authentication")?;
    let store = GcsStore::new(tokens, project)?;
    Ok(Box::new(store))
}

/// Create a client over the configured backend
pub fn build_client(
    cloud: &CloudSettings,
    credentials: Option<&Credentials>,
) -> Result<ObjectStoreClient> {
    Ok(ObjectStoreClient::new(build_store(cloud, credentials)?))
}
