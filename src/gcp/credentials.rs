// Credential configurator
//
// Presence-checks the credential file and returns it as a value that the
// storage and job clients take in their constructors.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::credentials_not_found_error;

/// Fields we read from a Google credential JSON file
///
/// Everything is optional: the file format belongs to Google, and an
/// unreadable file still counts as "present".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialFile {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub project_id: Option<String>,
    pub quota_project_id: Option<String>,
    pub client_email: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    ServiceAccount,
    AuthorizedUser,
    Unknown,
}

/// A credential file that was found on disk
#[derive(Debug, Clone)]
pub struct Credentials {
    path: PathBuf,
    file: CredentialFile,
}

impl Credentials {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &CredentialFile {
        &self.file
    }

    pub fn kind(&self) -> CredentialKind {
        match self.file.kind.as_deref() {
            Some("service_account") => CredentialKind::ServiceAccount,
            Some("authorized_user") => CredentialKind::AuthorizedUser,
            _ => CredentialKind::Unknown,
        }
    }

    /// Project the credentials belong to, if the file names one
    pub fn project_id(&self) -> Option<&str> {
        self.file
            .project_id
            .as_deref()
            .or(self.file.quota_project_id.as_deref())
    }
}

/// Point cloud clients at a local credential file
///
/// Returns `None` (and logs the reason) when the file does not exist.
pub fn configure(path: &Path) -> Option<Credentials> {
    if !path.is_file() {
        tracing::warn!("{}", credentials_not_found_error(path));
        return None;
    }

    let file = match fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str::<CredentialFile>(&raw).map_err(|e| e.to_string()))
    {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Credential file is not readable JSON");
            CredentialFile::default()
        }
    };

    tracing::info!(path = %path.display(), kind = ?file.kind, "GCP credentials configured");

    Some(Credentials {
        path: path.to_path_buf(),
        file,
    })
}
