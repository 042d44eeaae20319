// User-friendly error messages
//
// Helpers that turn configuration and cloud failures into messages
// that tell the operator what to fix.

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

/// Wrap an error with user-friendly context
pub trait UserFriendlyError {
    /// Add user-friendly context to this error
    fn user_context(self, message: &str) -> Self;

    /// Add user-friendly context with a suggestion
    fn user_context_with_suggestion(self, problem: &str, suggestion: &str) -> Self;
}

impl<T> UserFriendlyError for Result<T> {
    fn user_context(self, message: &str) -> Self {
        self.with_context(|| message.to_string())
    }

    fn user_context_with_suggestion(self, problem: &str, suggestion: &str) -> Self {
        self.with_context(|| wrap_error_with_suggestion(problem, suggestion))
    }
}

/// Credential file missing at the configured path
pub fn credentials_not_found_error(path: &Path) -> String {
    format!(
        "Credential file not found: {}\n\n\
        \x1b[1;33mPossible causes:\x1b[0m\n\
        • GCP_CREDENTIALS_PATH points to the wrong file\n\
        • The service account key was never downloaded\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Set the path explicitly:\n\
           \x1b[36mexport GCP_CREDENTIALS_PATH=/path/to/key.json\x1b[0m\n\n\
        2. Or provide a token directly:\n\
           \x1b[36mexport GCP_ACCESS_TOKEN=$(gcloud auth print-access-token)\x1b[0m",
        path.display()
    )
}

/// Required setting absent from both the config file and the environment
pub fn missing_setting_error(env_var: &str) -> String {
    format!(
        "Missing required setting {}\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Export it:\n\
           \x1b[36mexport {}=...\x1b[0m\n\n\
        2. Or set it in tabtrain.toml",
        env_var, env_var
    )
}

/// Authentication check failed
pub fn authentication_failed_error(cause: &str) -> String {
    format!(
        "GCP authentication failed\n\n\
        \x1b[1;33mError:\x1b[0m {}\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Refresh application default credentials:\n\
           \x1b[36mgcloud auth application-default login\x1b[0m\n\n\
        2. Check the credential file referenced by GCP_CREDENTIALS_PATH",
        cause
    )
}

/// Format a config parse error with helpful suggestions
pub fn config_parse_error(error: &str) -> String {
    format!(
        "Failed to load configuration\n\n\
        \x1b[1;33mError:\x1b[0m {}\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Check tabtrain.toml syntax\n\
        2. Feature entries need a name and an optional kind/impute:\n\
           \x1b[36m[[training.features]]\x1b[0m\n\
           \x1b[36mname = \"Sex\"\x1b[0m\n\
           \x1b[36mkind = {{ type = \"categorical\", codes = {{ male = 0, female = 1 }} }}\x1b[0m",
        error
    )
}

/// Wrap a generic error with suggestions
pub fn wrap_error_with_suggestion(error: impl fmt::Display, suggestion: &str) -> String {
    format!("{}\n\n\x1b[1;33mSuggestion:\x1b[0m {}", error, suggestion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_setting_names_variable() {
        let msg = missing_setting_error("GCS_BUCKET");
        assert!(msg.contains("export GCS_BUCKET="));
    }

    #[test]
    fn test_credentials_error_mentions_path() {
        let msg = credentials_not_found_error(Path::new("/tmp/key.json"));
        assert!(msg.contains("/tmp/key.json"));
        assert!(msg.contains("GCP_ACCESS_TOKEN"));
    }

    #[test]
    fn test_user_context_with_suggestion_keeps_source() {
        let result: Result<()> = Err(anyhow::anyhow!("boom"));
        let err = result
            .user_context_with_suggestion("Upload failed", "retry later")
            .unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("Upload failed"));
        assert!(chain.contains("boom"));
    }
}
