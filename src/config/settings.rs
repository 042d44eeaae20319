// Configuration structs

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::errors::missing_setting_error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Cloud locations and credentials
    pub cloud: CloudSettings,

    /// Dataset schema, hyperparameters and artifact names
    pub training: TrainingSettings,

    /// Remote training job definition
    pub job: JobSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudSettings {
    /// Local credential file (GCP_CREDENTIALS_PATH)
    pub credentials_path: PathBuf,

    /// Bucket holding the dataset, models and tag file (GCS_BUCKET)
    pub bucket: Option<String>,

    /// Dataset object path (GCS_DATA_PATH)
    pub data_path: Option<String>,

    /// Remote directory for model artifacts (GCS_MODEL_DIR)
    pub model_dir: Option<String>,

    /// Object holding the latest container tag (CONTAINER_TAG_FILE)
    pub container_tag_file: Option<String>,

    /// Registry path the tag is appended to (CONTAINER_REGISTRY_PATH)
    pub container_registry_path: Option<String>,

    /// GCP_PROJECT_ID
    pub project_id: Option<String>,

    /// GCP_REGION
    pub region: Option<String>,

    /// Pre-issued bearer token, skips credential exchange (GCP_ACCESS_TOKEN)
    pub access_token: Option<String>,

    /// Serve buckets from this local directory instead of GCS (TABTRAIN_STORE_ROOT)
    pub store_root: Option<PathBuf>,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("gcp_auth.json"),
            bucket: None,
            data_path: None,
            model_dir: None,
            container_tag_file: None,
            container_registry_path: None,
            project_id: None,
            region: None,
            access_token: None,
            store_root: None,
        }
    }
}

impl CloudSettings {
    pub fn bucket(&self) -> Result<&str> {
        required(&self.bucket, "GCS_BUCKET")
    }

    pub fn data_path(&self) -> Result<&str> {
        required(&self.data_path, "GCS_DATA_PATH")
    }

    /// Model directory; an unset value means the bucket root
    pub fn model_dir(&self) -> &str {
        self.model_dir.as_deref().unwrap_or("")
    }

    pub fn container_tag_file(&self) -> Result<&str> {
        required(&self.container_tag_file, "CONTAINER_TAG_FILE")
    }

    pub fn container_registry_path(&self) -> Result<&str> {
        required(&self.container_registry_path, "CONTAINER_REGISTRY_PATH")
    }

    pub fn project_id(&self) -> Result<&str> {
        required(&self.project_id, "GCP_PROJECT_ID")
    }

    pub fn region(&self) -> Result<&str> {
        required(&self.region, "GCP_REGION")
    }
}

fn required<'a>(value: &'a Option<String>, env_var: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => bail!(missing_setting_error(env_var)),
    }
}

/// How a missing cell is filled before encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Imputation {
    /// Missing values are a data error
    #[default]
    None,
    /// Column mean of the present values (numeric columns only)
    Mean,
    /// Most frequent raw value, ties go to the smallest value
    Mode,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureKind {
    #[default]
    Numeric,
    /// Raw strings mapped to integer codes; anything outside the map is rejected
    Categorical { codes: BTreeMap<String, u32> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(default)]
    pub kind: FeatureKind,
    #[serde(default)]
    pub impute: Imputation,
}

impl FeatureSpec {
    pub fn numeric(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FeatureKind::Numeric,
            impute: Imputation::None,
        }
    }

    pub fn categorical(name: &str, codes: &[(&str, u32)]) -> Self {
        Self {
            name: name.to_string(),
            kind: FeatureKind::Categorical {
                codes: codes.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            },
            impute: Imputation::None,
        }
    }

    pub fn imputed(mut self, impute: Imputation) -> Self {
        self.impute = impute;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Title line of the generated report
    pub report_title: String,

    /// Label column; must hold non-negative integer class ids
    pub label: String,

    /// Ordered feature columns
    pub features: Vec<FeatureSpec>,

    /// Fraction of rows held out for evaluation (default: 0.2)
    pub test_ratio: f64,

    /// Seed shared by the split and the forest (default: 42)
    pub seed: u64,

    /// Number of trees (default: 100)
    pub n_estimators: usize,

    /// Depth limit per tree, unbounded when unset
    pub max_depth: Option<usize>,

    /// Serialized model file name (MODEL_FILENAME)
    pub model_filename: String,

    /// Text report file name
    pub report_filename: String,

    /// Directory the artifacts are written to before upload
    pub output_dir: PathBuf,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            report_title: "Titanic Survival Prediction Model".to_string(),
            label: "Survived".to_string(),
            features: vec![
                FeatureSpec::numeric("Pclass"),
                FeatureSpec::categorical("Sex", &[("male", 0), ("female", 1)]),
                FeatureSpec::numeric("Age").imputed(Imputation::Mean),
                FeatureSpec::numeric("SibSp"),
                FeatureSpec::numeric("Parch"),
                FeatureSpec::numeric("Fare"),
                FeatureSpec::categorical("Embarked", &[("S", 0), ("C", 1), ("Q", 2)])
                    .imputed(Imputation::Mode),
            ],
            test_ratio: 0.2,
            seed: 42,
            n_estimators: 100,
            max_depth: None,
            model_filename: "titanic_model.pkl".to_string(),
            report_filename: "model_info.txt".to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl TrainingSettings {
    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub display_name: String,
    pub machine_type: String,
    pub replica_count: u32,

    /// Credential path handed to the remote container
    pub remote_credentials_path: String,

    /// Where submitted jobs can be inspected
    pub console_url: String,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            display_name: "titanic-ml-training-job".to_string(),
            machine_type: "n1-standard-4".to_string(),
            replica_count: 1,
            remote_credentials_path: "gcp_auth.json".to_string(),
            console_url: "https://console.cloud.google.com/vertex-ai/training/custom-jobs"
                .to_string(),
        }
    }
}
