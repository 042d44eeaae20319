// Training pipeline
//
// download → load → preprocess → split → train → evaluate → save → publish.
// Each stage feeds the next; any failure ends the run.

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::dataset::Table;
use super::evaluate::{evaluate, Evaluation};
use super::forest::{save_model, ForestParams, RandomForest};
use super::preprocess::preprocess;
use super::report::ModelReport;
use super::split::train_test_split;
use crate::config::{Settings, TrainingSettings};
use crate::errors::UserFriendlyError;
use crate::gcp;
use crate::storage::{build_client, gs_uri, remote_join, ObjectStoreClient};

/// Banner separating pipeline stages in the log
pub fn log_section(title: &str) {
    info!("========== {} ==========", title);
}

/// Result of stages 4-7 plus the rendered report
pub struct TrainedModel {
    pub forest: RandomForest,
    pub feature_names: Vec<String>,
    pub class_names: Vec<String>,
    pub evaluation: Evaluation,
    pub report: ModelReport,
    pub train_samples: usize,
    pub test_samples: usize,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub accuracy: f64,
    pub train_samples: usize,
    pub test_samples: usize,
    /// gs:// URIs of the published artifacts
    pub uploaded: Vec<String>,
}

/// Preprocess, split, fit and score a loaded table
pub fn train_and_evaluate(table: &Table, training: &TrainingSettings) -> Result<TrainedModel> {
    let data = preprocess(table, training)
        .map_err(anyhow::Error::from)
        .user_context("Dataset does not match the configured schema")?;

    log_section("Split data");
    let split = train_test_split(data.len(), training.test_ratio, training.seed)?;
    let train = data.select(&split.train);
    let test = data.select(&split.test);
    info!(train = train.len(), test = test.len(), "Split dataset");

    let params = ForestParams::from_settings(training);
    let forest = RandomForest::fit_with_classes(
        params.clone(),
        train.features.view(),
        &train.labels,
        data.n_classes(),
    )?;

    let evaluation = evaluate(&forest, &test)?;

    log_section("Evaluation results");
    info!("Accuracy: {:.4}", evaluation.accuracy);
    info!("Classification report:\n{}", evaluation.report);
    for item in &evaluation.importances {
        info!(feature = %item.feature, importance = item.importance, "Feature importance");
    }

    let report = ModelReport::new(
        &training.report_title,
        &evaluation,
        &params,
        &data.feature_names,
        (data.len(), train.len(), test.len()),
    );

    Ok(TrainedModel {
        forest,
        feature_names: data.feature_names,
        class_names: data.class_names,
        evaluation,
        report,
        train_samples: train.len(),
        test_samples: test.len(),
    })
}

pub struct TrainingPipeline {
    settings: Settings,
    store: ObjectStoreClient,
}

impl TrainingPipeline {
    pub fn new(settings: Settings, store: ObjectStoreClient) -> Self {
        Self { settings, store }
    }

    pub async fn run(&self) -> Result<TrainingOutcome> {
        let cloud = &self.settings.cloud;
        let bucket = cloud.bucket()?;
        let data_path = cloud.data_path()?;

        // Dataset copy lives only as long as this run
        let work_dir = tempfile::Builder::new()
            .prefix("tabtrain-")
            .tempdir()
            .context("Failed to create working directory")?;
        let local_data = work_dir.path().join(
            Path::new(data_path)
                .file_name()
                .unwrap_or_else(|| OsStr::new("dataset.csv")),
        );

        log_section("Download data");
        self.store
            .download(bucket, data_path, &local_data)
            .await
            .map_err(anyhow::Error::from)
            .user_context_with_suggestion(
                &format!("Failed to download dataset {}", gs_uri(bucket, data_path)),
                "check GCS_BUCKET and GCS_DATA_PATH",
            )?;

        log_section("Load data");
        let table = Table::from_path(&local_data)
            .with_context(|| format!("Failed to load {}", local_data.display()))?;
        table.log_summary();

        let trained = train_and_evaluate(&table, &self.settings.training)?;

        log_section("Save and upload model");
        let artifacts = self.write_artifacts(&trained)?;
        let uploaded = self.publish(bucket, &artifacts).await?;

        Ok(TrainingOutcome {
            accuracy: trained.evaluation.accuracy,
            train_samples: trained.train_samples,
            test_samples: trained.test_samples,
            uploaded,
        })
    }

    /// Write the model and the report into the output directory
    fn write_artifacts(&self, trained: &TrainedModel) -> Result<Vec<PathBuf>> {
        let training = &self.settings.training;
        fs::create_dir_all(&training.output_dir).with_context(|| {
            format!("Failed to create output directory {:?}", training.output_dir)
        })?;

        let model_path = training.output_dir.join(&training.model_filename);
        let report_path = training.output_dir.join(&training.report_filename);

        save_model(
            &model_path,
            &trained.forest,
            &trained.feature_names,
            &trained.class_names,
        )?;
        if let Err(e) = trained.report.write_to(&report_path) {
            if let Err(rm) = fs::remove_file(&model_path) {
                warn!(path = %model_path.display(), error = %rm, "Failed to remove partial model file");
            }
            return Err(e);
        }

        Ok(vec![model_path, report_path])
    }

    /// Upload every artifact; local copies are removed only once all have landed
    async fn publish(&self, bucket: &str, artifacts: &[PathBuf]) -> Result<Vec<String>> {
        let model_dir = self.settings.cloud.model_dir();
        let mut uploaded = Vec::with_capacity(artifacts.len());

        for artifact in artifacts {
            let file_name = artifact
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .with_context(|| format!("Artifact has no file name: {:?}", artifact))?;
            let remote_path = remote_join(model_dir, &file_name);

            if let Err(e) = self.store.upload(bucket, artifact, &remote_path).await {
                warn!(
                    kept = ?artifacts,
                    "Publishing incomplete; local artifacts kept for retry"
                );
                return Err(e).with_context(|| {
                    format!("Failed to upload {}", gs_uri(bucket, &remote_path))
                });
            }
            uploaded.push(gs_uri(bucket, &remote_path));
        }

        for artifact in artifacts {
            if let Err(e) = fs::remove_file(artifact) {
                warn!(path = %artifact.display(), error = %e, "Failed to remove local artifact");
            }
        }
        info!(count = uploaded.len(), "Local artifacts removed after upload");

        Ok(uploaded)
    }
}

/// Configure credentials, connect to the object store and run the pipeline
pub async fn run_training(settings: Settings) -> Result<TrainingOutcome> {
    log_section("Configure credentials");
    let credentials = gcp::configure(&settings.cloud.credentials_path);
    let store = build_client(&settings.cloud, credentials.as_ref())?;

    TrainingPipeline::new(settings, store).run().await
}
