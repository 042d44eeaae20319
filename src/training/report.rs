// Human-readable model report

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::Path;

use super::evaluate::{render_importances, Evaluation};
use super::forest::{ForestParams, ALGORITHM};

/// Everything written to the report file; built once per training run
#[derive(Debug, Clone)]
pub struct ModelReport {
    pub title: String,
    pub created_at: DateTime<Local>,
    pub accuracy: f64,
    pub total_samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub features: Vec<String>,
    pub params: ForestParams,
    pub importance_table: String,
    pub classification_report: String,
}

impl ModelReport {
    pub fn new(
        title: &str,
        evaluation: &Evaluation,
        params: &ForestParams,
        features: &[String],
        (total, train, test): (usize, usize, usize),
    ) -> Self {
        Self {
            title: title.to_string(),
            created_at: Local::now(),
            accuracy: evaluation.accuracy,
            total_samples: total,
            train_samples: train,
            test_samples: test,
            features: features.to_vec(),
            params: params.clone(),
            importance_table: render_importances(&evaluation.importances),
            classification_report: evaluation.report.to_string(),
        }
    }

    pub fn render(&self) -> String {
        let underline = "=".repeat(self.title.chars().count());
        let max_depth = self
            .params
            .max_depth
            .map_or_else(|| "None".to_string(), |d| d.to_string());

        format!(
            "\n{title}\n{underline}\n\
             Created: {created}\n\
             Accuracy: {accuracy:.4}\n\
             \n\
             Data:\n\
             - Total samples: {total}\n\
             - Training samples: {train}\n\
             - Test samples: {test}\n\
             \n\
             Features:\n\
             {features}\n\
             \n\
             Model parameters:\n\
             - Algorithm: {algorithm}\n\
             - n_estimators: {n_estimators}\n\
             - max_depth: {max_depth}\n\
             - random_state: {seed}\n\
             \n\
             Feature importance:\n\
             {importances}\n\
             Classification report:\n\
             {report}",
            title = self.title,
            underline = underline,
            created = self.created_at.format("%Y-%m-%d %H:%M:%S"),
            accuracy = self.accuracy,
            total = self.total_samples,
            train = self.train_samples,
            test = self.test_samples,
            features = self.features.join(", "),
            algorithm = ALGORITHM,
            n_estimators = self.params.n_estimators,
            max_depth = max_depth,
            seed = self.params.seed,
            importances = self.importance_table,
            report = self.classification_report,
        )
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())
            .with_context(|| format!("Failed to write report to {:?}", path))?;
        tracing::info!(path = %path.display(), "Saved model report");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::evaluate::{classification_report, rank_importances};

    fn sample_report() -> ModelReport {
        let names = vec!["Sex".to_string(), "Fare".to_string()];
        let evaluation = Evaluation {
            accuracy: 0.8212,
            report: classification_report(&[0, 1, 1], &[0, 1, 0], &["0".to_string(), "1".to_string()]),
            importances: rank_importances(&names, &[0.7, 0.3]),
        };
        ModelReport::new(
            "Titanic Survival Prediction Model",
            &evaluation,
            &ForestParams::default(),
            &names,
            (891, 712, 179),
        )
    }

    #[test]
    fn test_render_contains_all_sections() {
        let text = sample_report().render();
        assert!(text.contains("Titanic Survival Prediction Model\n================================="));
        assert!(text.contains("Accuracy: 0.8212"));
        assert!(text.contains("- Total samples: 891"));
        assert!(text.contains("- Training samples: 712"));
        assert!(text.contains("- Test samples: 179"));
        assert!(text.contains("Sex, Fare"));
        assert!(text.contains("- Algorithm: RandomForestClassifier"));
        assert!(text.contains("- n_estimators: 100"));
        assert!(text.contains("- random_state: 42"));
        assert!(text.contains("importance"));
        assert!(text.contains("weighted avg"));
    }

    #[test]
    fn test_timestamp_format() {
        let report = sample_report();
        let text = report.render();
        let created = report.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        assert!(text.contains(&format!("Created: {}", created)));
    }

    #[test]
    fn test_write_to_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("model_info.txt");
        sample_report().write_to(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("Classification report:"));
    }
}
