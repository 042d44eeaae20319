// Random forest classifier
//
// Bagged CART trees with per-split feature subsampling. Every tree draws
// its own seed from one master RNG, so a fixed seed gives identical trees.

use anyhow::{bail, Context, Result};
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

mod tree;

pub use tree::{gini, DecisionTree, TreeNode, TreeParams};

use crate::config::TrainingSettings;

pub const ALGORITHM: &str = "RandomForestClassifier";
const FORMAT_VERSION: u32 = 1;

/// Features considered at each split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    All,
    Count(usize),
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(n) => n.min(n_features),
        };
        n.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestParams {
    pub fn from_settings(training: &TrainingSettings) -> Self {
        Self {
            n_estimators: training.n_estimators,
            max_depth: training.max_depth,
            seed: training.seed,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Fit `params.n_estimators` trees on `x`/`y`, inferring the class count from `y`
    pub fn fit(params: ForestParams, x: ArrayView2<f64>, y: &[usize]) -> Result<Self> {
        // Ids are expected dense, so there can't be more classes than samples
        let max_id = y.iter().copied().max().unwrap_or(0);
        if max_id >= y.len().max(2) {
            bail!("class id {} out of range for {} samples", max_id, y.len());
        }
        Self::fit_with_classes(params, x, y, max_id + 1)
    }

    /// Fit with a known class count; every id in `y` must be below `n_classes`
    pub fn fit_with_classes(
        params: ForestParams,
        x: ArrayView2<f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 || n_features == 0 {
            bail!("cannot fit a forest on an empty feature matrix");
        }
        if y.len() != n_samples {
            bail!("{} labels for {} samples", y.len(), n_samples);
        }
        if params.n_estimators == 0 {
            bail!("n_estimators must be at least 1");
        }
        if let Some(bad) = y.iter().find(|&&c| c >= n_classes) {
            bail!("class id {} out of range for {} classes", bad, n_classes);
        }

        let n_classes = n_classes.max(2);
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split.max(2),
            max_features: params.max_features.resolve(n_features),
        };

        tracing::info!(
            n_estimators = params.n_estimators,
            samples = n_samples,
            features = n_features,
            seed = params.seed,
            "Training random forest"
        );

        let mut master = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let mut rng = StdRng::seed_from_u64(master.gen());
            let samples: Vec<usize> = if params.bootstrap {
                (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
            } else {
                (0..n_samples).collect()
            };
            trees.push(DecisionTree::fit(x, y, samples, n_classes, &tree_params, &mut rng));
        }

        let feature_importances = average_importances(&trees, n_features);
        tracing::debug!(
            nodes = trees.iter().map(DecisionTree::node_count).sum::<usize>(),
            "Forest trained"
        );

        Ok(Self {
            params,
            n_features,
            n_classes,
            trees,
            feature_importances,
        })
    }

    /// Mean of the trees' leaf distributions, one row per sample
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            bail!(
                "model expects {} features, got {}",
                self.n_features,
                x.ncols()
            );
        }

        let mut proba = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for (row, mut out) in x.rows().into_iter().zip(proba.rows_mut()) {
            for tree in &self.trees {
                for (o, p) in out.iter_mut().zip(tree.predict_proba_row(row)) {
                    *o += p;
                }
            }
        }
        proba /= self.trees.len() as f64;
        Ok(proba)
    }

    /// Most probable class per sample; ties go to the lower class id
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::MIN), |best, (class, &p)| {
                        if p > best.1 {
                            (class, p)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect())
    }

    /// Mean decrease in impurity per feature, summing to 1
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}

fn average_importances(trees: &[DecisionTree], n_features: usize) -> Vec<f64> {
    let mut total = vec![0.0; n_features];
    for tree in trees {
        for (t, v) in total.iter_mut().zip(tree.feature_importances()) {
            *t += v;
        }
    }

    let sum: f64 = total.iter().sum();
    if sum > 0.0 {
        total.iter_mut().for_each(|v| *v /= sum);
    }
    total
}

/// On-disk model artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub format_version: u32,
    pub algorithm: String,
    pub feature_names: Vec<String>,
    /// Label value of each class id
    #[serde(default)]
    pub class_names: Vec<String>,
    pub timestamp: String,
    pub forest: RandomForest,
}

/// Serialize the forest with its feature and class names
pub fn save_model(
    path: &Path,
    forest: &RandomForest,
    feature_names: &[String],
    class_names: &[String],
) -> Result<()> {
    let saved = SavedModel {
        format_version: FORMAT_VERSION,
        algorithm: ALGORITHM.to_string(),
        feature_names: feature_names.to_vec(),
        class_names: class_names.to_vec(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        forest: forest.clone(),
    };

    let json = serde_json::to_string(&saved).context("Failed to serialize model")?;
    fs::write(path, json).with_context(|| format!("Failed to write model to {:?}", path))?;

    tracing::info!(path = %path.display(), trees = forest.trees.len(), "Saved model");
    Ok(())
}

pub fn load_model(path: &Path) -> Result<SavedModel> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read model from {:?}", path))?;
    let saved: SavedModel =
        serde_json::from_str(&json).context("Failed to parse model JSON")?;

    if saved.format_version != FORMAT_VERSION {
        bail!(
            "Unsupported model format version {} (expected {})",
            saved.format_version,
            FORMAT_VERSION
        );
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use tempfile::TempDir;

    /// Class is 1 when feature 0 exceeds 5; feature 1 is noise
    fn toy_data() -> (Array2<f64>, Vec<usize>) {
        let n = 60;
        let x = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => (i % 10) as f64,
            1 => ((i * 7) % 13) as f64,
            _ => ((i * 3) % 5) as f64,
        });
        let y = (0..n).map(|i| usize::from(i % 10 > 5)).collect();
        (x, y)
    }

    fn small_params(seed: u64) -> ForestParams {
        ForestParams {
            n_estimators: 15,
            seed,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(7), 2);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
        assert_eq!(MaxFeatures::Count(10).resolve(7), 7);
    }

    #[test]
    fn test_learns_threshold_rule() {
        let (x, y) = toy_data();
        let forest = RandomForest::fit(small_params(42), x.view(), &y).unwrap();
        let predictions = forest.predict(x.view()).unwrap();

        let correct = predictions.iter().zip(&y).filter(|(p, t)| p == t).count();
        assert!(correct as f64 / y.len() as f64 > 0.95);

        let importances = forest.feature_importances();
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
        assert!(importances[0] > importances[2]);
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let (x, y) = toy_data();
        let a = RandomForest::fit(small_params(42), x.view(), &y).unwrap();
        let b = RandomForest::fit(small_params(42), x.view(), &y).unwrap();

        assert_eq!(a.feature_importances(), b.feature_importances());
        assert_eq!(
            a.predict_proba(x.view()).unwrap(),
            b.predict_proba(x.view()).unwrap()
        );
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = toy_data();
        let forest = RandomForest::fit(small_params(1), x.view(), &y).unwrap();
        let proba = forest.predict_proba(x.view()).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        let (x, y) = toy_data();
        assert!(RandomForest::fit(small_params(1), x.view(), &y[..10]).is_err());

        let params = ForestParams {
            n_estimators: 0,
            ..ForestParams::default()
        };
        assert!(RandomForest::fit(params, x.view(), &y).is_err());

        let forest = RandomForest::fit(small_params(1), x.view(), &y).unwrap();
        let wrong_width = Array2::<f64>::zeros((2, 5));
        assert!(forest.predict(wrong_width.view()).is_err());
    }

    #[test]
    fn test_sparse_class_ids_are_rejected() {
        let (x, mut y) = toy_data();
        y[0] = usize::MAX;
        let err = RandomForest::fit(small_params(1), x.view(), &y).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let (x, y) = toy_data();
        assert!(RandomForest::fit_with_classes(small_params(1), x.view(), &y, 1).is_err());
        let forest = RandomForest::fit_with_classes(small_params(1), x.view(), &y, 3).unwrap();
        assert_eq!(forest.n_classes(), 3);
    }

    #[test]
    fn test_save_and_load() {
        let (x, y) = toy_data();
        let forest = RandomForest::fit(small_params(42), x.view(), &y).unwrap();
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("titanic_model.pkl");
        let classes = vec!["0".to_string(), "1".to_string()];
        save_model(&path, &forest, &names, &classes).unwrap();

        let saved = load_model(&path).unwrap();
        assert_eq!(saved.algorithm, ALGORITHM);
        assert_eq!(saved.feature_names, names);
        assert_eq!(saved.class_names, classes);
        assert_eq!(
            saved.forest.predict(x.view()).unwrap(),
            forest.predict(x.view()).unwrap()
        );
    }
}
