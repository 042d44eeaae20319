// Model evaluation
//
// Accuracy, a per-class precision/recall/F1 report and the feature
// importance ranking for a trained forest on held-out rows.

use anyhow::Result;
use serde::Serialize;
use std::fmt;

use super::forest::RandomForest;
use super::preprocess::FeatureMatrix;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub report: ClassificationReport,
    pub importances: Vec<FeatureImportance>,
}

/// Fraction of matching predictions (0.0 for no samples)
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Per-class metrics, one row per entry of `class_names`; zero divisions yield 0.0
///
/// Class id `i` is reported under `class_names[i]`.
pub fn classification_report(
    y_true: &[usize],
    y_pred: &[usize],
    class_names: &[String],
) -> ClassificationReport {
    let classes: Vec<ClassMetrics> = class_names
        .iter()
        .enumerate()
        .map(|(class, name)| {
            let mut tp = 0;
            let mut predicted = 0;
            let mut support = 0;
            for (&t, &p) in y_true.iter().zip(y_pred) {
                if p == class {
                    predicted += 1;
                }
                if t == class {
                    support += 1;
                    if p == class {
                        tp += 1;
                    }
                }
            }

            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            ClassMetrics {
                label: name.clone(),
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect();

    let total = y_true.len();
    let n = classes.len().max(1) as f64;
    let macro_avg = AverageMetrics {
        precision: classes.iter().map(|c| c.precision).sum::<f64>() / n,
        recall: classes.iter().map(|c| c.recall).sum::<f64>() / n,
        f1: classes.iter().map(|c| c.f1).sum::<f64>() / n,
    };

    let weight = |c: &ClassMetrics| ratio(c.support, total);
    let weighted_avg = AverageMetrics {
        precision: classes.iter().map(|c| c.precision * weight(c)).sum(),
        recall: classes.iter().map(|c| c.recall * weight(c)).sum(),
        f1: classes.iter().map(|c| c.f1 * weight(c)).sum(),
    };

    ClassificationReport {
        classes,
        accuracy: accuracy(y_true, y_pred),
        macro_avg,
        weighted_avg,
        total,
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(12);

        writeln!(
            f,
            "{:>w$} {:>9} {:>9} {:>9} {:>9}",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            w = width
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>w$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label,
                c.precision,
                c.recall,
                c.f1,
                c.support,
                w = width
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>w$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total,
            w = width
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>w$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name,
                avg.precision,
                avg.recall,
                avg.f1,
                self.total,
                w = width
            )?;
        }
        Ok(())
    }
}

/// Pair names with importances, most important first (stable for ties)
pub fn rank_importances(names: &[String], values: &[f64]) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = names
        .iter()
        .zip(values)
        .map(|(feature, &importance)| FeatureImportance {
            feature: feature.clone(),
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}

/// Importance table with right-aligned columns
pub fn render_importances(importances: &[FeatureImportance]) -> String {
    let name_width = importances
        .iter()
        .map(|i| i.feature.len())
        .chain(std::iter::once("feature".len()))
        .max()
        .unwrap_or(7);

    let mut out = format!("{:>w$}  {:>10}\n", "feature", "importance", w = name_width);
    for item in importances {
        out.push_str(&format!(
            "{:>w$}  {:>10.6}\n",
            item.feature,
            item.importance,
            w = name_width
        ));
    }
    out
}

/// Score a trained forest on the test rows
pub fn evaluate(model: &RandomForest, test: &FeatureMatrix) -> Result<Evaluation> {
    tracing::info!(samples = test.len(), "Evaluating model");

    let predictions = model.predict(test.features.view())?;
    let report = classification_report(&test.labels, &predictions, &test.class_names);

    Ok(Evaluation {
        accuracy: report.accuracy,
        importances: rank_importances(&test.feature_names, model.feature_importances()),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary() -> Vec<String> {
        vec!["0".to_string(), "1".to_string()]
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0, 1, 1, 0], &[0, 1, 0, 0]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_per_class_metrics() {
        let y_true = [0, 0, 0, 1, 1];
        let y_pred = [0, 0, 1, 1, 0];
        let report = classification_report(&y_true, &y_pred, &binary());

        let zero = &report.classes[0];
        assert!((zero.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((zero.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(zero.support, 3);

        let one = &report.classes[1];
        assert!((one.precision - 0.5).abs() < 1e-12);
        assert!((one.recall - 0.5).abs() < 1e-12);
        assert!((one.f1 - 0.5).abs() < 1e-12);

        assert!((report.macro_avg.recall - (2.0 / 3.0 + 0.5) / 2.0).abs() < 1e-12);
        assert!((report.weighted_avg.recall - report.accuracy).abs() < 1e-12);
        assert_eq!(report.total, 5);
    }

    #[test]
    fn test_absent_predictions_give_zero_not_nan() {
        let report = classification_report(&[0, 1], &[0, 0], &binary());
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].f1, 0.0);
    }

    #[test]
    fn test_report_layout() {
        let report = classification_report(&[0, 1, 1], &[0, 1, 0], &binary());
        let text = report.to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].contains("precision") && lines[0].contains("support"));
        assert!(lines[2].trim_start().starts_with("0 "));
        assert!(text.contains("    accuracy"));
        assert!(text.contains("weighted avg"));
    }

    #[test]
    fn test_rows_use_label_names_without_gaps() {
        let names = vec!["0".to_string(), "5".to_string()];
        let report = classification_report(&[0, 1, 1, 0], &[0, 1, 1, 0], &names);

        let labels: Vec<&str> = report.classes.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["0", "5"]);
        assert_eq!(report.macro_avg.f1, 1.0);
        assert!(report.to_string().lines().nth(3).unwrap().trim_start().starts_with("5 "));
    }

    #[test]
    fn test_importances_ranked_descending() {
        let names: Vec<String> = ["Pclass", "Sex", "Age"].iter().map(|s| s.to_string()).collect();
        let ranked = rank_importances(&names, &[0.1, 0.6, 0.3]);
        let order: Vec<&str> = ranked.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(order, vec!["Sex", "Age", "Pclass"]);

        let table = render_importances(&ranked);
        assert!(table.lines().next().unwrap().contains("importance"));
        assert!(table.contains("0.600000"));
    }
}
