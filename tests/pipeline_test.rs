// Training pipeline end-to-end tests
//
// Runs the whole train command against a local directory object store:
// 1. A full run publishes exactly the model and the report and leaves nothing local
// 2. A missing dataset stops the run before any artifact is written
// 3. A failed upload keeps the local artifacts
// 4. Training on identical data is reproducible
// 5. Sparse or huge label values become dense classes in the report
// 6. A report that can't be written takes the model file with it

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use tabtrain::config::Settings;
use tabtrain::training::{load_model, run_training, train_and_evaluate, Table};
use tempfile::TempDir;

const BUCKET: &str = "titanic-bkt";
const DATA_PATH: &str = "data/train.csv";

/// Titanic-shaped CSV with missing ages and a few missing ports
fn titanic_csv(rows: usize, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = String::from(
        "PassengerId,Survived,Pclass,Name,Sex,Age,SibSp,Parch,Ticket,Fare,Cabin,Embarked\n",
    );

    for id in 1..=rows {
        let pclass = rng.gen_range(1..=3);
        let female = rng.gen_bool(0.35);
        let age = if rng.gen_bool(0.2) {
            String::new()
        } else {
            format!("{:.1}", rng.gen_range(1.0..70.0))
        };
        let sibsp = rng.gen_range(0..4);
        let parch = rng.gen_range(0..3);
        let fare = match pclass {
            1 => rng.gen_range(30.0..250.0),
            2 => rng.gen_range(10.0..40.0),
            _ => rng.gen_range(5.0..20.0),
        };
        let embarked = match rng.gen_range(0..100) {
            0..=1 => "",
            2..=70 => "S",
            71..=90 => "C",
            _ => "Q",
        };

        let chance = match (female, pclass) {
            (true, 1 | 2) => 0.9,
            (true, _) => 0.5,
            (false, 1) => 0.4,
            (false, _) => 0.12,
        };
        let survived = u8::from(rng.gen_bool(chance));

        out.push_str(&format!(
            "{},{},{},\"Passenger, No. {}\",{},{},{},{},T{},{:.2},,{}\n",
            id,
            survived,
            pclass,
            id,
            if female { "female" } else { "male" },
            age,
            sibsp,
            parch,
            id,
            fare,
            embarked
        ));
    }
    out
}

/// Replace the Survived value of every row that survived
fn relabel_survivors(csv: &str, label: &str) -> String {
    csv.lines()
        .enumerate()
        .map(|(i, line)| {
            let (id, rest) = line.split_once(',').unwrap();
            match rest.split_once(',') {
                Some(("1", tail)) if i > 0 => format!("{},{},{}\n", id, label, tail),
                _ => format!("{}\n", line),
            }
        })
        .collect()
}

struct Fixture {
    _temp: TempDir,
    store_root: PathBuf,
    output_dir: PathBuf,
    settings: Settings,
}

fn fixture(rows: usize) -> Fixture {
    let temp = TempDir::new().unwrap();
    let store_root = temp.path().join("store");
    let output_dir = temp.path().join("out");

    let dataset = store_root.join(BUCKET).join(DATA_PATH);
    fs::create_dir_all(dataset.parent().unwrap()).unwrap();
    fs::write(&dataset, titanic_csv(rows, 7)).unwrap();

    let mut settings = Settings::default();
    settings.cloud.credentials_path = temp.path().join("gcp_auth.json");
    settings.cloud.store_root = Some(store_root.clone());
    settings.cloud.bucket = Some(BUCKET.to_string());
    settings.cloud.data_path = Some(DATA_PATH.to_string());
    settings.cloud.model_dir = Some("models".to_string());
    settings.training.n_estimators = 20;
    settings.training.output_dir = output_dir.clone();

    Fixture {
        _temp: temp,
        store_root,
        output_dir,
        settings,
    }
}

fn files_in(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_full_run_publishes_model_and_report() {
    let fx = fixture(891);

    let outcome = run_training(fx.settings.clone()).await.unwrap();

    assert_eq!(outcome.train_samples, 712);
    assert_eq!(outcome.test_samples, 179);
    assert!(outcome.accuracy > 0.6, "accuracy {}", outcome.accuracy);
    assert_eq!(
        outcome.uploaded,
        vec![
            "gs://titanic-bkt/models/titanic_model.pkl",
            "gs://titanic-bkt/models/model_info.txt",
        ]
    );

    // Exactly two remote objects, nothing left locally
    let model_dir = fx.store_root.join(BUCKET).join("models");
    assert_eq!(files_in(&model_dir), vec!["model_info.txt", "titanic_model.pkl"]);
    assert!(files_in(&fx.output_dir).is_empty());

    let report = fs::read_to_string(model_dir.join("model_info.txt")).unwrap();
    assert!(report.starts_with("\nTitanic Survival Prediction Model\n"));
    assert!(report.contains("- Total samples: 891"));
    assert!(report.contains("- Training samples: 712"));
    assert!(report.contains("- Test samples: 179"));
    assert!(report.contains("Pclass, Sex, Age, SibSp, Parch, Fare, Embarked"));
    assert!(report.contains("- n_estimators: 20"));
    assert!(report.contains("- random_state: 42"));

    let saved = load_model(&model_dir.join("titanic_model.pkl")).unwrap();
    assert_eq!(saved.feature_names.len(), 7);
    assert_eq!(saved.forest.trees().len(), 20);
}

#[tokio::test]
async fn test_missing_dataset_halts_before_training() {
    let mut fx = fixture(50);
    fx.settings.cloud.data_path = Some("data/missing.csv".to_string());

    let err = run_training(fx.settings.clone()).await.unwrap_err();
    let message = format!("{:#}", err);

    assert!(message.contains("object not found"), "{}", message);
    assert!(files_in(&fx.output_dir).is_empty());
    assert!(files_in(&fx.store_root.join(BUCKET).join("models")).is_empty());
}

#[tokio::test]
async fn test_failed_upload_keeps_local_artifacts() {
    let mut fx = fixture(120);
    // Object names may not climb out of the bucket
    fx.settings.cloud.model_dir = Some("../elsewhere".to_string());

    let err = run_training(fx.settings.clone()).await.unwrap_err();

    assert!(format!("{:#}", err).contains("Failed to upload"));
    assert_eq!(
        files_in(&fx.output_dir),
        vec!["model_info.txt", "titanic_model.pkl"]
    );
}

#[tokio::test]
async fn test_missing_column_is_a_data_error() {
    let fx = fixture(10);
    let dataset = fx.store_root.join(BUCKET).join(DATA_PATH);
    fs::write(&dataset, "Survived,Pclass,Sex\n1,1,female\n0,3,male\n").unwrap();

    let err = run_training(fx.settings.clone()).await.unwrap_err();
    assert!(format!("{:#}", err).contains("missing expected column"));
    assert!(files_in(&fx.output_dir).is_empty());
}

#[test]
fn test_training_is_reproducible() {
    let fx = fixture(300);
    let csv = titanic_csv(300, 11);
    let table = Table::from_reader(csv.as_bytes()).unwrap();

    let a = train_and_evaluate(&table, &fx.settings.training).unwrap();
    let b = train_and_evaluate(&table, &fx.settings.training).unwrap();

    assert_eq!(a.evaluation.accuracy, b.evaluation.accuracy);
    let order = |m: &tabtrain::training::TrainedModel| {
        m.evaluation
            .importances
            .iter()
            .map(|i| i.feature.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(order(&a), order(&b));
    assert_eq!(a.train_samples, 240);
    assert_eq!(a.test_samples, 60);
}

#[test]
fn test_sparse_labels_report_only_present_classes() {
    let fx = fixture(200);
    let csv = relabel_survivors(&titanic_csv(200, 3), "5");
    let table = Table::from_reader(csv.as_bytes()).unwrap();

    let trained = train_and_evaluate(&table, &fx.settings.training).unwrap();

    assert_eq!(trained.class_names, vec!["0", "5"]);
    let labels: Vec<&str> = trained
        .evaluation
        .report
        .classes
        .iter()
        .map(|c| c.label.as_str())
        .collect();
    assert_eq!(labels, vec!["0", "5"]);
    assert_eq!(trained.forest.n_classes(), 2);
}

#[test]
fn test_huge_label_trains_without_overflow() {
    let fx = fixture(120);
    let csv = relabel_survivors(&titanic_csv(120, 5), "1e30");
    let table = Table::from_reader(csv.as_bytes()).unwrap();

    let trained = train_and_evaluate(&table, &fx.settings.training).unwrap();

    assert_eq!(trained.class_names.len(), 2);
    assert_eq!(trained.evaluation.report.classes.len(), 2);
}

#[tokio::test]
async fn test_unwritable_report_removes_model_file() {
    let fx = fixture(120);
    // A directory where the report file should go makes the write fail
    fs::create_dir_all(fx.output_dir.join("model_info.txt")).unwrap();

    let err = run_training(fx.settings.clone()).await.unwrap_err();

    assert!(format!("{:#}", err).contains("model_info.txt"), "{:#}", err);
    assert_eq!(files_in(&fx.output_dir), vec!["model_info.txt"]);
    assert!(files_in(&fx.store_root.join(BUCKET).join("models")).is_empty());
}
