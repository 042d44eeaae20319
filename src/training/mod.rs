// Training module - tabular classification pipeline

pub mod dataset;
pub mod evaluate;
pub mod forest;
pub mod pipeline;
pub mod preprocess;
pub mod report;
pub mod split;

pub use dataset::{DataError, Table};
pub use evaluate::{evaluate, ClassificationReport, Evaluation, FeatureImportance};
pub use forest::{load_model, save_model, ForestParams, RandomForest, SavedModel};
pub use pipeline::{
    log_section, run_training, train_and_evaluate, TrainedModel, TrainingOutcome,
    TrainingPipeline,
};
pub use preprocess::{preprocess, FeatureMatrix};
pub use report::ModelReport;
pub use split::{train_test_split, SplitIndices};
