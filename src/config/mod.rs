// Configuration module
// Public interface for configuration loading

mod loader;
mod settings;

pub use loader::{load_config, load_config_with, DEFAULT_CONFIG_FILE, ENV_OVERRIDES};
pub use settings::{
    CloudSettings, FeatureKind, FeatureSpec, Imputation, JobSettings, Settings, TrainingSettings,
};
