// Tabtrain - tabular model training and Vertex AI job submission
// Library exports

pub mod config;
pub mod errors;
pub mod gcp; // Credential discovery and access tokens
pub mod job; // Remote custom job submission
pub mod storage; // Object store client (GCS or local directory)
pub mod training; // Dataset → model → report pipeline
