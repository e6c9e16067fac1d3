//! clustertrain: offline K-Means training for customer segmentation
//!
//! Loads a customer spreadsheet, projects it onto age, annual income and
//! spending score, fits a seeded K-Means model and persists the result.

pub mod cli;
pub mod data;
pub mod model;
pub mod persist;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{load_table, select_features, FeatureMatrix, FEATURE_COLUMNS};
pub use model::{fit_kmeans, KMeansModel, TrainingParams};
pub use persist::{load_model, save_model, ModelArtifact};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
