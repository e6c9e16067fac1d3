//! Model artifact persistence (magic header + postcard body)

use crate::model::{cluster_sizes, nearest_centroid, TrainingParams};
use anyhow::{bail, Context};
use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File magic identifying a model artifact
pub const MAGIC: [u8; 4] = *b"KMMD";
/// Current artifact format version
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;

/// Serializable snapshot of a fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Feature column names, in centroid coordinate order
    pub feature_names: Vec<String>,
    /// Parameters the model was fitted with
    pub params: TrainingParams,
    /// One centroid per cluster
    pub centroids: Vec<Vec<f64>>,
    /// Training row labels, in input row order
    pub labels: Vec<usize>,
    /// Within-cluster sum of squares
    pub inertia: f64,
}

impl ModelArtifact {
    pub fn n_clusters(&self) -> usize {
        self.centroids.len()
    }

    pub fn centroid_matrix(&self) -> crate::Result<Array2<f64>> {
        let n_features = self.feature_names.len();
        let flat: Vec<f64> = self.centroids.iter().flatten().copied().collect();
        Array2::from_shape_vec((self.centroids.len(), n_features), flat)
            .context("centroids do not match the feature count")
    }

    /// Predict cluster for a new point given in feature order
    pub fn predict(&self, features: &[f64]) -> crate::Result<usize> {
        nearest_centroid(self.centroid_matrix()?.view(), features)
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        cluster_sizes(self.labels.iter().copied(), self.n_clusters())
    }
}

/// Serialize the artifact to bytes
pub fn encode(artifact: &ModelArtifact) -> crate::Result<Vec<u8>> {
    let body = postcard::to_stdvec(artifact)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Deserialize an artifact, checking magic and version
pub fn decode(bytes: &[u8]) -> crate::Result<ModelArtifact> {
    if bytes.len() < HEADER_LEN || bytes[..MAGIC.len()] != MAGIC {
        bail!("Not a model artifact (bad magic)");
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        bail!(
            "Unsupported artifact version {} (expected {})",
            version,
            FORMAT_VERSION
        );
    }

    let artifact: ModelArtifact =
        postcard::from_bytes(&bytes[HEADER_LEN..]).context("corrupt model artifact")?;
    Ok(artifact)
}

/// Write the artifact to `path`, replacing any existing file
pub fn save_model(artifact: &ModelArtifact, path: &Path) -> crate::Result<()> {
    let bytes = encode(artifact)?;
    fs::write(path, &bytes)
        .with_context(|| format!("failed to write model to {}", path.display()))?;

    debug!("Wrote {} bytes", bytes.len());
    info!("Model saved to {}", path.display());
    Ok(())
}

/// Confirmation line printed once a model has been saved
pub fn saved_message(path: &str) -> String {
    format!("✅ Model trained and saved as '{}'", path)
}

/// Read an artifact written by [`save_model`]
pub fn load_model(path: &Path) -> crate::Result<ModelArtifact> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read model from {}", path.display()))?;
    decode(&bytes).with_context(|| format!("failed to load model from {}", path.display()))
}
