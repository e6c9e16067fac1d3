//! Command-line interface definitions and argument parsing

use crate::model::TrainingParams;
use clap::Parser;

/// Train a K-Means model on customer data and save it to disk
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input spreadsheet (xlsx, xls, ods or csv)
    #[arg(short, long, default_value = "customers_with_clusters.xlsx")]
    pub input: String,

    /// Worksheet to read (default: first sheet)
    #[arg(long)]
    pub sheet: Option<String>,

    /// Path of the model artifact to write, or to read in prediction mode
    #[arg(short, long, default_value = "kmeans_model.pkl")]
    pub output: String,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value = "3")]
    pub clusters: usize,

    /// Seed for centroid initialisation
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Number of K-Means initialisations
    #[arg(long, default_value = "10")]
    pub n_runs: usize,

    /// Prediction mode: provide Age,Income,Score values as comma-separated string
    /// Example: --predict "35,60,50"
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn training_params(&self) -> TrainingParams {
        TrainingParams {
            n_clusters: self.clusters,
            seed: self.seed,
            max_n_iterations: self.max_iters,
            tolerance: self.tolerance,
            n_runs: self.n_runs,
        }
    }

    /// Parse feature values from the predict string
    /// Expected format: "age,income,score"
    pub fn parse_predict_values(&self) -> crate::Result<Option<Vec<f64>>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let values = predict_str
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .map_err(|_| anyhow::anyhow!("Invalid predict value: {}", part))
            })
            .collect::<crate::Result<Vec<f64>>>()?;

        if values.len() != 3 {
            anyhow::bail!("Predict values must be in format 'age,income,score'");
        }

        Ok(Some(values))
    }
}
