//! clustertrain: train a K-Means model on customer data and save it
//!
//! Main entrypoint: load, select features, fit, persist. With `--predict`
//! it loads a saved model instead and assigns a single customer.

use anyhow::Result;
use clap::Parser;
use clustertrain::persist::saved_message;
use clustertrain::{
    fit_kmeans, load_model, load_table, save_model, select_features, Args, FEATURE_COLUMNS,
};
use env_logger::Env;
use log::info;
use std::path::Path;
use std::time::Instant;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    if let Some(values) = args.parse_predict_values()? {
        run_prediction_mode(&args, &values)
    } else {
        run_training(&args)
    }
}

/// Run the training pipeline
fn run_training(args: &Args) -> Result<()> {
    let start_time = Instant::now();

    // Step 1: Load the spreadsheet
    let table = load_table(Path::new(&args.input), args.sheet.as_deref())?;

    // Step 2: Select features
    let features = select_features(&table, &FEATURE_COLUMNS)?;
    if args.verbose {
        println!(
            "Data loaded: {} customers from {}",
            features.n_samples(),
            args.input
        );
    }

    // Step 3: Fit K-Means
    let params = args.training_params();
    let model = fit_kmeans(&features, &params)?;

    if args.verbose {
        println!("\n=== Cluster Statistics ===");
        let total = features.n_samples();
        for (i, &size) in model.cluster_sizes().iter().enumerate() {
            let percentage = (size as f64 / total as f64) * 100.0;
            println!("Cluster {}: {} customers ({:.1}%)", i, size, percentage);
        }
        let silhouette_score = model.compute_silhouette_sample(&features.records, 100.min(total));
        println!("Silhouette score (sample): {:.3}", silhouette_score);
        println!("Within-cluster sum of squares: {:.2}\n", model.inertia);
    }

    // Step 4: Persist
    save_model(&model.to_artifact(), Path::new(&args.output))?;

    info!(
        "Training finished in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    println!("{}", saved_message(&args.output));

    Ok(())
}

/// Assign a single customer using a previously saved model
fn run_prediction_mode(args: &Args, values: &[f64]) -> Result<()> {
    let artifact = load_model(Path::new(&args.output))?;
    let cluster = artifact.predict(values)?;

    println!("✓ Predicted Cluster: {}", cluster);

    let sizes = artifact.cluster_sizes();
    let total: usize = sizes.iter().sum();
    if total > 0 {
        println!(
            "  Size: {} customers ({:.1}% of training data)",
            sizes[cluster],
            sizes[cluster] as f64 / total as f64 * 100.0
        );
    }

    let centroid = artifact.centroids[cluster]
        .iter()
        .zip(&artifact.feature_names)
        .map(|(value, name)| format!("{}={:.2}", name, value))
        .collect::<Vec<_>>()
        .join(", ");
    println!("  Centroid: {}", centroid);

    Ok(())
}
