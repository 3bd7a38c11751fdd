//! Model Trainer
//!
//! Trains a random forest on synthetic patients and writes the model and
//! scaler artifacts the predictor loads.

use anyhow::{bail, Context};
use clap::Parser;
use diabetes_predictor::{
    config::AppConfig,
    models::loader::ArtifactFormat,
    training::{train, TrainingConfig},
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "train-model", about = "Train the diabetes risk model on synthetic data")]
struct Cli {
    /// Configuration file (defaults to config/config.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of synthetic patients
    #[arg(long, default_value_t = 1000)]
    samples: usize,
    /// Share of patients held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,
    /// Trees in the forest
    #[arg(long, default_value_t = 100)]
    trees: usize,
    /// Maximum tree depth
    #[arg(long, default_value_t = 10)]
    max_depth: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Model output (defaults to the configured model path)
    #[arg(long)]
    model_out: Option<PathBuf>,
    /// Scaler output (defaults to the first configured scaler path)
    #[arg(long)]
    scaler_out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("train_model=info".parse()?)
                .add_directive("diabetes_predictor=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref())?;

    let model_out = cli
        .model_out
        .unwrap_or_else(|| PathBuf::from(&config.models.model_path));
    let scaler_out = match cli.scaler_out {
        Some(path) => path,
        None => config
            .models
            .scaler_paths
            .first()
            .map(PathBuf::from)
            .context("no scaler path configured; pass --scaler-out")?,
    };
    for path in [&model_out, &scaler_out] {
        if ArtifactFormat::from_path(path) != ArtifactFormat::Json {
            bail!("{} must be a .json path", path.display());
        }
    }

    let settings = TrainingConfig {
        samples: cli.samples,
        test_fraction: cli.test_fraction,
        trees: cli.trees,
        max_depth: Some(cli.max_depth),
        seed: cli.seed,
    };
    info!(
        samples = settings.samples,
        trees = settings.trees,
        seed = settings.seed,
        "Training model"
    );

    let trained = train(&settings)?;
    let report = &trained.report;

    println!("Dataset shape: ({}, 9)", report.samples);
    println!(
        "Diabetes cases: {}/{} ({:.1}%)",
        report.positives,
        report.samples,
        report.positives as f64 / report.samples.max(1) as f64 * 100.0
    );
    println!("Training accuracy: {:.3}", report.train_accuracy);
    match report.test_accuracy {
        Some(accuracy) => println!("Test accuracy: {:.3}", accuracy),
        None => println!("Test accuracy: n/a (no held-out patients)"),
    }

    trained.write(&model_out, &scaler_out)?;
    println!("Model saved to {}", model_out.display());
    println!("Scaler saved to {}", scaler_out.display());

    Ok(())
}
