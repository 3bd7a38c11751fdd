//! Demo Patient Generator
//!
//! Generates random patients from the distributions the reference model was
//! trained on and runs them through the inference engine.

use clap::Parser;
use diabetes_predictor::{
    config::AppConfig,
    models::inference::InferenceEngine,
    synthetic::{reference_risk, PatientGenerator},
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "demo-patients", about = "Run random demo patients through the model")]
struct Cli {
    /// Configuration file (defaults to config/config.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of patients to generate
    #[arg(long, short, default_value_t = 20)]
    count: usize,
    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("demo_patients=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    let engine = InferenceEngine::from_config(&config);
    let mut generator = PatientGenerator::new(cli.seed)?;

    info!(
        count = cli.count,
        model = %config.models.model_path,
        "Generating demo patients"
    );

    println!(
        "{:>4}  {:<52}  {:<12} {:>8}  {:<10}",
        "#", "features", "prediction", "prob", "reference"
    );

    let mut positive = 0;
    let mut agree = 0;
    let mut failed = 0;

    for i in 0..cli.count {
        let raw = generator.form_entry();
        match engine.predict(&raw) {
            Ok(prediction) => {
                let reference = reference_risk(&prediction.features);
                if prediction.label == 1 {
                    positive += 1;
                }
                if (prediction.label == 1) == reference {
                    agree += 1;
                }
                let proba = prediction
                    .proba
                    .map(|p| format!("{:.1}%", p))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "{:>4}  {:<52}  {:<12} {:>8}  {:<10}",
                    i + 1,
                    prediction.features.to_string(),
                    prediction.text,
                    proba,
                    if reference { "high" } else { "low" }
                );
            }
            Err(e) => {
                failed += 1;
                warn!(patient = i + 1, error = %e, "Prediction failed");
            }
        }
    }

    let scored = cli.count - failed;
    info!(
        scored = scored,
        positive = positive,
        failed = failed,
        "Completed demo run"
    );
    if scored > 0 {
        println!(
            "\n{} patients scored, {} predicted Diabetes, {:.1}% agree with the labeling rule",
            scored,
            positive,
            agree as f64 / scored as f64 * 100.0
        );
    } else {
        println!("\nNo patients could be scored");
    }

    Ok(())
}
