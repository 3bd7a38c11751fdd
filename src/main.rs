//! Diabetes Risk Predictor - Main Entry Point
//!
//! Command line front end: account signup, risk prediction, prediction
//! history and chart data.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use diabetes_predictor::{
    app::{App, HistoryView, ModelInfo, PredictionOutcome},
    analytics::{ChartData, HISTOGRAM_BUCKETS},
    config::{AppConfig, LoggingConfig},
    feature_extractor::FEATURE_NAMES,
    types::patient::PatientMetrics,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "diabetes-predictor", version, about = "Diabetes risk prediction")]
struct Cli {
    /// Configuration file (defaults to config/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Credentials {
    #[arg(long, short)]
    username: String,
    #[arg(long, env = "DIABETES_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database tables
    InitDb,
    /// Create an account
    Signup {
        #[command(flatten)]
        credentials: Credentials,
        /// Password confirmation (defaults to the password)
        #[arg(long)]
        confirm: Option<String>,
    },
    /// Predict diabetes risk for one patient
    Predict {
        #[command(flatten)]
        credentials: Credentials,
        /// Pregnancies Glucose BloodPressure SkinThickness Insulin BMI
        /// DiabetesPedigreeFunction Age
        #[arg(value_name = "VALUE", allow_negative_numbers = true, conflicts_with = "input")]
        values: Vec<f64>,
        /// Read named patient metrics from a JSON file instead
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,
        /// Do not add the result to the prediction history
        #[arg(long)]
        no_save: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show the prediction history
    History {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        json: bool,
    },
    /// Show chart data for the prediction history
    Charts {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        json: bool,
    },
    /// Show which model and scaler artifacts are in use
    ModelInfo {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let directive = format!("diabetes_predictor={}", logging.level)
        .parse::<tracing_subscriber::filter::Directive>()
        .with_context(|| format!("Invalid log level: {}", logging.level))?;
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(directive);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.init(),
        other => bail!("Unknown log format: {} (expected json or pretty)", other),
    }
    Ok(())
}

fn run(command: Command, config: &AppConfig) -> Result<()> {
    let app = App::from_config(config);
    // model-info only reads artifacts
    if !matches!(command, Command::ModelInfo { .. }) {
        app.init_db()?;
    }

    match command {
        Command::InitDb => {
            info!(path = %app.store().path().display(), "Database initialized");
            println!("Database ready at {}", app.store().path().display());
        }
        Command::Signup {
            credentials,
            confirm,
        } => {
            let confirm = confirm.as_deref().unwrap_or(&credentials.password);
            app.signup(&credentials.username, &credentials.password, confirm)?;
            println!("Account created successfully! Please login.");
        }
        Command::Predict {
            credentials,
            values,
            input,
            no_save,
            json,
        } => {
            let metrics = input.as_deref().map(read_metrics).transpose()?;
            if metrics.is_none() {
                check_form_values(&values)?;
            }
            let session = app.login(&credentials.username, &credentials.password)?;
            let outcome = match &metrics {
                Some(metrics) => app.predict_metrics(&session, metrics, !no_save)?,
                None => app.predict(&session, &values, !no_save)?,
            };
            if json {
                print_json(&outcome)?;
            } else {
                print_prediction(&outcome);
            }
            app.logout(session);
        }
        Command::History { credentials, json } => {
            let session = app.login(&credentials.username, &credentials.password)?;
            let history = app.history(&session)?;
            if json {
                print_json(&history)?;
            } else {
                print_history(&history);
            }
            app.logout(session);
        }
        Command::Charts { credentials, json } => {
            let session = app.login(&credentials.username, &credentials.password)?;
            let charts = app.charts(&session)?;
            if json {
                print_json(&charts)?;
            } else {
                print_charts(&charts);
            }
            app.logout(session);
        }
        Command::ModelInfo { json } => {
            let model_info = app.model_info()?;
            if json {
                print_json(&model_info)?;
            } else {
                print_model_info(&model_info);
            }
        }
    }
    Ok(())
}

/// Input form rule: every value is a finite, non-negative number
fn check_form_values(values: &[f64]) -> Result<()> {
    if let Some(i) = values.iter().position(|v| !v.is_finite() || *v < 0.0) {
        let name = FEATURE_NAMES.get(i).copied().unwrap_or("value");
        bail!("{} must be a non-negative number", name);
    }
    Ok(())
}

fn read_metrics(path: &Path) -> Result<PatientMetrics> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let metrics: PatientMetrics = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse patient metrics from {}", path.display()))?;
    if let Some(field) = metrics.first_invalid_field() {
        bail!("{} must be a non-negative number", field);
    }
    Ok(metrics)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_prediction(outcome: &PredictionOutcome) {
    let prediction = &outcome.prediction;
    println!("Prediction: {}", prediction.text);
    match prediction.proba {
        Some(proba) => println!("Risk Probability: {:.1}%", proba),
        None => println!("Risk Probability: not available for this model"),
    }
    for reason in &prediction.degradations {
        println!("Note: {}", reason);
    }
    if outcome.record_id.is_some() {
        println!("Saved to history.");
    }
    if let Some(e) = &outcome.save_error {
        println!("Warning: prediction was not saved to history: {}", e);
    }
}

fn print_history(history: &HistoryView) {
    if history.records.is_empty() {
        println!("No predictions yet. Make your first prediction!");
        return;
    }

    println!(
        "{:<20} {:>6} {:>8} {:>4} {:>4} {:>8} {:>6} {:>6} {:>4}  {:<10} {:>8}",
        "Date", "Preg", "Glucose", "BP", "Skin", "Insulin", "BMI", "DPF", "Age", "Risk", "Prob"
    );
    for record in &history.records {
        let f = record.features.as_slice();
        println!(
            "{:<20} {:>6} {:>8} {:>4} {:>4} {:>8} {:>6.1} {:>6.3} {:>4}  {:<10} {:>8}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            f[0],
            f[1],
            f[2],
            f[3],
            f[4],
            f[5],
            f[6],
            f[7],
            record.diagnosis.risk_label(),
            record.probability_display()
        );
    }

    let summary = &history.summary;
    println!();
    println!("Total Predictions: {}", summary.total);
    println!("High Risk Results: {}", summary.high_risk);
    println!("Low Risk Results:  {}", summary.low_risk);
}

fn print_charts(charts: &ChartData) {
    if charts.is_empty() {
        println!("No data to visualize yet.");
        return;
    }

    println!("Risk distribution:");
    for share in &charts.risk_distribution {
        println!("  {:<10} {:>4} ({:.1}%)", share.label, share.count, share.percent);
    }

    if !charts.probability_trend.is_empty() {
        println!("\nRisk probability over time:");
        for point in &charts.probability_trend {
            println!("  {}  {:>5.1}%", point.at.format("%Y-%m-%d %H:%M"), point.probability);
        }
    }

    println!("\nHealth metrics vs risk probability:");
    for ((glucose, bmi), age) in charts
        .glucose_vs_probability
        .iter()
        .zip(&charts.bmi_vs_probability)
        .zip(&charts.age_vs_probability)
    {
        println!(
            "  glucose {:>6.1}  bmi {:>5.1}  age {:>4}  -> {:>5.1}% ({})",
            glucose.value,
            bmi.value,
            age.value,
            glucose.probability,
            glucose.diagnosis.risk_label()
        );
    }

    println!("\nRisk probability distribution:");
    let width = 100 / HISTOGRAM_BUCKETS;
    for (i, count) in charts.probability_histogram.iter().enumerate() {
        println!(
            "  {:>3}-{:<3}% {:>4} {}",
            i * width,
            (i + 1) * width,
            count,
            "#".repeat(*count as usize)
        );
    }
}

fn print_model_info(model_info: &ModelInfo) {
    println!("Model:         {}", model_info.model_path.display());
    println!("Kind:          {}", model_info.model_kind);
    println!("Probabilities: {}", if model_info.has_probabilities { "yes" } else { "no" });
    match (&model_info.scaler_path, &model_info.scaler_kind) {
        (Some(path), Some(kind)) => println!("Scaler:        {} ({})", path.display(), kind),
        _ => println!("Scaler:        none (raw features)"),
    }
    println!("Features:      {}", model_info.feature_names.join(", "));
}
