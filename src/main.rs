//! Fraud screening - command line entry point
//!
//! Scores single transactions, evaluates the model against a labeled
//! dataset, prints the active feature spec, or runs the NATS service.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fraud_screening::{
    config::{AppConfig, LoggingConfig},
    evaluation::{self, LabeledDataset, DEFAULT_LABEL_COLUMN},
    features::{FeatureSpec, FieldKind},
    models::inference::InferenceEngine,
    service,
    types::input::RawInput,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single transaction
    Predict {
        /// JSON object mapping field name to value
        #[arg(long, conflicts_with = "field")]
        input: Option<PathBuf>,
        /// Field value as NAME=VALUE (repeatable)
        #[arg(long, value_name = "NAME=VALUE")]
        field: Vec<String>,
    },
    /// Evaluate the model against a labeled, encoded CSV dataset
    Evaluate {
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value = DEFAULT_LABEL_COLUMN)]
        label_column: String,
    },
    /// Print the active feature spec
    Spec,
    /// Run the NATS scoring service
    Serve,
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("fraud_screening={}", logging.level).parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::resolve(cli.config.as_deref())?;
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Predict { input, field } => {
            let raw = read_input(input, &field)?;
            let engine = InferenceEngine::new(&config)?;
            let scored = engine.score(&raw)?;

            for warning in &scored.warnings {
                eprintln!("warning: {}", warning);
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "prediction": scored.prediction,
                    "warnings": scored.warnings,
                }))?
            );
        }
        Commands::Evaluate { data, label_column } => {
            let engine = InferenceEngine::new(&config)?;
            let dataset = LabeledDataset::from_csv(&data, engine.spec(), &label_column)?;
            info!(rows = dataset.len(), path = %data.display(), "Dataset loaded");

            let report = evaluation::evaluate(&engine, &dataset)?;
            print!("{}", report);
        }
        Commands::Spec => {
            let spec = match &config.features.spec_path {
                Some(path) => FeatureSpec::load(path)?,
                None => FeatureSpec::fraud_default(),
            };
            print_spec(&spec);
        }
        Commands::Serve => {
            info!("Starting fraud screening service");
            let engine = Arc::new(InferenceEngine::new(&config)?);
            service::run(&config, engine).await?;
        }
    }

    Ok(())
}

fn read_input(path: Option<PathBuf>, fields: &[String]) -> Result<RawInput> {
    if let Some(path) = path {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input {}", path.display()))?;
        return serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse input {}", path.display()));
    }

    if fields.is_empty() {
        bail!("Provide --input FILE or at least one --field NAME=VALUE");
    }

    fields
        .iter()
        .map(|assignment| {
            RawInput::parse_assignment(assignment)
                .with_context(|| format!("Expected NAME=VALUE, got `{}`", assignment))
        })
        .collect()
}

fn print_spec(spec: &FeatureSpec) {
    println!(
        "Feature spec v{} (layout {:#010x}, {} fields)",
        spec.version,
        spec.layout_hash(),
        spec.len()
    );
    for (idx, field) in spec.fields.iter().enumerate() {
        let kind = match &field.kind {
            FieldKind::Numeric => "numeric".to_string(),
            FieldKind::BoundedNumeric { min, max } => format!("bounded [{}, {}]", min, max),
            FieldKind::Categorical { codes } => {
                let table: Vec<String> = codes
                    .iter()
                    .map(|c| format!("{}={}", c.label, c.code))
                    .collect();
                format!("categorical {{{}}}", table.join(", "))
            }
        };
        println!("{:>2}  {:<30} {:<38} {}", idx, field.name, field.label, kind);
    }
}
