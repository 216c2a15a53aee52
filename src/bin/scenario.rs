use clap::{Parser, Subcommand};
use scenario_engine::dataset::FileDatasetSource;
use scenario_engine::keyword::DirectoryKeywordLibrary;
use scenario_engine::{Engine, EngineConfig, Error, InternalResult, Scenario};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scenario file and print its report as JSON
    Run {
        /// Scenario file (.json, .yaml or .yml)
        file: PathBuf,

        /// Engine config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override a scenario variable, `name=value`; values parse as JSON
        /// when they can
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, Value)>,

        /// Keep going after a failing top-level step or row
        #[arg(long)]
        continue_on_error: bool,

        /// Directory of keyword files resolved on demand
        #[arg(short, long)]
        keywords: Option<PathBuf>,
    },
}

fn parse_var(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

async fn run(cli: Cli) -> InternalResult<bool> {
    let Command::Run {
        file,
        config,
        vars,
        continue_on_error,
        keywords,
    } = cli.command;

    let config = match config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    debug!("config: {:?}", config);

    let mut scenario = Scenario::from_file(&file)?;
    scenario.continue_on_error |= continue_on_error;
    for (name, value) in vars {
        scenario.variables.insert(name, value);
    }

    let base_dir = file
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();
    let mut builder = Engine::builder()
        .config(config)
        .dataset_source(Arc::new(FileDatasetSource::with_base_dir(base_dir)));
    if let Some(dir) = keywords {
        builder = builder.library(Arc::new(DirectoryKeywordLibrary::new(dir)));
    }
    let engine = builder.build();

    info!(scenario = %scenario.name, "running scenario");
    let report = engine.run(&scenario).await?;
    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|e| Error::internal(format!("Failed to render report: {}", e)))?;
    println!("{}", rendered);
    Ok(report.success)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
