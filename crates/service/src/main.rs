//! RUL Service - Command-Line Entry Point
//!
//! Logs go to stderr; results are printed to stdout as JSON.

use anyhow::{bail, Context, Result};
use clap::Parser;
use feature_engine::RawPayload;
use inference_engine::PredictRequest;
use serde::Serialize;
use service::{build_service, init_logging, ServiceConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rul-service")]
#[command(about = "Remaining useful life estimation for turbofan telemetry")]
#[command(version)]
struct CliArgs {
    /// TOML configuration file
    #[arg(long, short, global = true, env = "RUL_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Loaded artifacts, architecture and feature layout
    Info,
    /// Summary of the historical dataset
    Dataset,
    /// Known units, optionally with a prediction for each
    Units {
        #[arg(long)]
        estimate: bool,
    },
    /// Predict RUL for one unit
    Predict {
        #[arg(long)]
        unit: u32,
        /// Only use history recorded at or before this cycle
        #[arg(long)]
        as_of: Option<u32>,
        /// JSON file with a raw sensor reading
        #[arg(long, value_name = "FILE")]
        payload: Option<PathBuf>,
        /// Ignore recorded history and predict from the payload
        #[arg(long)]
        no_history: bool,
        /// Fail if the prediction takes longer than this
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },
    /// Replay a unit's history cycle by cycle
    Backtest {
        #[arg(long)]
        unit: u32,
        #[arg(long, default_value = "1")]
        start: u32,
        #[arg(long, default_value = "50")]
        count: u32,
    },
    /// Report on the model input built for a unit
    Inspect {
        #[arg(long)]
        unit: u32,
        #[arg(long)]
        as_of: Option<u32>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config = ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging)?;

    info!("=== RUL Service v{} ===", env!("CARGO_PKG_VERSION"));
    let service = build_service(&config).context("Failed to initialize inference service")?;

    match args.command {
        Command::Info => print_json(&service.info())?,
        Command::Dataset => match service.index() {
            Some(index) => print_json(&index.summary())?,
            None => bail!("No dataset configured (set dataset.path or RUL__DATASET__PATH)"),
        },
        Command::Units { estimate } => {
            if estimate {
                print_json(&service.estimate_units().await)?
            } else {
                print_json(&service.list_units())?
            }
        }
        Command::Predict {
            unit,
            as_of,
            payload,
            no_history,
            timeout_ms,
        } => {
            let sensor_data = match payload {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read payload {}", path.display()))?;
                    serde_json::from_str::<RawPayload>(&text).context("Malformed payload")?
                }
                None => RawPayload::default(),
            };
            let request = PredictRequest {
                unit_number: unit,
                use_real_data: !no_history,
                sensor_data,
                as_of_cycle: as_of,
            };

            let result = match timeout_ms {
                Some(ms) => service.predict_within(&request, Duration::from_millis(ms)).await?,
                None => service.predict(&request).await?,
            };
            print_json(&result)?
        }
        Command::Backtest { unit, start, count } => {
            print_json(&service.backtest(unit, start, count).await?)?
        }
        Command::Inspect { unit, as_of } => print_json(&service.inspect_unit(unit, as_of)?)?,
    }

    Ok(())
}
