//! SST Pipeline Replay
//!
//! Feeds sensor readings through the five-stage pipeline and prints one
//! `WorkflowResult` per reading as a JSON line on stdout. Logs go to stderr.
//!
//! Readings come from a JSON-lines file (or stdin with `-`), or from a
//! synthetic workshop simulation.
//!
//! # Usage
//! ```bash
//! ./sst-replay --input readings.jsonl --config sst_pipeline.toml
//! ./sst-replay --simulate 500 --seed 7 --sled-history ./history.db
//! ```

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use sst_pipeline::clock::SystemClock;
use sst_pipeline::notifier::TracingNotifier;
use sst_pipeline::storage::{HistoryStore, InMemoryHistoryStore, SledHistoryStore};
use sst_pipeline::{Orchestrator, PipelineConfig, RawReading};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "sst-replay")]
#[command(about = "Replay or simulate workplace sensor readings through the SST pipeline")]
#[command(version)]
struct Args {
    /// Pipeline configuration file (falls back to SST_CONFIG, then ./sst_pipeline.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// JSON-lines file of readings, `-` for stdin
    #[arg(short, long, value_name = "PATH", conflicts_with = "simulate")]
    input: Option<String>,

    /// Generate this many synthetic readings instead of reading input
    #[arg(short, long, value_name = "N")]
    simulate: Option<usize>,

    /// Random seed for reproducible simulation
    #[arg(long)]
    seed: Option<u64>,

    /// Keep processing stages whose inputs are available after a failure
    #[arg(long)]
    continue_on_failure: bool,

    /// Persist per-sensor history in a sled database at this path
    #[arg(long, value_name = "PATH")]
    sled_history: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Print only the metrics summary, not each workflow
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================================
// Simulation
// ============================================================================

/// (sensor_type, unit, nominal, std_dev, spike)
const SIMULATED_SENSORS: &[(&str, &str, f64, f64, f64)] = &[
    ("temperature", "°C", 22.0, 0.8, 19.0),
    ("humidity", "%", 45.0, 3.0, 30.0),
    ("noise", "dB", 72.0, 2.5, 25.0),
    ("co2", "ppm", 650.0, 40.0, 900.0),
    ("co", "ppm", 4.0, 1.0, 60.0),
    ("vibration", "m/s²", 0.25, 0.05, 0.9),
    ("illuminance", "lux", 450.0, 25.0, -380.0),
];

const SIMULATED_LOCATIONS: &[&str] = &["Atelier A", "Atelier B", "Entrepot"];

/// Chance that a simulated reading is an excursion
const SPIKE_PROBABILITY: f64 = 0.04;

fn simulate(count: usize, seed: Option<u64>) -> Result<Vec<RawReading>> {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let start = Utc::now() - Duration::seconds(count as i64);

    let mut readings = Vec::with_capacity(count);
    for i in 0..count {
        let (sensor_type, unit, nominal, std_dev, spike) =
            SIMULATED_SENSORS[i % SIMULATED_SENSORS.len()];
        let location = SIMULATED_LOCATIONS[(i / SIMULATED_SENSORS.len()) % SIMULATED_LOCATIONS.len()];
        let noise = Normal::new(nominal, std_dev)
            .with_context(|| format!("invalid noise model for {sensor_type}"))?;

        let mut value = noise.sample(&mut rng);
        if rng.gen_bool(SPIKE_PROBABILITY) {
            value += spike;
        }

        readings.push(
            RawReading::new(format!("sim-{sensor_type}-{location}"), sensor_type, value, unit, location)
                .at(start + Duration::seconds(i as i64)),
        );
    }
    Ok(readings)
}

// ============================================================================
// Input
// ============================================================================

fn read_readings(input: &str) -> Result<Vec<RawReading>> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = std::fs::File::open(input).with_context(|| format!("opening {input}"))?;
        Box::new(BufReader::new(file))
    };

    let mut readings = Vec::new();
    let mut skipped = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading line {} of {input}", line_no + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<RawReading>(trimmed) {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                skipped += 1;
                warn!(line = line_no + 1, error = %e, "Skipping malformed reading");
            }
        }
    }

    info!(input = %input, readings = readings.len(), skipped, "Input loaded");
    Ok(readings)
}

// ============================================================================
// Main
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("loading pipeline config from {}", path.display()))?,
        None => PipelineConfig::load(),
    };
    if args.continue_on_failure {
        config.orchestrator.continue_on_failure = true;
    }

    let sled_store = match &args.sled_history {
        Some(path) => Some(Arc::new(
            SledHistoryStore::open(path)
                .with_context(|| format!("opening sled history at {}", path.display()))?,
        )),
        None => None,
    };
    let history: Arc<dyn HistoryStore> = match &sled_store {
        Some(store) => Arc::clone(store) as Arc<dyn HistoryStore>,
        None => Arc::new(InMemoryHistoryStore::new()),
    };

    let mut orchestrator = Orchestrator::with_components(
        &config,
        history,
        Arc::new(TracingNotifier),
        Arc::new(SystemClock),
    );

    let readings = match (&args.input, args.simulate) {
        (Some(input), _) => read_readings(input)?,
        (None, Some(count)) => simulate(count, args.seed)?,
        (None, None) => read_readings("-")?,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for reading in &readings {
        let result = orchestrator.process(reading);
        if !args.quiet {
            serde_json::to_writer(&mut out, &result).context("writing workflow result")?;
            writeln!(out).context("writing workflow result")?;
        }
    }
    out.flush().context("flushing stdout")?;

    if let Some(store) = &sled_store {
        store.flush().context("flushing sled history")?;
    }

    info!("{}", orchestrator.metrics());
    for line in orchestrator.stage_stats().to_string().lines() {
        info!("{line}");
    }
    Ok(())
}
