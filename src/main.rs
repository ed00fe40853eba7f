//! Building Health Agent CLI
//!
//! Streaming anomaly detection for building sensor data.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};

use buildhealth_agent::{
    config::Config,
    core::{FeatureWindow, Sample},
    engine::ScoringEngine,
    metrics::MonitorMetrics,
    model::{ForestParams, ModelStore, StoreError},
    server::{self, ServerConfig, ServerState},
    simulator::{SampleSimulator, SimulatorProfile},
    trainer::{ThresholdPolicy, TrainError, TrainingConfig, TrainingJob},
    VERSION,
};

#[derive(Parser)]
#[command(name = "buildhealth")]
#[command(version = VERSION)]
#[command(about = "Streaming anomaly detection for building sensor data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion and monitoring server
    Serve {
        /// Port to bind (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Feed the engine from the built-in simulator
        #[arg(long)]
        simulate: bool,

        /// Interval between simulated samples in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Probability that a simulated sample is anomalous
        #[arg(long, default_value = "0.15")]
        anomaly_probability: f64,
    },

    /// Train a model and install it (exit code 2 = insufficient data)
    Train {
        /// Number of synthetic normal samples to train on when no input
        /// file is given
        #[arg(long, default_value = "1000")]
        synthetic: usize,

        /// JSONL file of historical samples to train on instead
        #[arg(long)]
        input: Option<PathBuf>,

        /// RNG seed for reproducible training
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Number of trees in the forest
        #[arg(long, default_value = "100")]
        estimators: usize,

        /// Subsample size per tree
        #[arg(long, default_value = "256")]
        max_samples: usize,

        /// Contamination fraction for threshold selection
        #[arg(long, default_value = "0.01")]
        contamination: f64,

        /// Minimum usable samples in the batch
        #[arg(long, default_value = "32")]
        min_samples: usize,
    },

    /// Send simulated sensor data to a running agent
    Simulate {
        /// Ingestion endpoint of the running agent
        #[arg(long, default_value = "http://127.0.0.1:5000/sensor_data")]
        url: String,

        /// Interval between samples in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Probability of an anomalous sample
        #[arg(long, default_value = "0.15")]
        anomaly_probability: f64,

        /// Stop after this many samples (runs until Ctrl+C if omitted)
        #[arg(long)]
        count: Option<u64>,

        /// RNG seed
        #[arg(long, default_value = "7")]
        seed: u64,
    },

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Serve {
            port,
            simulate,
            interval_ms,
            anomaly_probability,
        } => cmd_serve(port, simulate, interval_ms, anomaly_probability),
        Commands::Train {
            synthetic,
            input,
            seed,
            estimators,
            max_samples,
            contamination,
            min_samples,
        } => cmd_train(
            synthetic,
            input,
            seed,
            estimators,
            max_samples,
            contamination,
            min_samples,
        ),
        Commands::Simulate {
            url,
            interval_ms,
            anomaly_probability,
            count,
            seed,
        } => cmd_simulate(&url, interval_ms, anomaly_probability, count, seed),
        Commands::Config => cmd_config(),
    };

    std::process::exit(code);
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn cmd_serve(port: Option<u16>, simulate: bool, interval_ms: u64, anomaly_probability: f64) -> i32 {
    init_tracing();
    println!("Building Health Agent v{VERSION}");
    println!();

    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: could not create directories: {e}");
    }

    let schema = config.feature_schema();
    let metrics = Arc::new(MonitorMetrics::new());
    let store = Arc::new(ModelStore::new(config.model_path.clone()));

    match store.restore() {
        Ok(version) => {
            metrics.model_version.set(version as i64);
            println!("Loaded model v{version} from {}", config.model_path.display());
        }
        Err(StoreError::NotFound(path)) => {
            println!(
                "No model artifact at {} - starting in degraded mode.",
                path.display()
            );
            println!("Run `buildhealth train` to fit and install one.");
        }
        Err(e) => {
            eprintln!("Warning: could not restore model ({e}) - starting in degraded mode.");
        }
    }

    let engine = Arc::new(ScoringEngine::with_archive_capacity(
        FeatureWindow::new(schema.clone(), config.window_size),
        store.clone(),
        metrics.clone(),
        config.archive_capacity,
    ));
    let trainer = Arc::new(TrainingJob::new(
        store,
        schema.clone(),
        TrainingConfig {
            window_size: config.window_size,
            ..TrainingConfig::default()
        },
    ));
    let cancel_training = trainer.cancel_flag();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: could not start runtime: {e}");
            return 1;
        }
    };

    let server_config = ServerConfig::new(port.unwrap_or(config.port));
    let state = ServerState {
        engine: engine.clone(),
        trainer,
        metrics,
        schema,
    };

    let (addr, shutdown_tx) = match runtime.block_on(server::run(server_config, state)) {
        Ok(handles) => handles,
        Err(e) => {
            eprintln!("Error: could not start server: {e}");
            return 1;
        }
    };
    println!("Listening on http://{addr}");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        }) {
            eprintln!("Warning: could not install Ctrl+C handler: {e}");
        }
    }

    // Optional in-process producer: simulator -> single-writer queue -> engine.
    // The dedicated ingest thread is the only writer into the feature window,
    // preserving temporal ordering of the rolling statistic.
    let mut workers = Vec::new();
    if simulate {
        println!("Simulator enabled ({interval_ms}ms interval, {anomaly_probability} anomaly probability)");
        let (tx, rx) = crossbeam_channel::bounded::<Sample>(256);

        let producer_stop = stop.clone();
        workers.push(thread::spawn(move || {
            let mut simulator = SampleSimulator::new(
                SimulatorProfile::building_defaults(),
                anomaly_probability,
                rand::random(),
            );
            while !producer_stop.load(Ordering::SeqCst) {
                let (sample, _) = simulator.next_sample();
                if tx.send(sample).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(interval_ms));
            }
        }));

        let ingest_engine = engine;
        workers.push(thread::spawn(move || {
            for sample in rx {
                if let Err(e) = ingest_engine.ingest(sample) {
                    tracing::warn!("simulated sample dropped: {e}");
                }
            }
        }));
    }

    println!();
    println!("Press Ctrl+C to stop");

    while !stop.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    println!("\nShutting down...");
    cancel_training.store(true, Ordering::Relaxed);
    let _ = shutdown_tx.send(());
    for worker in workers {
        let _ = worker.join();
    }

    0
}

#[allow(clippy::too_many_arguments)]
fn cmd_train(
    synthetic: usize,
    input: Option<PathBuf>,
    seed: u64,
    estimators: usize,
    max_samples: usize,
    contamination: f64,
    min_samples: usize,
) -> i32 {
    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: could not create directories: {e}");
    }

    let store = Arc::new(ModelStore::new(config.model_path.clone()));
    match store.restore() {
        Ok(version) => println!("Superseding installed model v{version}"),
        Err(StoreError::NotFound(_)) => {}
        Err(e) => eprintln!("Warning: ignoring unreadable artifact: {e}"),
    }

    let batch = match input {
        Some(path) => match read_sample_file(&path) {
            Ok(batch) => {
                println!("Loaded {} samples from {}", batch.len(), path.display());
                batch
            }
            Err(e) => {
                eprintln!("Error: could not read {}: {e}", path.display());
                return 1;
            }
        },
        None => {
            println!("Generating {synthetic} synthetic normal samples...");
            let mut simulator =
                SampleSimulator::new(SimulatorProfile::building_defaults(), 0.0, seed);
            simulator.normal_batch(synthetic)
        }
    };

    let job = TrainingJob::new(
        store,
        config.feature_schema(),
        TrainingConfig {
            forest: ForestParams {
                n_estimators: estimators,
                max_samples,
            },
            threshold: ThresholdPolicy::Contamination(contamination),
            seed,
            min_samples,
            window_size: config.window_size,
        },
    );

    match job.run_once(&batch) {
        Ok(model) => {
            println!(
                "Model v{} trained on {} samples (threshold {:.4})",
                model.version,
                batch.len(),
                model.threshold
            );
            println!("Artifact saved to {}", config.model_path.display());
            0
        }
        Err(e @ TrainError::InsufficientData { .. }) => {
            eprintln!("Error: {e}");
            2
        }
        Err(e) => {
            eprintln!("Error: training failed: {e}");
            1
        }
    }
}

fn read_sample_file(path: &PathBuf) -> Result<Vec<Sample>, anyhow::Error> {
    let content = std::fs::read_to_string(path)?;
    let mut samples = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sample: Sample = serde_json::from_str(line)
            .map_err(|e| anyhow::anyhow!("line {}: {e}", idx + 1))?;
        samples.push(sample);
    }
    Ok(samples)
}

fn cmd_simulate(
    url: &str,
    interval_ms: u64,
    anomaly_probability: f64,
    count: Option<u64>,
    seed: u64,
) -> i32 {
    let mut simulator = SampleSimulator::new(
        SimulatorProfile::building_defaults(),
        anomaly_probability,
        seed,
    );
    let client = reqwest::blocking::Client::new();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        let _ = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst));
    }

    println!("Sending simulated data to {url} every {interval_ms}ms");
    println!("Anomaly probability: {}%", anomaly_probability * 100.0);

    let mut sent: u64 = 0;
    while !stop.load(Ordering::SeqCst) {
        if count.is_some_and(|limit| sent >= limit) {
            break;
        }

        let (sample, injected) = simulator.next_sample();
        let body: serde_json::Map<String, serde_json::Value> = simulator
            .schema()
            .names()
            .iter()
            .zip(&sample.values)
            .map(|(name, value)| (name.clone(), serde_json::json!(value)))
            .collect();

        match client.post(url).json(&body).send() {
            Ok(response) => {
                let status = response.status();
                let detected = response
                    .json::<serde_json::Value>()
                    .ok()
                    .and_then(|v| v.get("is_anomaly").and_then(|b| b.as_bool()))
                    .unwrap_or(false);
                let kind = if injected { "ANOMALY" } else { "NORMAL" };
                println!("Sent {kind}: {status} detected={detected}");
            }
            Err(e) => {
                eprintln!("Connection error: {e}. Is the agent running at {url}?");
            }
        }

        sent += 1;
        thread::sleep(Duration::from_millis(interval_ms));
    }

    println!("Sent {sent} samples.");
    0
}

fn cmd_config() -> i32 {
    let config = Config::load().unwrap_or_default();
    println!("Configuration file: {}", Config::config_path().display());
    println!();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            eprintln!("Error: could not render configuration: {e}");
            1
        }
    }
}
