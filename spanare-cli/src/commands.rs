use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use figment::providers::Serialized;
use spanare_config::{ConfigError, SpanareConfig};
use spanare_core::cancel::CancelToken;
use spanare_core::record::ObservationRecord;
use spanare_core::status::StatusSnapshot;
use spanare_engine::Scanner;
use spanare_telemetry::{EventLogger, MetricsRecorder};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::CliError;

/// How long the consumer waits on an empty ring before rechecking for stop.
const CONSUMER_WAIT_MS: i64 = 250;

#[derive(Parser)]
#[command(
    name = "spanare",
    version,
    about = "Polls HTTP(S) endpoints for MAC observations and streams them as JSON lines"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the configured endpoints until interrupted
    Run(RunArgs),
    /// Validate the configuration and report the derived ring size
    Check(ConfigArgs),
    /// Print the scanner version
    Version,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Configuration YAML file (defaults to config/spanare.yaml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Endpoint URL to poll; repeat for several. Replaces configured endpoints.
    #[arg(short, long = "endpoint")]
    pub endpoints: Vec<String>,

    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Ring memory budget in bytes
    #[arg(long)]
    pub buffer_bytes: Option<usize>,

    /// Extra PEM bundle of trusted CA certificates
    #[arg(long)]
    pub ca_cert: Option<PathBuf>,

    /// Seconds between status log lines (0 disables them)
    #[arg(long)]
    pub status_interval_secs: Option<u64>,

    #[arg(long)]
    pub log_level: Option<String>,
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Check(args) => check(args).await,
        Commands::Version => {
            println!("spanare {}", spanare_engine::version());
            Ok(())
        }
    }
}

/// Loads the layered configuration with command-line flags merged on top.
pub fn load_config(args: &RunArgs) -> Result<SpanareConfig, ConfigError> {
    let mut figment = SpanareConfig::figment(args.config.config.as_deref())?;

    if !args.endpoints.is_empty() {
        figment = figment.merge(Serialized::default("scanner.endpoints", &args.endpoints));
    }
    if let Some(ms) = args.poll_interval_ms {
        figment = figment.merge(Serialized::default("scanner.poll_interval_ms", ms));
    }
    if let Some(bytes) = args.buffer_bytes {
        figment = figment.merge(Serialized::default("scanner.buffer_bytes", bytes));
    }
    if let Some(path) = &args.ca_cert {
        figment = figment.merge(Serialized::default("scanner.ca_cert_path", path));
    }
    if let Some(secs) = args.status_interval_secs {
        figment = figment.merge(Serialized::default("telemetry.status_interval_secs", secs));
    }
    if let Some(level) = &args.log_level {
        figment = figment.merge(Serialized::default("telemetry.log_level", level));
    }

    SpanareConfig::from_figment(figment)
}

fn init_logging(level: &str) -> Result<(), CliError> {
    EventLogger::init(level).map_err(|e| CliError::Logging(e.to_string()))
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    init_logging(&config.telemetry.log_level)?;
    let metrics = MetricsRecorder::new()?;

    info!(
        version = spanare_engine::version(),
        endpoints = config.scanner.endpoints.len(),
        "Starting spanare"
    );

    // The scanner and its HTTP client live entirely on a blocking thread.
    let stop = CancelToken::new();
    let consumer = tokio::task::spawn_blocking({
        let stop = stop.clone();
        move || consume(config, stop)
    });

    let snapshot = await_consumer(consumer, stop, tokio::signal::ctrl_c()).await?;

    metrics.observe(&snapshot);
    EventLogger::log_status(&snapshot);
    match metrics.gather_metrics() {
        Ok(text) => info!(metrics = %text, "Final metrics"),
        Err(e) => warn!(error = %e, "Failed to render metrics"),
    }
    Ok(())
}

/// Waits for the consumer to finish on its own or for `interrupt` to fire.
///
/// The consumer is stopped and joined whenever the interrupt future
/// resolves, including when installing the handler failed, so the scanner
/// never outlives a broken signal path.
async fn await_consumer(
    mut consumer: JoinHandle<anyhow::Result<StatusSnapshot>>,
    stop: CancelToken,
    interrupt: impl Future<Output = io::Result<()>>,
) -> anyhow::Result<StatusSnapshot> {
    tokio::select! {
        joined = &mut consumer => joined?,
        signal = interrupt => {
            match &signal {
                Ok(()) => info!("Interrupt received, stopping"),
                Err(e) => error!(error = %e, "Interrupt handler failed, stopping"),
            }
            stop.cancel();
            let outcome = consumer.await?;
            signal.map_err(CliError::Signal)?;
            outcome
        }
    }
}

/// Runs the scanner and drains it to stdout until `stop` is cancelled.
fn consume(config: SpanareConfig, stop: CancelToken) -> anyhow::Result<StatusSnapshot> {
    let scanner = Scanner::new(config.scanner)?;
    scanner.start()?;

    let status_every = Duration::from_secs(config.telemetry.status_interval_secs);
    let mut last_status = Instant::now();
    let mut out = std::io::stdout().lock();

    while !stop.is_cancelled() {
        if let Some(record) = scanner.pop(CONSUMER_WAIT_MS) {
            write_record(&mut out, &record)?;
        }
        if !status_every.is_zero() && last_status.elapsed() >= status_every {
            EventLogger::log_status(&scanner.status());
            last_status = Instant::now();
        }
    }

    scanner.shutdown();
    let mut drained = 0usize;
    while let Some(record) = scanner.try_pop() {
        write_record(&mut out, &record)?;
        drained += 1;
    }
    out.flush()?;
    info!(drained, "Buffered records written");

    Ok(scanner.status())
}

fn write_record<W: Write>(out: &mut W, record: &ObservationRecord) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    out.write_all(b"\n").context("writing to stdout")?;
    Ok(())
}

async fn check(args: ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(&RunArgs {
        config: args,
        ..RunArgs::default()
    })?;
    init_logging(&config.telemetry.log_level)?;

    let summary = tokio::task::spawn_blocking(move || {
        let scanner = Scanner::new(config.scanner)?;
        let summary = format!(
            "configuration OK: {} endpoint(s), ring of {} slots, poll interval {} ms",
            scanner.config().endpoints.len(),
            scanner.ring_capacity(),
            scanner.config().poll_interval().as_millis()
        );
        Ok::<_, anyhow::Error>(summary)
    })
    .await??;

    println!("{summary}");
    Ok(())
}
