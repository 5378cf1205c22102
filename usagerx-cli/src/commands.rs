use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::time::{interval_at, Instant, Interval};
use tracing::info;
use validator::Validate;

use usagerx_config::{ConfigError, ReceiverConfig};
use usagerx_engine::dead_letter::DEAD_LETTER_COLUMNS;
use usagerx_engine::{HandlerRegistry, UsageReceiver, UsageSender};
use usagerx_protocols::PacketHeader;
use usagerx_storage::SqliteSink;
use usagerx_telemetry::logging;

#[derive(Parser)]
#[command(name = "usagerx", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Receive usage packets and store them until interrupted
    Run(RunArgs),
    /// Send one text usage packet
    Send(SendArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Configuration file (defaults to config/usagerx.yaml plus environment)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Listen address, overriding the configuration
    #[arg(short, long)]
    pub bind: Option<String>,
    /// SQLite database, overriding the configuration
    #[arg(short, long)]
    pub database: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    /// Whitespace-separated host:port collectors (default: GLOBUS_USAGE_TARGETS,
    /// then the public collector). GLOBUS_USAGE_OPTOUT suppresses sending.
    #[arg(short, long)]
    pub target: Option<String>,
    /// Component code written into the header
    #[arg(long, allow_negative_numbers = true)]
    pub component_code: i16,
    /// Packet format version written into the header
    #[arg(long, allow_negative_numbers = true)]
    pub version_code: i16,
    /// Value of the HOSTNAME field
    #[arg(long)]
    pub hostname: Option<String>,
    /// KEY=VALUE parameters, in order
    #[arg(value_parser = parse_param)]
    pub params: Vec<(String, String)>,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

fn load_config(args: &RunArgs) -> Result<ReceiverConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => ReceiverConfig::load_from_path(path)?,
        None => ReceiverConfig::load()?,
    };
    if let Some(bind) = &args.bind {
        config.listener.bind_addr = bind.clone();
    }
    if let Some(database) = &args.database {
        config.database.path = database.to_string_lossy().into_owned();
    }
    config.validate()?;
    Ok(config)
}

pub async fn run_receiver(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    logging::init(&config.telemetry.log_level);

    let sink = Arc::new(
        SqliteSink::open(&config.database.path, config.busy_timeout())
            .context("cannot open usage database")?,
    );
    let registry = HandlerRegistry::with_defaults(&config.tables);
    if config.database.auto_provision {
        for handler in registry.handlers() {
            sink.provision(handler.table(), handler.columns())?;
        }
        if config.dead_letter.enabled {
            sink.provision(&config.tables.dead_letter, DEAD_LETTER_COLUMNS)?;
        }
    }

    let receiver = UsageReceiver::start(&config, registry, sink)?;

    let mut ticker = (config.telemetry.report_interval_secs > 0).then(|| {
        let period = Duration::from_secs(config.telemetry.report_interval_secs);
        interval_at(Instant::now() + period, period)
    });
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("cannot listen for Ctrl-C")?;
                info!("Interrupt received, shutting down");
                break;
            }
            _ = next_tick(&mut ticker) => logging::report(&receiver.metrics().snapshot()),
        }
    }

    let metrics = receiver.metrics().clone();
    let snapshot = tokio::task::spawn_blocking(move || receiver.shutdown()).await??;
    logging::report(&snapshot);
    print!("{}", metrics.gather_metrics()?);
    Ok(())
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

pub fn send_packet(args: SendArgs) -> anyhow::Result<()> {
    logging::init("info");

    let sender = UsageSender::from_env(
        PacketHeader::new(args.component_code, args.version_code),
        args.hostname,
        args.target.as_deref(),
    )?;
    if sender.is_opted_out() {
        info!("Usage reporting opted out, nothing sent");
        return Ok(());
    }
    let delivered = sender.send(&args.params)?;
    info!(delivered, targets = sender.targets().len(), "Usage packet sent");
    Ok(())
}
