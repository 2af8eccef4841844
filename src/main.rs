use anyhow::{Context, Result};
use clap::Parser;
use promsd_core::duration::parse_duration;
use promsd_core::{AppConfig, LogFormat, LoggingConfig};
use promsd_discovery::{
    format_interfaces, list_interfaces, resolve_interfaces, ChangeFilter, Discovery,
    MdnsQuerier, OutputSink, Scheduler,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// promsd - Prometheus target discovery over mDNS / DNS-SD
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Refresh interval, e.g. 10s or 1m30s
    #[arg(long, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Output file for target groups, '-' for standard output
    #[arg(short, long)]
    out: Option<String>,

    /// Only use IPv4 addresses
    #[arg(short = '4', long)]
    ipv4_only: bool,

    /// List network interfaces and exit
    #[arg(short, long)]
    list_interfaces: bool,

    /// Comma separated interfaces to query on
    #[arg(short, long, value_delimiter = ',')]
    interface: Vec<String>,

    /// How long each query listens for responses
    #[arg(long, value_parser = parse_duration)]
    query_timeout: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PROMSD_LOG")]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(interval) = self.interval {
            config.discovery.interval = interval;
        }
        if let Some(timeout) = self.query_timeout {
            config.discovery.query_timeout = timeout;
        }
        if let Some(out) = &self.out {
            config.output.path = out.clone();
        }
        if self.ipv4_only {
            config.discovery.ipv4_only = true;
        }
        if !self.interface.is_empty() {
            config.discovery.interfaces = self.interface.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let level = logging.parse_level()?;
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .parse_lossy("");
    if logging.quiet_transport {
        filter = filter.add_directive("mdns_sd=off".parse()?);
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

/// What the process was asked to do.
#[derive(Debug)]
enum Startup {
    /// Print interfaces and exit; configuration is not read
    ListInterfaces,
    /// Run discovery with the merged configuration
    Discover(Box<AppConfig>),
}

fn startup(args: &Args) -> Result<Startup> {
    if args.list_interfaces {
        return Ok(Startup::ListInterfaces);
    }

    let mut config =
        AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    Ok(Startup::Discover(Box::new(config)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match startup(&args)? {
        Startup::ListInterfaces => {
            print!("{}", format_interfaces(&list_interfaces()?));
            return Ok(());
        }
        Startup::Discover(config) => *config,
    };

    init_tracing(&config.logging)?;
    for warning in config.warnings() {
        warn!("{}", warning);
    }
    config.validate().context("Invalid configuration")?;

    if !config.discovery.interfaces.is_empty() {
        let available = list_interfaces()?;
        config.discovery.interfaces =
            resolve_interfaces(&config.discovery.interfaces, &available)?;
    }

    let querier = MdnsQuerier::new(&config.discovery.interfaces, config.discovery.query_timeout)
        .context("Failed to start mDNS transport")?;
    let discovery = Discovery::new(Arc::new(querier), &config.discovery);
    let mut scheduler = Scheduler::new(discovery, config.discovery.interval);

    let mut sink = OutputSink::from_config(&config.output);
    info!(
        output = %sink.destination(),
        services = ?config.discovery.service_names,
        interfaces = ?config.discovery.interfaces,
        ipv4_only = config.discovery.ipv4_only,
        "promsd starting"
    );

    let token = CancellationToken::new();
    let (tx, rx) = mpsc::channel(1);

    let scheduler_handle = tokio::spawn({
        let token = token.clone();
        async move { scheduler.run(tx, token).await }
    });

    tokio::spawn({
        let token = token.clone();
        async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received shutdown signal, stopping discovery...");
                    token.cancel();
                }
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    });

    let emitted = ChangeFilter::new().run(rx, &mut sink).await;

    token.cancel();
    scheduler_handle.await.context("Scheduler task failed")?;

    match emitted {
        Ok(stats) => {
            info!(
                snapshots = stats.received,
                emitted = stats.emitted,
                "promsd stopped"
            );
            Ok(())
        }
        Err(e) => {
            error!("Output error: {}", e);
            Err(e).context("Failed to emit targets")
        }
    }
}
