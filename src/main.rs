use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::{LogFormat, LoggingConfig, TurnstileConfig};
use turnstile::ratelimit::{LimiterConfig, DEFAULT_CAPACITY, DEFAULT_RATE};
use turnstile::simulation::Simulation;

/// Drive a rate limiter with simulated requests and report each decision.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Requests issued per worker
    #[arg(long)]
    requests: Option<usize>,

    /// Pause between sequential requests in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Upper bound of random extra pause in milliseconds
    #[arg(long)]
    jitter_ms: Option<u64>,

    /// Concurrent callers; more than one fires requests without pausing
    #[arg(long)]
    workers: Option<usize>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the limiter from the configuration (default)
    Run,
    /// Run a token bucket
    TokenBucket {
        /// Maximum tokens held
        #[arg(long, default_value_t = DEFAULT_CAPACITY)]
        capacity: f64,
        /// Tokens added per second
        #[arg(long, default_value_t = DEFAULT_RATE)]
        rate: f64,
    },
    /// Run a sliding window log
    SlidingWindow {
        /// Maximum admissions per window
        #[arg(long)]
        max_requests: usize,
        /// Window length in milliseconds
        #[arg(long)]
        window_ms: u64,
    },
    /// Token bucket (5 tokens, 1/s) followed by sliding window (5 per second)
    Demo,
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration.
    fn apply_overrides(&self, config: &mut TurnstileConfig) {
        if let Some(requests) = self.requests {
            config.simulation.requests = requests;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.simulation.interval_ms = interval_ms;
        }
        if let Some(jitter_ms) = self.jitter_ms {
            config.simulation.jitter_ms = jitter_ms;
        }
        if let Some(workers) = self.workers {
            config.simulation.workers = workers;
        }
        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
    }

    /// Limiters to run, in order.
    fn limiters(&self, config: &TurnstileConfig) -> Vec<LimiterConfig> {
        match self.command {
            None | Some(Command::Run) => vec![config.limiter.clone()],
            Some(Command::TokenBucket { capacity, rate }) => {
                vec![LimiterConfig::TokenBucket { capacity, rate }]
            }
            Some(Command::SlidingWindow {
                max_requests,
                window_ms,
            }) => vec![LimiterConfig::SlidingWindowLog {
                max_requests,
                window_ms,
            }],
            Some(Command::Demo) => vec![
                LimiterConfig::TokenBucket {
                    capacity: 5.0,
                    rate: 1.0,
                },
                LimiterConfig::SlidingWindowLog {
                    max_requests: 5,
                    window_ms: 1000,
                },
            ],
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = TurnstileConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    init_tracing(&config.logging);

    info!("Starting turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match cli.config {
        Some(ref path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Configuration loaded from defaults and environment"),
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    for limiter_config in cli.limiters(&config) {
        let limiter = limiter_config.build()?;
        info!(algorithm = limiter.algorithm(), "Limiter initialized");

        let simulation = Simulation::new(limiter, config.simulation.clone());
        let report = if config.simulation.workers > 1 {
            simulation.run_concurrent().await
        } else {
            simulation.run_until(shutdown.as_mut()).await
        };

        if cli.json {
            println!("{}", report.to_json()?);
        } else {
            println!("{}\n", report);
        }

        if report.interrupted {
            break;
        }
    }

    info!("Turnstile stopped");
    Ok(())
}

/// Install the global tracing subscriber.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping simulation");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping simulation");
        }
    }
}
