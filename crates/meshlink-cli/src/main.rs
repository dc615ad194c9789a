//! Command-line interface for the MeshLink command dispatcher.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};

use meshlink_api::ServerState;
use meshlink_commands::config::{parse_bool, parse_kind_list};
use meshlink_commands::{DispatchConfig, Dispatcher, MockTransport, QueueFullBehavior};

/// Environment variable switching log output to JSON.
const LOG_JSON_VAR: &str = "MESHLINK_LOG_JSON";

/// MeshLink - rate-limited command dispatch for MeshCore radios.
#[derive(Parser, Debug)]
#[command(name = "meshlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the API server and command worker.
    Serve {
        /// Host to bind to.
        #[arg(long, env = "MESHLINK_API_HOST", default_value = "127.0.0.1")]
        host: String,
        /// Port to bind to.
        #[arg(short, long, env = "MESHLINK_API_PORT", default_value_t = 8000)]
        port: u16,
        /// Refuse command submissions (403).
        #[arg(long)]
        read_only: bool,
        /// Simulated per-command latency of the mock radio, in milliseconds.
        #[arg(long, default_value_t = 0)]
        mock_latency_ms: u64,
        #[command(flatten)]
        dispatch: DispatchOverrides,
    },
    /// Print the effective dispatch configuration as JSON.
    Config {
        #[command(flatten)]
        dispatch: DispatchOverrides,
    },
}

/// Command-line overrides for the dispatch pipeline.
#[derive(ClapArgs, Debug, Default)]
struct DispatchOverrides {
    /// Maximum number of queued commands.
    #[arg(long)]
    queue_max_size: Option<usize>,
    /// Overflow policy: reject or drop_oldest.
    #[arg(long)]
    queue_full_behavior: Option<QueueFullBehavior>,
    /// Token refill rate (commands per second).
    #[arg(long)]
    rate_limit_per_second: Option<f64>,
    /// Token bucket capacity.
    #[arg(long)]
    rate_limit_burst: Option<u32>,
    /// Disable rate limiting.
    #[arg(long)]
    no_rate_limit: bool,
    /// Debounce window in seconds.
    #[arg(long)]
    debounce_window_seconds: Option<f64>,
    /// Maximum number of debounce records.
    #[arg(long)]
    debounce_cache_max_size: Option<usize>,
    /// Comma-separated command kinds to debounce.
    #[arg(long)]
    debounce_commands: Option<String>,
    /// Disable duplicate suppression.
    #[arg(long)]
    no_debounce: bool,
}

impl DispatchOverrides {
    fn apply(&self, config: &mut DispatchConfig) {
        if let Some(v) = self.queue_max_size {
            config.queue_max_size = v;
        }
        if let Some(v) = self.queue_full_behavior {
            config.queue_full_behavior = v;
        }
        if let Some(v) = self.rate_limit_per_second {
            config.rate_limit_per_second = v;
        }
        if let Some(v) = self.rate_limit_burst {
            config.rate_limit_burst = v;
        }
        if self.no_rate_limit {
            config.rate_limit_enabled = false;
        }
        if let Some(v) = self.debounce_window_seconds {
            config.debounce_window_seconds = v;
        }
        if let Some(v) = self.debounce_cache_max_size {
            config.debounce_cache_max_size = v;
        }
        if let Some(ref kinds) = self.debounce_commands {
            config.debounce_eligible_kinds = parse_kind_list(kinds);
        }
        if self.no_debounce {
            config.debounce_enabled = false;
        }
    }

    /// Environment first, then these overrides, then validation.
    fn resolve(&self) -> Result<DispatchConfig> {
        let mut config = DispatchConfig::from_env();
        self.apply(&mut config);
        config
            .validate()
            .context("Invalid dispatch configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!("Panic: {}", panic_info);
    }));

    match args.command {
        Command::Serve {
            host,
            port,
            read_only,
            mock_latency_ms,
            dispatch,
        } => run_server(host, port, read_only, mock_latency_ms, dispatch).await,
        Command::Config { dispatch } => print_config(dispatch),
    }
}

fn init_logging(verbose: bool) {
    // Check if JSON logging is requested (for production/container environments)
    let json_logging = std::env::var(LOG_JSON_VAR)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(false);

    let default_level = if verbose { "debug" } else { "info" };

    // Build the env filter for log level control
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "warn,meshlink_commands={lvl},meshlink_api={lvl},meshlink={lvl},tower_http=warn",
            lvl = default_level
        ))
    });

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_config(dispatch: DispatchOverrides) -> Result<()> {
    let config = dispatch.resolve()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn run_server(
    host: String,
    port: u16,
    read_only: bool,
    mock_latency_ms: u64,
    dispatch: DispatchOverrides,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid address: {}:{}", host, port))?;

    let config = dispatch.resolve()?;
    tracing::info!(
        queue_max_size = config.queue_max_size,
        queue_full_behavior = %config.queue_full_behavior,
        rate_limit_enabled = config.rate_limit_enabled,
        rate_limit_per_second = config.rate_limit_per_second,
        rate_limit_burst = config.rate_limit_burst,
        debounce_enabled = config.debounce_enabled,
        debounce_window_seconds = config.debounce_window_seconds,
        "Dispatch configuration loaded"
    );

    let transport =
        Arc::new(MockTransport::new().with_latency(Duration::from_millis(mock_latency_ms)));
    tracing::warn!("No radio driver configured, using the mock transport");

    let state = ServerState::new(Dispatcher::new(config), transport).with_write_enabled(!read_only);
    meshlink_api::run(addr, state).await
}
