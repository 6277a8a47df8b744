//! Command-line interface for metricube.
//!
//! `metricube simulate` hammers a cube built from the configuration with a
//! concurrent workload and prints what happened. `metricube headers` exposes
//! the header list helpers for quick experiments.

use crate::core::{Config, ConfigBuilder, CubeError, Result};
use crate::headers;
use crate::workload::WorkloadRunner;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Concurrent multidimensional metric cube
#[derive(Parser, Debug)]
#[command(name = "metricube")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/metricube/config.yaml)
    #[arg(short, long, env = "METRICUBE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "METRICUBE_DEBUG", global = true)]
    pub debug: bool,

    /// Structured log output with targets, thread ids and line numbers
    #[arg(long, env = "METRICUBE_STRUCTURED_LOGS", global = true)]
    pub structured: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a concurrent workload against a cube and report outcomes
    Simulate {
        /// Number of concurrent workers
        #[arg(long, env = "METRICUBE_WORKERS")]
        workers: Option<usize>,

        /// Lookups issued by each worker
        #[arg(long, env = "METRICUBE_OPERATIONS")]
        operations: Option<usize>,

        /// How long to wait on a concurrent creator (e.g. 250ms)
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Time spent by each point factory (e.g. 5ms); widens creation races
        #[arg(long, value_parser = humantime::parse_duration)]
        factory_delay: Option<Duration>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or update `key=value` header lists
    Headers {
        /// Header operation to run
        #[command(subcommand)]
        action: HeadersAction,
    },
}

/// Header list operations
#[derive(Subcommand, Debug)]
pub enum HeadersAction {
    /// Print the value of a key
    Get {
        /// Key to look up (case-sensitive)
        #[arg(long)]
        key: String,
        /// Header values; each may itself be a comma/semicolon-joined list
        values: Vec<String>,
    },
    /// Print every key and value
    Dict {
        /// Header values to parse
        values: Vec<String>,
    },
    /// Print the list with a key replaced or appended
    Update {
        /// Key to replace; matched ignoring case and surrounding spaces
        #[arg(long)]
        key: String,
        /// New value for the key
        #[arg(long)]
        value: String,
        /// Header values to update
        values: Vec<String>,
    },
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = dirs::config_dir()
                .map(|d| d.join("metricube").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("~/.config/metricube/config.yaml"));

            if default_path.exists() {
                default_path
            } else {
                return self.build_config_from_args(builder);
            }
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
                tracing::info!("Loaded configuration from: {:?}", config_path);
            },
            Err(e) if self.config.is_some() => {
                return Err(CubeError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {
                tracing::debug!("No config file found at {:?}, using defaults", config_path);
            },
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(Command::Simulate {
            workers,
            operations,
            timeout,
            factory_delay,
            ..
        }) = &self.command
        {
            if let Some(workers) = workers {
                builder = builder.workers(*workers);
            }
            if let Some(operations) = operations {
                builder = builder.operations_per_worker(*operations);
            }
            if let Some(timeout) = timeout {
                builder = builder.creation_timeout(*timeout);
            }
            if let Some(delay) = factory_delay {
                builder = builder.factory_delay(*delay);
            }
        }

        if self.structured {
            builder = builder.structured_logging(true);
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging.
    ///
    /// `RUST_LOG` wins, then `METRICUBE_LOG_LEVEL`, then the configured level;
    /// `--debug` forces debug.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let log_level = if self.debug {
            "debug".to_string()
        } else {
            std::env::var("METRICUBE_LOG_LEVEL")
                .unwrap_or_else(|_| config.logging.level.as_str().to_string())
        };

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| CubeError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the parsed command line.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    cli.init_logging(&config)?;

    if cli.check_config {
        config.validate()?;
        println!("Configuration is valid!");
        println!("  Dimensions: {}", config.cube.dimensionality());
        println!("  Cardinality caps: {:?}", config.cube.cardinality_caps);
        println!("  Total points limit: {}", config.cube.total_points_limit);
        println!("  Creation timeout: {:?}", config.cube.creation_timeout);
        return Ok(());
    }

    match cli.command {
        Some(Command::Simulate { json, .. }) => simulate(&config, json).await,
        Some(Command::Headers { action }) => run_headers(action),
        None => Err(CubeError::config(
            "no command given; try `metricube simulate` or `metricube --help`",
        )),
    }
}

async fn simulate(config: &Config, json: bool) -> Result<()> {
    let runner = WorkloadRunner::from_config(config)?;
    let report = runner.run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Workload: {} workers, {} lookups in {:?}",
        report.workers, report.operations, report.elapsed
    );
    println!("  Throughput:           {:.0} lookups/s", report.operations_per_second);
    println!("  Created:              {}", report.outcomes.created);
    println!("  Existing:             {}", report.outcomes.existing);
    println!("  Cardinality rejected: {}", report.outcomes.cardinality_rejected);
    println!("  Total limit rejected: {}", report.outcomes.total_limit_rejected);
    println!("  Timed out:            {}", report.outcomes.timed_out);
    println!("  Factory calls:        {}", report.factory_calls);
    println!(
        "  Points:               {}/{} ({} saturated nodes)",
        report.cube.total_points, report.cube.total_points_limit, report.cube.saturated_nodes
    );
    if let Some(busiest) = &report.busiest_series {
        println!(
            "  Busiest series:       #{} with {} values",
            busiest.id, busiest.count
        );
    }
    Ok(())
}

fn expand(values: &[String]) -> Vec<&str> {
    values
        .iter()
        .flat_map(|value| headers::split_header_list(value))
        .collect()
}

fn run_headers(action: HeadersAction) -> Result<()> {
    match action {
        HeadersAction::Get { key, values } => {
            match headers::get_header_key_value(&expand(&values), &key) {
                Some(value) => println!("{}", value),
                None => println!("<not found>"),
            }
        },
        HeadersAction::Dict { values } => match headers::get_header_dictionary(&expand(&values)) {
            Some(dictionary) => {
                let mut entries: Vec<_> = dictionary.into_iter().collect();
                entries.sort();
                for (key, value) in entries {
                    println!("{}={}", key, value);
                }
            },
            None => println!("<empty>"),
        },
        HeadersAction::Update { key, value, values } => {
            let updated =
                headers::try_update_header_with_key_value(&expand(&values), &key, &value)?;
            println!("{}", updated.join(", "));
        },
    }
    Ok(())
}
