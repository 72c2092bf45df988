//! Pulse Remote - server function host
//!
//! Builds server functions into a federated remote bundle and serves them.

use clap::Parser;
use pulse_remote::config::{merge_config_with_args, ConfigFile};
use pulse_remote::{FunctionHost, Result, ServerArgs, ServerConfig};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    if let Err(e) = run() {
        eprintln!("pulse-remote failed: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> Result<()> {
    let mut args = ServerArgs::parse();

    // Handle --generate-config flag
    if args.generate_config {
        println!("{}", ConfigFile::generate_example());
        return Ok(());
    }

    // Load configuration file if specified or from the working directory
    let config_file = if let Some(ref path) = args.config {
        match ConfigFile::load(path) {
            Ok(config) => {
                eprintln!("Loaded configuration from {:?}", path);
                Some(config)
            }
            Err(e) => {
                eprintln!("Error loading configuration file: {}", e);
                return Err(e);
            }
        }
    } else {
        ConfigFile::load_default()
    };

    // Merge config file values with CLI args (CLI takes precedence)
    if let Some(ref config) = config_file {
        args = merge_config_with_args(args, config);
    }

    let log_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(log_filter)
        .init();

    let config = match ServerConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to create configuration");
            return Err(e);
        }
    };

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e);
    }

    info!(
        mode = %config.mode,
        remote = %config.remote_name(),
        functions = %config.functions_dir.display(),
        freshness = %config.freshness,
        "Starting Pulse host"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move { FunctionHost::new(config)?.run().await })
}
