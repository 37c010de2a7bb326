// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # SAT Bulk Download Broker
//!
//! The `sat-broker` binary serves the HTTP API that exchanges a taxpayer's
//! signing credential for remote sessions, submits bulk-download requests,
//! tracks them to completion and serves the resulting packages.
//!
//! ## Commands
//!
//! - `sat-broker serve` - Run the HTTP API and the background poll scheduler
//! - `sat-broker config show|validate|generate` - Configuration management
//! - `sat-broker migrate` - Apply the request registry schema

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use sat_broker::commands::{self, ConfigCommand, MigrateCommand};
use sat_broker::server;
use sat_broker_core::domain::broker_config::{BrokerConfig, LoggingConfig};

/// SAT bulk download broker
#[derive(Parser)]
#[command(name = "sat-broker")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "SAT_BROKER_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "SAT_BROKER_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and background poller
    #[command(name = "serve")]
    Serve {
        /// Override the configured listen port
        #[arg(long, env = "SAT_BROKER_PORT")]
        port: Option<u16>,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Apply database migrations
    #[command(name = "migrate")]
    Migrate {
        #[command(flatten)]
        command: MigrateCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logging settings come from the config file unless overridden on the command line
    let logging = BrokerConfig::load_or_default(cli.config.clone())
        .map(|config| config.observability.logging)
        .unwrap_or_default();
    let level = cli.log_level.clone().unwrap_or_else(|| logging.level.clone());
    init_logging(&level, &logging)?;

    match cli.command {
        Commands::Serve { port } => {
            let mut config =
                BrokerConfig::load_or_default(cli.config).context("Failed to load configuration")?;
            if let Some(port) = port {
                config.server.port = port;
            }
            info!("Starting SAT broker {}", env!("CARGO_PKG_VERSION"));
            server::start_server(config).await
        }
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
        Commands::Migrate { command } => commands::migrate::execute(command, cli.config).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
