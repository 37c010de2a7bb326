// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use sat_broker_core::domain::broker_config::BrokerConfig;
use sat_broker_core::domain::repository::StorageBackend;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./sat-broker.yaml")]
        output: PathBuf,

        /// Include every section with comments
        #[arg(long)]
        examples: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate {
            output,
            examples,
            force,
        } => generate(output, examples, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = BrokerConfig::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. SAT_BROKER_CONFIG_PATH: {}",
            std::env::var("SAT_BROKER_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./sat-broker.yaml");
        println!("  4. ~/.sat-broker/config.yaml");
        println!("  5. /etc/sat-broker/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", config.server.bind_address, config.server.port);
    println!();

    println!("{}", "Signing gateway:".bold());
    println!("  Endpoint: {}", config.gateway.endpoint);
    println!("  Timeout: {}s", config.gateway.timeout_seconds);
    println!();

    println!("{}", "Request registry:".bold());
    // Never print the resolved connection string, it may carry credentials
    match config.storage_backend() {
        Ok(StorageBackend::PostgreSQL(pg)) => {
            println!("  Backend: PostgreSQL (max {} connections)", pg.max_connections)
        }
        Ok(StorageBackend::InMemory) => println!("  Backend: in-memory {}", "(not durable)".yellow()),
        Err(e) => println!("  Backend: PostgreSQL {}", format!("(unresolved: {})", e).red()),
    }
    println!();

    println!("{}", "Poller:".bold());
    if config.poller.enabled {
        println!("  Interval: {}s", config.poller.interval_seconds);
    } else {
        println!("  {}", "disabled".yellow());
    }
    println!();

    println!("{}", "Observability:".bold());
    println!(
        "  Logging: {} ({})",
        config.observability.logging.level, config.observability.logging.format
    );
    if config.observability.metrics.enabled {
        println!("  Metrics: :{}", config.observability.metrics.port);
    } else {
        println!("  Metrics: {}", "disabled".dimmed());
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = BrokerConfig::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, with_examples: bool, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    std::fs::write(&output, sample_config(with_examples))
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

fn sample_config(with_examples: bool) -> &'static str {
    if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    }
}
