// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Database Migration Command
//!
//! Implements `sat-broker migrate`, applying the request registry schema
//! embedded from `cli/migrations/`.
//!
//! ```bash
//! # Apply all pending migrations
//! sat-broker migrate
//!
//! # Preview migrations without applying
//! sat-broker migrate --dry-run
//! ```
//!
//! The connection string comes from the `database` section of the
//! configuration or `SAT_BROKER_DATABASE_URL`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;

use sat_broker_core::domain::broker_config::BrokerConfig;
use sat_broker_core::domain::repository::StorageBackend;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Args)]
pub struct MigrateCommand {
    /// Perform a dry run without applying changes
    #[arg(long)]
    dry_run: bool,
}

pub async fn execute(cmd: MigrateCommand, config_override: Option<PathBuf>) -> Result<()> {
    println!("{}", "SAT broker migrate".bold().green());

    let config = BrokerConfig::load_or_default(config_override).context("Failed to load configuration")?;
    let pg = match config.storage_backend()? {
        StorageBackend::PostgreSQL(pg) => pg,
        StorageBackend::InMemory => anyhow::bail!(
            "No database configured. Set the `database` section or SAT_BROKER_DATABASE_URL."
        ),
    };

    println!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&pg.connection_string)
        .await
        .context("Failed to connect to database")?;

    // Missing table means nothing applied yet
    let applied_count = sqlx::query("SELECT version FROM _sqlx_migrations")
        .fetch_all(&pool)
        .await
        .map(|rows| rows.len())
        .unwrap_or(0);

    let total_migrations = MIGRATOR.iter().count();

    println!(
        "Migration status: {} applied, {} total available.",
        applied_count, total_migrations
    );

    if applied_count >= total_migrations {
        println!("{}", "✓ Database is up to date.".green());
        return Ok(());
    }

    if cmd.dry_run {
        println!("Pending migrations found (Dry Run):");
        for migration in MIGRATOR.iter().skip(applied_count) {
            println!(" - {} {}", migration.version, migration.description);
        }
        println!("Skipping application due to --dry-run");
        return Ok(());
    }

    println!("Applying pending migrations...");
    MIGRATOR.run(&pool).await.context("Failed to apply migrations")?;
    println!("{}", "✓ Database updated successfully.".green());

    Ok(())
}
