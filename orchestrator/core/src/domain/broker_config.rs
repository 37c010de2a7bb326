// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Broker Configuration Types
//
// Defines the configuration schema for a broker node, including:
// - HTTP listener settings
// - Bearer token signing (secret supports "env:VAR_NAME")
// - Signing gateway endpoint for the remote bulk-download service
// - Optional PostgreSQL record store
// - Background poller cadence
// - Logging and metrics settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::repository::{PostgresConfig, StorageBackend};

/// Top-level broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Record store; absent means in-memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Origins allowed by CORS; empty allows any origin
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for bearer tokens (supports "env:VAR_NAME")
    #[serde(default = "default_token_secret")]
    pub token_secret: String,

    /// Bearer token lifetime, capped by the credential validity window
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the signing gateway that speaks the remote protocol
    #[serde(default = "default_gateway_endpoint")]
    pub endpoint: String,

    /// Per-call timeout for remote round trips
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string (supports "env:VAR_NAME")
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between reconciliation sweeps
    #[serde(default = "default_poll_interval")]
    pub interval_seconds: u64,

    /// Remote verifications in flight per sweep
    #[serde(default = "default_poll_concurrency")]
    pub max_concurrent_checks: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    3000
}

fn default_token_secret() -> String {
    "env:SAT_BROKER_TOKEN_SECRET".to_string()
}

fn default_token_ttl_hours() -> u64 {
    8
}

fn default_gateway_endpoint() -> String {
    "http://localhost:8080".to_string()
}

fn default_gateway_timeout() -> u64 {
    60
}

fn default_max_connections() -> u32 {
    5
}

fn default_poll_interval() -> u64 {
    300
}

fn default_poll_concurrency() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: default_token_secret(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_gateway_endpoint(),
            timeout_seconds: default_gateway_timeout(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_poll_interval(),
            max_concurrent_checks: default_poll_concurrency(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            gateway: GatewayConfig::default(),
            database: None,
            poller: PollerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Resolve a "env:VAR_NAME" reference, or return the literal value.
pub fn resolve_secret(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var)
            .map_err(|_| anyhow::anyhow!("Environment variable '{}' is not set", var)),
        None => Ok(value.to_string()),
    }
}

impl BrokerConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SAT_BROKER_CONFIG_PATH environment variable
    /// 2. ./sat-broker.yaml (working directory)
    /// 3. ~/.sat-broker/config.yaml (user home)
    /// 4. /etc/sat-broker/config.yaml (Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SAT_BROKER_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./sat-broker.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".sat-broker").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/sat-broker/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path must load
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SAT_BROKER_DATABASE_URL") {
            tracing::info!("Environment override: SAT_BROKER_DATABASE_URL");
            match self.database.as_mut() {
                Some(db) => db.url = url,
                None => {
                    self.database = Some(DatabaseConfig {
                        url,
                        max_connections: default_max_connections(),
                    })
                }
            }
        }

        if let Ok(endpoint) = std::env::var("SAT_BROKER_GATEWAY_ENDPOINT") {
            tracing::info!("Environment override: SAT_BROKER_GATEWAY_ENDPOINT={}", endpoint);
            self.gateway.endpoint = endpoint;
        }

        if let Ok(val) = std::env::var("SAT_BROKER_POLL_INTERVAL_SECONDS") {
            match val.parse::<u64>() {
                Ok(seconds) => {
                    tracing::info!("Environment override: SAT_BROKER_POLL_INTERVAL_SECONDS={}", seconds);
                    self.poller.interval_seconds = seconds;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for SAT_BROKER_POLL_INTERVAL_SECONDS: '{}'. Expected seconds. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Storage backend selected by this configuration
    pub fn storage_backend(&self) -> anyhow::Result<StorageBackend> {
        match &self.database {
            Some(db) => Ok(StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: resolve_secret(&db.url)?,
                max_connections: db.max_connections,
            })),
            None => Ok(StorageBackend::InMemory),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.gateway.endpoint.trim().is_empty() {
            anyhow::bail!("gateway.endpoint cannot be empty");
        }

        if self.gateway.timeout_seconds == 0 {
            anyhow::bail!("gateway.timeout_seconds must be greater than zero");
        }

        if self.poller.interval_seconds == 0 {
            anyhow::bail!("poller.interval_seconds must be greater than zero");
        }

        if self.poller.max_concurrent_checks == 0 {
            anyhow::bail!("poller.max_concurrent_checks must be greater than zero");
        }

        if self.auth.token_ttl_hours == 0 {
            anyhow::bail!("auth.token_ttl_hours must be greater than zero");
        }

        let secret = resolve_secret(&self.auth.token_secret)
            .map_err(|e| anyhow::anyhow!("auth.token_secret: {}", e))?;
        if secret.is_empty() {
            anyhow::bail!("auth.token_secret cannot be empty");
        }

        if let Some(db) = &self.database {
            resolve_secret(&db.url).map_err(|e| anyhow::anyhow!("database.url: {}", e))?;
            if db.max_connections == 0 {
                anyhow::bail!("database.max_connections must be greater than zero");
            }
        }

        match self.observability.logging.format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("Invalid observability.logging.format: '{}'. Must be 'json' or 'text'", other),
        }

        Ok(())
    }
}
