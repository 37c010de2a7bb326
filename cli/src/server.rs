// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP server wiring for `sat-broker serve`

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use axum::http::{HeaderValue, Method};
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use sat_broker_core::{
    application::{
        PendingSet, PollScheduler, PollSchedulerConfig, SessionCache, StandardDownloadLifecycleService,
    },
    domain::{
        broker_config::{resolve_secret, BrokerConfig, ServerConfig},
        repository::{DownloadRequestRepository, StorageBackend},
    },
    infrastructure::{
        db::Database,
        repositories::{InMemoryDownloadRequestRepository, PostgresDownloadRequestRepository},
        HttpSatGateway, SessionTokenIssuer,
    },
    presentation::api::{self, AppState},
};

pub async fn start_server(config: BrokerConfig) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    let cors = cors_layer(&config.server)?;

    if config.observability.metrics.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics.port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus metrics exporter listening on {}", addr);
    }

    let repository: Arc<dyn DownloadRequestRepository> = match config.storage_backend()? {
        StorageBackend::PostgreSQL(pg) => {
            let database = Database::new(&pg).await?;
            info!("Request registry backed by PostgreSQL");
            Arc::new(PostgresDownloadRequestRepository::new(database.get_pool().clone()))
        }
        StorageBackend::InMemory => {
            warn!("No database configured, request registry is in-memory and will not survive a restart");
            Arc::new(InMemoryDownloadRequestRepository::new())
        }
    };

    let gate = Arc::new(HttpSatGateway::new(&config.gateway).context("Failed to build signing gateway client")?);
    let sessions = Arc::new(SessionCache::new());
    let pending = Arc::new(PendingSet::new());
    let lifecycle = Arc::new(StandardDownloadLifecycleService::new(
        gate,
        sessions.clone(),
        pending.clone(),
        repository,
    ));

    match lifecycle.restore_pending().await {
        Ok(restored) => info!("Restored {} pending requests from the registry", restored),
        Err(e) => warn!("Failed to restore pending requests: {}", e),
    }

    let scheduler = Arc::new(PollScheduler::new(
        lifecycle.clone(),
        pending,
        PollSchedulerConfig {
            interval_seconds: config.poller.interval_seconds,
            enabled: config.poller.enabled,
            max_concurrent_checks: config.poller.max_concurrent_checks,
        },
    ));
    let scheduler_shutdown = scheduler.shutdown_token();
    let scheduler_handle = scheduler.start();

    let secret = resolve_secret(&config.auth.token_secret)?;
    let tokens = Arc::new(SessionTokenIssuer::new(&secret, config.auth.token_ttl_hours)?);

    let app = api::app(AppState {
        lifecycle,
        sessions,
        tokens,
        start_time: Instant::now(),
    })
    .layer(cors)
    .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("SAT broker listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    scheduler_shutdown.cancel();
    if let Err(e) = scheduler_handle.await {
        warn!("Poll scheduler task ended abnormally: {}", e);
    }

    info!("SAT broker shut down");

    Ok(())
}

/// CORS policy for the API. An empty origin list allows any origin.
fn cors_layer(server: &ServerConfig) -> Result<CorsLayer> {
    let origin = if server.cors_allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins = server
            .cors_allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin).with_context(|| format!("Invalid CORS origin '{}'", origin))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/health")
            .header("origin", origin)
            .header("access-control-request-method", "GET")
            .body(Body::empty())
            .unwrap()
    }

    fn router(server: &ServerConfig) -> Router {
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .layer(cors_layer(server).unwrap())
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin_by_default() {
        let server = ServerConfig::default();
        let response = router(&server).oneshot(preflight("https://portal.example")).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_cors_restricts_to_configured_origins() {
        let server = ServerConfig {
            cors_allowed_origins: vec!["https://portal.example".to_string()],
            ..Default::default()
        };

        let allowed = router(&server).oneshot(preflight("https://portal.example")).await.unwrap();
        assert_eq!(
            allowed.headers().get("access-control-allow-origin").unwrap(),
            "https://portal.example"
        );

        let denied = router(&server).oneshot(preflight("https://elsewhere.example")).await.unwrap();
        assert!(denied.headers().get("access-control-allow-origin").is_none());
    }

    #[test]
    fn test_invalid_cors_origin_is_rejected() {
        let server = ServerConfig {
            cors_allowed_origins: vec!["bad\norigin".to_string()],
            ..Default::default()
        };
        assert!(cors_layer(&server).is_err());
    }
}
