// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request Registry Interface
//!
//! Persistence contract for the [`DownloadRequest`] aggregate, following the
//! Repository pattern: the interface lives in the domain layer and is
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Implementation | Backend |
//! |----------------|---------|
//! | `InMemoryDownloadRequestRepository` | `RwLock<HashMap>` (development, tests) |
//! | `PostgresDownloadRequestRepository` | PostgreSQL `download_requests` table |
//!
//! ## Storage Backend Abstraction
//!
//! The backend is selected at startup from configuration: a configured
//! `database` section selects PostgreSQL, otherwise the in-memory store is
//! used and records do not survive a restart.

use async_trait::async_trait;

use crate::domain::download_request::{DownloadRequest, RequestId, RequestState};
use crate::domain::subject::SubjectId;

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

/// Repository interface for DownloadRequest aggregates
#[async_trait]
pub trait DownloadRequestRepository: Send + Sync {
    /// Save request (create or update), keyed by request id
    async fn save(&self, request: &DownloadRequest) -> Result<(), RepositoryError>;

    /// Find a request owned by `requester`
    async fn find_by_id(
        &self,
        request_id: &RequestId,
        requester: &SubjectId,
    ) -> Result<Option<DownloadRequest>, RepositoryError>;

    /// Find the request owned by `requester` whose package list contains `package_id`
    async fn find_by_package(
        &self,
        package_id: &str,
        requester: &SubjectId,
    ) -> Result<Option<DownloadRequest>, RepositoryError>;

    /// Apply a verify observation atomically.
    ///
    /// A stored terminal state is never replaced by a different state. Returns
    /// the record as stored after the call, or `None` when no record exists.
    async fn record_observation(
        &self,
        request_id: &RequestId,
        state: RequestState,
        package_ids: &[String],
    ) -> Result<Option<DownloadRequest>, RepositoryError>;

    /// All requests not yet in a terminal state (pending recovery)
    async fn find_non_terminal(&self) -> Result<Vec<DownloadRequest>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
