// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the request registry defined in the
//! domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve download request records
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **PostgresDownloadRequestRepository** - Durable registry backed by PostgreSQL
//! - **InMemoryDownloadRequestRepository** - Process-local registry for
//!   development and tests; contents are lost on restart
//!
//! Both honour the same terminal guard: a stored terminal state is never
//! replaced by a different state.

pub mod postgres_download_request;

pub use postgres_download_request::PostgresDownloadRequestRepository;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::download_request::{DownloadRequest, RequestId, RequestState};
use crate::domain::repository::{DownloadRequestRepository, RepositoryError};
use crate::domain::subject::SubjectId;

#[derive(Clone, Default)]
pub struct InMemoryDownloadRequestRepository {
    requests: Arc<RwLock<HashMap<RequestId, DownloadRequest>>>,
}

impl InMemoryDownloadRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DownloadRequestRepository for InMemoryDownloadRequestRepository {
    async fn save(&self, request: &DownloadRequest) -> Result<(), RepositoryError> {
        self.requests
            .write()
            .insert(request.request_id.clone(), request.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        request_id: &RequestId,
        subject_id: &SubjectId,
    ) -> Result<Option<DownloadRequest>, RepositoryError> {
        let requests = self.requests.read();
        Ok(requests
            .get(request_id)
            .filter(|r| &r.subject_id == subject_id)
            .cloned())
    }

    async fn find_by_package(
        &self,
        package_id: &str,
        subject_id: &SubjectId,
    ) -> Result<Option<DownloadRequest>, RepositoryError> {
        let requests = self.requests.read();
        Ok(requests
            .values()
            .find(|r| &r.subject_id == subject_id && r.package_ids.iter().any(|p| p == package_id))
            .cloned())
    }

    async fn record_observation(
        &self,
        request_id: &RequestId,
        state: RequestState,
        package_ids: &[String],
    ) -> Result<Option<DownloadRequest>, RepositoryError> {
        let mut requests = self.requests.write();
        Ok(requests.get_mut(request_id).map(|stored| {
            stored.apply_observation(state, package_ids.to_vec());
            stored.clone()
        }))
    }

    async fn find_non_terminal(&self) -> Result<Vec<DownloadRequest>, RepositoryError> {
        let requests = self.requests.read();
        let mut open: Vec<DownloadRequest> = requests.values().filter(|r| !r.is_terminal()).cloned().collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(open)
    }
}
