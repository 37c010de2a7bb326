// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::download_request::{DownloadRequest, RequestId, RequestState};
use crate::domain::query::QueryParameters;
use crate::domain::repository::{DownloadRequestRepository, RepositoryError};
use crate::domain::subject::{ServiceKind, SubjectId};

const SELECT_COLUMNS: &str = r#"
    SELECT request_id, requester_rfc, service_kind, state, package_ids,
           query_params, created_at, updated_at
    FROM download_requests
"#;

pub struct PostgresDownloadRequestRepository {
    pool: PgPool,
}

impl PostgresDownloadRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_request(row: &PgRow) -> Result<DownloadRequest, RepositoryError> {
    let request_id: String = row.try_get("request_id")?;
    let requester: String = row.try_get("requester_rfc")?;
    let service_kind: Option<String> = row.try_get("service_kind")?;
    let state: String = row.try_get("state")?;
    let package_ids: serde_json::Value = row.try_get("package_ids")?;
    let query_params: serde_json::Value = row.try_get("query_params")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    let service_kind = service_kind
        .map(|raw| raw.parse::<ServiceKind>())
        .transpose()
        .map_err(RepositoryError::Serialization)?;
    let package_ids: Vec<String> = serde_json::from_value(package_ids)?;
    let query_params: QueryParameters = serde_json::from_value(query_params)
        .map_err(|e| RepositoryError::Serialization(format!("Failed to deserialize query params: {}", e)))?;

    Ok(DownloadRequest {
        request_id: RequestId(request_id),
        subject_id: SubjectId::new(requester),
        service_kind,
        state: RequestState::parse(&state),
        package_ids,
        query_params,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl DownloadRequestRepository for PostgresDownloadRequestRepository {
    async fn save(&self, request: &DownloadRequest) -> Result<(), RepositoryError> {
        let package_ids = serde_json::to_value(&request.package_ids)?;
        let query_params = serde_json::to_value(&request.query_params)?;

        // A terminal row is only rewritten with its own state
        sqlx::query(
            r#"
            INSERT INTO download_requests (
                request_id, requester_rfc, service_kind, state, package_ids,
                query_params, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (request_id) DO UPDATE SET
                service_kind = COALESCE(download_requests.service_kind, EXCLUDED.service_kind),
                state = EXCLUDED.state,
                package_ids = EXCLUDED.package_ids,
                updated_at = EXCLUDED.updated_at
            WHERE download_requests.state NOT IN ('Finished', 'Error', 'Rejected', 'Expired')
               OR download_requests.state = EXCLUDED.state
            "#,
        )
        .bind(request.request_id.as_str())
        .bind(request.subject_id.as_str())
        .bind(request.service_kind.map(|k| k.as_str()))
        .bind(request.state.as_str())
        .bind(package_ids)
        .bind(query_params)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save download request: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        request_id: &RequestId,
        requester: &SubjectId,
    ) -> Result<Option<DownloadRequest>, RepositoryError> {
        let row = sqlx::query(&format!("{} WHERE request_id = $1 AND requester_rfc = $2", SELECT_COLUMNS))
            .bind(request_id.as_str())
            .bind(requester.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn find_by_package(
        &self,
        package_id: &str,
        requester: &SubjectId,
    ) -> Result<Option<DownloadRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{} WHERE requester_rfc = $2 AND package_ids @> jsonb_build_array($1::text) ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(package_id)
        .bind(requester.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn record_observation(
        &self,
        request_id: &RequestId,
        state: RequestState,
        package_ids: &[String],
    ) -> Result<Option<DownloadRequest>, RepositoryError> {
        let kept_packages = if state == RequestState::Finished {
            package_ids.to_vec()
        } else {
            Vec::new()
        };
        let kept_packages = serde_json::to_value(kept_packages)?;

        let updated = sqlx::query(
            r#"
            UPDATE download_requests
            SET state = $2, package_ids = $3, updated_at = NOW()
            WHERE request_id = $1
              AND (state NOT IN ('Finished', 'Error', 'Rejected', 'Expired') OR state = $2)
            RETURNING request_id, requester_rfc, service_kind, state, package_ids,
                      query_params, created_at, updated_at
            "#,
        )
        .bind(request_id.as_str())
        .bind(state.as_str())
        .bind(kept_packages)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return row_to_request(&row).map(Some);
        }

        // Either missing or held terminal by the guard
        let row = sqlx::query(&format!("{} WHERE request_id = $1", SELECT_COLUMNS))
            .bind(request_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn find_non_terminal(&self) -> Result<Vec<DownloadRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{} WHERE state NOT IN ('Finished', 'Error', 'Rejected', 'Expired') ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }
}
