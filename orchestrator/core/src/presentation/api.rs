// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # HTTP API
//!
//! | Method | Path                   | Handler                                   |
//! |--------|------------------------|-------------------------------------------|
//! | POST   | `/api/auth/login`      | multipart `cer`, `key`, `password` → token |
//! | POST   | `/api/auth/logout`     | drop cached sessions                      |
//! | POST   | `/api/requests`        | submit a download query                   |
//! | GET    | `/api/requests`        | pending requests of the caller            |
//! | GET    | `/api/requests/{id}`   | verify (`?kind=regular\|withholding`)     |
//! | GET    | `/api/packages/{id}`   | download a package as `application/zip`   |
//! | GET    | `/health`              | liveness                                  |
//!
//! Every `/api` route except login requires `Authorization: Bearer <token>`
//! and a subject whose sessions are still cached.

use axum::{
    extract::{FromRequestParts, Multipart, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

use crate::application::download_lifecycle::{DownloadLifecycleService, RequestReport};
use crate::application::session_cache::SessionCache;
use crate::domain::credential::SigningMaterial;
use crate::domain::download_request::{DownloadRequest, RequestId};
use crate::domain::error::BrokerError;
use crate::domain::query::QueryParametersInput;
use crate::domain::subject::{ServiceKind, SubjectId};
use crate::infrastructure::session_token::SessionTokenIssuer;

pub struct AppState {
    pub lifecycle: Arc<dyn DownloadLifecycleService>,
    pub sessions: Arc<SessionCache>,
    pub tokens: Arc<SessionTokenIssuer>,
    pub start_time: Instant,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/requests", post(submit_handler).get(list_pending_handler))
        .route("/api/requests/{id}", get(verify_handler))
        .route("/api/packages/{id}", get(download_handler))
        .with_state(Arc::new(state))
}

/// API-level failure: a domain error or a rejection before the domain is reached.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Broker(e) => match e {
                BrokerError::InvalidCredential(_)
                | BrokerError::ExpiredCredential(_)
                | BrokerError::SessionExpired(_) => StatusCode::UNAUTHORIZED,
                BrokerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                BrokerError::NotFound(_) => StatusCode::NOT_FOUND,
                BrokerError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
                BrokerError::RemoteRejected { .. } | BrokerError::RemoteUnavailable(_) => StatusCode::BAD_GATEWAY,
                BrokerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Broker(e) => e.kind(),
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let mut body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        if let ApiError::Broker(BrokerError::Validation(violations)) = &self {
            body["violations"] = json!(violations);
        }
        (status, Json(body)).into_response()
    }
}

/// Subject resolved from a verified bearer token.
pub struct AuthenticatedCaller(pub SubjectId);

impl FromRequestParts<Arc<AppState>> for AuthenticatedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        let subject = state.tokens.verify(token.trim()).map_err(|e| {
            warn!(error = %e, "Rejected bearer token");
            ApiError::Unauthorized("invalid or expired token".to_string())
        })?;

        if !state.sessions.contains(&subject) {
            return Err(ApiError::Unauthorized("no active session, log in again".to_string()));
        }
        Ok(AuthenticatedCaller(subject))
    }
}

#[derive(Debug, Deserialize)]
pub struct KindQuery {
    #[serde(default)]
    pub kind: Option<ServiceKind>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    #[serde(default)]
    pub kind: Option<ServiceKind>,
    #[serde(flatten)]
    pub params: QueryParametersInput,
}

#[derive(Serialize)]
struct LoginResponse {
    subject_id: SubjectId,
    token: String,
    expires_at: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct RequestView<'a> {
    #[serde(flatten)]
    request: &'a DownloadRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code_request: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    documents_count: Option<u64>,
}

impl<'a> RequestView<'a> {
    fn new(report: &'a RequestReport) -> Self {
        Self {
            request: &report.request,
            status_code: report.status.as_ref().map(|s| s.code),
            message: report.message(),
            code_request: report.code_request,
            documents_count: report.documents_count,
        }
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut material = SigningMaterial::default();
    let mut passphrase = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "cer" => material.certificate = read_bytes(field).await?,
            "key" => material.private_key = read_bytes(field).await?,
            "password" => {
                passphrase = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("unreadable password field: {}", e)))?
            }
            _ => {}
        }
    }

    let outcome = state.lifecycle.login(material, &passphrase).await?;
    let issued = state
        .tokens
        .issue(&outcome.subject_id, outcome.valid_until)
        .map_err(|e| ApiError::Internal(format!("failed to issue token: {}", e)))?;

    Ok(Json(LoginResponse {
        subject_id: outcome.subject_id,
        token: issued.token,
        expires_at: issued.expires_at,
        valid_until: outcome.valid_until,
    }))
}

async fn read_bytes(field: axum::extract::multipart::Field<'_>) -> Result<Vec<u8>, ApiError> {
    field
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|e| ApiError::BadRequest(format!("unreadable upload: {}", e)))
}

async fn logout_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(subject): AuthenticatedCaller,
) -> StatusCode {
    state.lifecycle.clear_session(&subject).await;
    StatusCode::NO_CONTENT
}

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(subject): AuthenticatedCaller,
    Json(body): Json<SubmitBody>,
) -> Result<Response, ApiError> {
    let report = state.lifecycle.submit(&subject, body.kind, &body.params).await?;
    Ok((StatusCode::CREATED, Json(RequestView::new(&report))).into_response())
}

async fn list_pending_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(subject): AuthenticatedCaller,
) -> Json<serde_json::Value> {
    let pending = state.lifecycle.list_pending(&subject).await;
    Json(json!({ "pending": pending }))
}

async fn verify_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(subject): AuthenticatedCaller,
    Path(id): Path<String>,
    Query(query): Query<KindQuery>,
) -> Result<Response, ApiError> {
    let report = state
        .lifecycle
        .verify(&subject, &RequestId::new(id), query.kind)
        .await?;
    Ok(Json(RequestView::new(&report)).into_response())
}

async fn download_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedCaller(subject): AuthenticatedCaller,
    Path(id): Path<String>,
    Query(query): Query<KindQuery>,
) -> Result<Response, ApiError> {
    let package = state.lifecycle.download(&subject, &id, query.kind).await?;
    let disposition = format!("attachment; filename=\"{}\"", package.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        package.content,
    )
        .into_response())
}
