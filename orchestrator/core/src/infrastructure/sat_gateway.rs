// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! SAT Signing Gateway Client
//!
//! HTTP/JSON adapter for the signing gateway that holds the remote protocol's
//! cryptography and SOAP codec. It implements both boundary traits of the
//! domain layer:
//!
//! - [`HttpSatGateway`] is the [`CredentialGate`]: it exchanges the uploaded
//!   credential for the subject's RFC and one session token per sub-service.
//! - [`GatewaySession`] is a bound [`RemoteSession`] carrying one of those
//!   tokens.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Reach the remote bulk-download service
//! - **Integration:** Broker → Signing gateway (HTTP/JSON) → Remote service (SOAP)
//!
//! # Endpoints
//!
//! | Method | Path                  | Body                                      |
//! |--------|-----------------------|-------------------------------------------|
//! | POST   | `/sessions`           | base64 `certificate`, `private_key`, `passphrase` |
//! | POST   | `/{kind}/query`       | query parameters                           |
//! | POST   | `/{kind}/verify`      | `request_id`                               |
//! | POST   | `/{kind}/packages`    | `request_id`                               |
//! | POST   | `/{kind}/download`    | `package_id`; content returned base64      |

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::broker_config::GatewayConfig;
use crate::domain::credential::{AuthenticatedSubject, BoundSessions, CredentialGate, SigningMaterial};
use crate::domain::download_request::RequestId;
use crate::domain::error::BrokerError;
use crate::domain::query::QueryParameters;
use crate::domain::remote::{
    DownloadResult, PackagesResult, QueryResult, RemoteError, RemoteSession, RemoteStatus, VerifyResult,
};
use crate::domain::subject::{ServiceKind, SubjectId};

#[derive(Serialize)]
struct SessionGrantRequest<'a> {
    certificate: String,
    private_key: String,
    passphrase: &'a str,
}

#[derive(Deserialize)]
struct SessionGrant {
    rfc: String,
    #[serde(default)]
    valid_until: Option<DateTime<Utc>>,
    sessions: SessionTokens,
}

#[derive(Deserialize)]
struct SessionTokens {
    regular: String,
    withholding: String,
}

#[derive(Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct RequestRef<'a> {
    request_id: &'a str,
}

#[derive(Serialize)]
struct PackageRef<'a> {
    package_id: &'a str,
}

#[derive(Deserialize)]
struct DownloadPayload {
    status: RemoteStatus,
    #[serde(default)]
    content: Option<String>,
}

fn build_client(config: &GatewayConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()
}

/// Credential gate backed by the signing gateway.
pub struct HttpSatGateway {
    base_url: String,
    client: Client,
}

impl HttpSatGateway {
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            client: build_client(config)?,
        })
    }

    fn bind(&self, kind: ServiceKind, token: String) -> Arc<dyn RemoteSession> {
        Arc::new(GatewaySession {
            base_url: self.base_url.clone(),
            client: self.client.clone(),
            kind,
            token,
        })
    }
}

#[async_trait]
impl CredentialGate for HttpSatGateway {
    async fn authenticate(
        &self,
        material: &SigningMaterial,
        passphrase: &str,
    ) -> Result<AuthenticatedSubject, BrokerError> {
        material.ensure_complete()?;

        let body = SessionGrantRequest {
            certificate: STANDARD.encode(&material.certificate),
            private_key: STANDARD.encode(&material.private_key),
            passphrase,
        };

        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| BrokerError::RemoteUnavailable(format!("signing gateway unreachable: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            let body: GatewayErrorBody = response.json().await.unwrap_or(GatewayErrorBody {
                error: String::new(),
                message: format!("credential rejected ({})", status),
            });
            return Err(match body.error.as_str() {
                "expired_credential" => BrokerError::ExpiredCredential(body.message),
                _ => BrokerError::InvalidCredential(body.message),
            });
        }
        if !status.is_success() {
            return Err(BrokerError::RemoteUnavailable(format!(
                "signing gateway returned {}",
                status
            )));
        }

        let grant: SessionGrant = response
            .json()
            .await
            .map_err(|e| BrokerError::RemoteUnavailable(format!("malformed session grant: {}", e)))?;

        if let Some(valid_until) = grant.valid_until {
            if valid_until <= Utc::now() {
                return Err(BrokerError::ExpiredCredential(format!(
                    "credential expired at {}",
                    valid_until.to_rfc3339()
                )));
            }
        }

        let subject_id = SubjectId::new(grant.rfc);
        debug!(subject = %subject_id, "Signing gateway granted sessions");

        Ok(AuthenticatedSubject {
            subject_id,
            valid_until: grant.valid_until,
            sessions: BoundSessions {
                regular: self.bind(ServiceKind::Regular, grant.sessions.regular),
                withholding: self.bind(ServiceKind::Withholding, grant.sessions.withholding),
            },
        })
    }
}

/// Bound session for one sub-service, authorised by a gateway session token.
pub struct GatewaySession {
    base_url: String,
    client: Client,
    kind: ServiceKind,
    token: String,
}

impl GatewaySession {
    async fn call<B, R>(&self, operation: &str, body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}/{}", self.base_url, self.kind.as_str(), operation);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::SessionRejected(self.kind)),
            status if !status.is_success() => Err(RemoteError::Transport(format!(
                "{} {} returned {}",
                self.kind, operation, status
            ))),
            _ => response
                .json::<R>()
                .await
                .map_err(|e| RemoteError::Protocol(format!("{} {}: {}", self.kind, operation, e))),
        }
    }
}

#[async_trait]
impl RemoteSession for GatewaySession {
    fn kind(&self) -> ServiceKind {
        self.kind
    }

    async fn query(&self, params: &QueryParameters) -> Result<QueryResult, RemoteError> {
        self.call("query", params).await
    }

    async fn verify(&self, request_id: &RequestId) -> Result<VerifyResult, RemoteError> {
        self.call(
            "verify",
            &RequestRef {
                request_id: request_id.as_str(),
            },
        )
        .await
    }

    async fn packages(&self, request_id: &RequestId) -> Result<PackagesResult, RemoteError> {
        self.call(
            "packages",
            &RequestRef {
                request_id: request_id.as_str(),
            },
        )
        .await
    }

    async fn download(&self, package_id: &str) -> Result<DownloadResult, RemoteError> {
        let payload: DownloadPayload = self.call("download", &PackageRef { package_id }).await?;
        let content = match payload.content.as_deref() {
            Some(encoded) if payload.status.is_accepted() => STANDARD
                .decode(encoded)
                .map_err(|e| RemoteError::Protocol(format!("package content is not base64: {}", e)))?,
            _ => Vec::new(),
        };
        Ok(DownloadResult {
            status: payload.status,
            content,
        })
    }
}
