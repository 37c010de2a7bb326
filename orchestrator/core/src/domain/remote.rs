// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Remote Bulk-Download Service Boundary
//!
//! The remote service answers every operation with an acceptance status plus
//! an operation-specific payload. These are modelled as flat tagged records
//! rather than a class hierarchy; the wire codec lives behind
//! [`RemoteSession`] in `crate::infrastructure::sat_gateway`.
//!
//! A [`RemoteSession`] is the opaque bound-session capability: it authorises
//! calls into one sub-service on behalf of one subject. Handles are owned by
//! the session cache and are never serialised.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::download_request::{RequestId, RequestState};
use crate::domain::error::BrokerError;
use crate::domain::query::QueryParameters;
use crate::domain::subject::ServiceKind;

/// Status code the remote service uses for an accepted operation.
pub const STATUS_ACCEPTED: i32 = 5000;

/// Status code for "lifetime request quota exhausted".
pub const STATUS_QUOTA_EXHAUSTED: i32 = 5002;

/// Acceptance status attached to every remote response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub code: i32,
    pub message: String,
}

impl RemoteStatus {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.code == STATUS_ACCEPTED
    }

    /// Turn a non-accepted status into the matching typed failure.
    pub fn ensure_accepted(&self) -> Result<(), BrokerError> {
        if self.is_accepted() {
            return Ok(());
        }
        if self.code == STATUS_QUOTA_EXHAUSTED {
            return Err(BrokerError::QuotaExceeded {
                code: self.code,
                message: self.message.clone(),
            });
        }
        Err(BrokerError::RemoteRejected {
            code: self.code,
            message: self.message.clone(),
        })
    }
}

/// The remote "status request" part of a verify response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    /// Raw remote code: 1 accepted, 2 in progress, 3 finished, 4 failure, 5 rejected, 6 expired.
    pub code: i32,
    pub message: String,
}

impl StatusRequest {
    pub fn state(&self) -> RequestState {
        match self.code {
            1 => RequestState::Accepted,
            2 => RequestState::InProgress,
            3 => RequestState::Finished,
            4 => RequestState::Error,
            5 => RequestState::Rejected,
            6 => RequestState::Expired,
            _ => RequestState::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub status: RemoteStatus,
    pub request_id: Option<RequestId>,
    /// Documents matched at submission time, when the remote reports it.
    #[serde(default)]
    pub documents_found: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub status: RemoteStatus,
    pub status_request: StatusRequest,
    /// Domain-specific code of the request itself (e.g. 5000, 5004 "no data").
    #[serde(default)]
    pub code_request: Option<i32>,
    #[serde(default)]
    pub documents_count: Option<u64>,
    #[serde(default)]
    pub package_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagesResult {
    pub status: RemoteStatus,
    #[serde(default)]
    pub package_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResult {
    pub status: RemoteStatus,
    /// Decoded package bytes; empty when the status is not accepted.
    pub content: Vec<u8>,
}

/// Transport or protocol failure talking to the remote service.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed remote response: {0}")]
    Protocol(String),

    /// The remote no longer honours the bound session.
    #[error("{0} session rejected by the remote service")]
    SessionRejected(ServiceKind),
}

impl From<RemoteError> for BrokerError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::SessionRejected(kind) => BrokerError::SessionExpired(kind),
            other => BrokerError::RemoteUnavailable(other.to_string()),
        }
    }
}

/// Bound remote session for one (subject, sub-service) pair.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// The sub-service namespace this session is bound to.
    fn kind(&self) -> ServiceKind;

    /// Submit a download query.
    async fn query(&self, params: &QueryParameters) -> Result<QueryResult, RemoteError>;

    /// Check the status of a previously submitted request.
    async fn verify(&self, request_id: &RequestId) -> Result<VerifyResult, RemoteError>;

    /// Enumerate the packages of a finished request.
    async fn packages(&self, request_id: &RequestId) -> Result<PackagesResult, RemoteError>;

    /// Download one package.
    async fn download(&self, package_id: &str) -> Result<DownloadResult, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_request_mapping() {
        let cases = [
            (1, RequestState::Accepted),
            (2, RequestState::InProgress),
            (3, RequestState::Finished),
            (4, RequestState::Error),
            (5, RequestState::Rejected),
            (6, RequestState::Expired),
            (0, RequestState::Unknown),
            (42, RequestState::Unknown),
        ];
        for (code, expected) in cases {
            let sr = StatusRequest { code, message: String::new() };
            assert_eq!(sr.state(), expected, "code {}", code);
        }
    }

    #[test]
    fn test_quota_status_is_distinguished() {
        let err = RemoteStatus::new(STATUS_QUOTA_EXHAUSTED, "Se agotó las solicitudes de por vida")
            .ensure_accepted()
            .unwrap_err();
        assert!(matches!(err, BrokerError::QuotaExceeded { code: 5002, .. }));
    }

    #[test]
    fn test_other_statuses_are_rejections() {
        let err = RemoteStatus::new(5005, "Solicitud duplicada").ensure_accepted().unwrap_err();
        match err {
            BrokerError::RemoteRejected { code, message } => {
                assert_eq!(code, 5005);
                assert_eq!(message, "Solicitud duplicada");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(RemoteStatus::new(STATUS_ACCEPTED, "ok").ensure_accepted().is_ok());
    }
}
