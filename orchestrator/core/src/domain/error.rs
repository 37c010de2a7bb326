// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Broker Error Taxonomy
//!
//! Typed failures surfaced by the credential gate and the download lifecycle
//! service. Interactive callers receive these directly; the poll scheduler
//! downgrades all of them to a logged per-entry skip.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::repository::RepositoryError;
use crate::domain::subject::ServiceKind;

/// A single violated field constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Credential expired: {0}")]
    ExpiredCredential(String),

    #[error("Session for service '{0}' has expired, authenticate again")]
    SessionExpired(ServiceKind),

    #[error("Invalid query parameters: {}", format_violations(.0))]
    Validation(Vec<FieldViolation>),

    #[error("Remote service rejected the operation ({code}): {message}")]
    RemoteRejected { code: i32, message: String },

    #[error("Remote request quota exhausted ({code}): {message}")]
    QuotaExceeded { code: i32, message: String },

    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),
}

impl BrokerError {
    /// Stable machine-readable kind, used by the HTTP surface and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BrokerError::InvalidCredential(_) => "invalid_credential",
            BrokerError::ExpiredCredential(_) => "expired_credential",
            BrokerError::SessionExpired(_) => "session_expired",
            BrokerError::Validation(_) => "validation_error",
            BrokerError::RemoteRejected { .. } => "remote_rejected",
            BrokerError::QuotaExceeded { .. } => "quota_exceeded",
            BrokerError::RemoteUnavailable(_) => "remote_unavailable",
            BrokerError::NotFound(_) => "not_found",
            BrokerError::Persistence(_) => "persistence_error",
        }
    }
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
