// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Download Request Aggregate
//!
//! One submission to the remote bulk-download service.
//!
//! ## Lifecycle
//!
//! ```text
//! submit ──► Accepted ──► InProgress ──► Finished (package ids known)
//!                 │            │
//!                 └────────────┴──► Error | Rejected | Expired
//! ```
//!
//! ## Invariants
//!
//! - `request_id` is assigned by the remote service and never changes.
//! - `package_ids` stays empty until the state is `Finished`; a finished
//!   request with no packages is valid (zero matching documents).
//! - Terminal states never transition. [`DownloadRequest::apply_observation`]
//!   ignores any later observation that would move a terminal request, so a
//!   racing poll cannot roll `Finished` back to `InProgress`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::query::QueryParameters;
use crate::domain::subject::{ServiceKind, SubjectId};

/// Remote-assigned identifier of a download request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local mirror of the remote status-request code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    Accepted,
    InProgress,
    Finished,
    Error,
    Rejected,
    Expired,
    Unknown,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Finished | RequestState::Error | RequestState::Rejected | RequestState::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Accepted => "Accepted",
            RequestState::InProgress => "InProgress",
            RequestState::Finished => "Finished",
            RequestState::Error => "Error",
            RequestState::Rejected => "Rejected",
            RequestState::Expired => "Expired",
            RequestState::Unknown => "Unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "Accepted" => RequestState::Accepted,
            "InProgress" => RequestState::InProgress,
            "Finished" => RequestState::Finished,
            "Error" => RequestState::Error,
            "Rejected" => RequestState::Rejected,
            "Expired" => RequestState::Expired,
            _ => RequestState::Unknown,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of applying a verify observation to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationOutcome {
    /// State and/or package ids were updated.
    Applied,
    /// The request was already terminal with a different state; nothing changed.
    IgnoredTerminal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub request_id: RequestId,
    pub subject_id: SubjectId,
    /// Sub-service whose session created the request; `None` when provenance was not recorded.
    pub service_kind: Option<ServiceKind>,
    pub state: RequestState,
    pub package_ids: Vec<String>,
    pub query_params: QueryParameters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DownloadRequest {
    /// A freshly accepted submission.
    pub fn accepted(
        request_id: RequestId,
        subject_id: SubjectId,
        service_kind: ServiceKind,
        query_params: QueryParameters,
    ) -> Self {
        let now = Utc::now();
        Self {
            request_id,
            subject_id,
            service_kind: Some(service_kind),
            state: RequestState::Accepted,
            package_ids: Vec::new(),
            query_params,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply a verify observation, refusing to move a terminal request.
    ///
    /// Re-observing the same terminal state refreshes `package_ids`, so a
    /// repeated enumeration of a finished request stays consistent.
    pub fn apply_observation(&mut self, state: RequestState, package_ids: Vec<String>) -> ObservationOutcome {
        if self.state.is_terminal() && self.state != state {
            return ObservationOutcome::IgnoredTerminal;
        }
        self.state = state;
        self.package_ids = if state == RequestState::Finished {
            package_ids
        } else {
            Vec::new()
        };
        self.updated_at = Utc::now();
        ObservationOutcome::Applied
    }
}

/// Deterministic download file name for a package.
pub fn package_file_name(package_id: &str) -> String {
    format!("paquete_{}.zip", package_id)
}
