// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Download Lifecycle Service
//!
//! Drives a download request from submission to completion against the
//! remote bulk-download service, using the session cached for the request's
//! sub-service.
//!
//! ## Flow
//!
//! ```text
//! login ──► CredentialGate.authenticate ──► SessionCache.put_pair
//!
//! submit ──► session(kind | Regular) ──► validate params ──► remote query
//!              └─► registry.save (failure logged) ──► PendingSet.insert
//!
//! verify ──► registry lookup (ownership, provenance, terminal short-circuit)
//!              └─► remote verify ──► [Finished] remote packages
//!              └─► registry.record_observation ──► PendingSet refresh/remove
//!
//! download ──► registry lookup by package ──► remote download
//! ```
//!
//! ## Session Resolution
//!
//! An explicit kind, or the provenance stored with the request, selects one
//! session directly. When provenance is unknown the call is tried blind:
//! `Regular` first, then `Withholding` on any failure; when both fail the
//! `Withholding` failure is returned. Blind fallback is a degraded path for
//! records written without provenance.
//!
//! No cache lock is held while a remote call is awaited: sessions and pending
//! views are cloned out before each round trip and written back after it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::pending_set::PendingSet;
use crate::application::session_cache::SessionCache;
use crate::domain::credential::{CredentialGate, SigningMaterial};
use crate::domain::download_request::{package_file_name, DownloadRequest, RequestId, RequestState};
use crate::domain::error::BrokerError;
use crate::domain::query::QueryParametersInput;
use crate::domain::remote::{RemoteSession, RemoteStatus, StatusRequest, VerifyResult};
use crate::domain::repository::DownloadRequestRepository;
use crate::domain::subject::{ServiceKind, SubjectId};

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub subject_id: SubjectId,
    pub valid_until: Option<DateTime<Utc>>,
}

/// A request together with what the remote service reported about it.
#[derive(Debug, Clone)]
pub struct RequestReport {
    pub request: DownloadRequest,
    /// Acceptance status of the last remote call; `None` when served from the registry.
    pub status: Option<RemoteStatus>,
    pub status_request: Option<StatusRequest>,
    pub code_request: Option<i32>,
    pub documents_count: Option<u64>,
}

impl RequestReport {
    fn from_registry(request: DownloadRequest) -> Self {
        Self {
            request,
            status: None,
            status_request: None,
            code_request: None,
            documents_count: None,
        }
    }

    /// Human-readable message: `"[<status request>] <status>"` for verify results.
    pub fn message(&self) -> Option<String> {
        match (&self.status_request, &self.status) {
            (Some(sr), Some(status)) => Some(format!("[{}] {}", sr.message, status.message)),
            (None, Some(status)) => Some(status.message.clone()),
            _ => None,
        }
    }
}

/// Decoded package content ready to hand to the caller.
#[derive(Debug, Clone)]
pub struct DownloadedPackage {
    pub package_id: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

#[async_trait]
pub trait DownloadLifecycleService: Send + Sync {
    /// Authenticate a signing credential and cache both bound sessions.
    async fn login(&self, material: SigningMaterial, passphrase: &str) -> Result<LoginOutcome, BrokerError>;

    /// Submit a download query. `kind` defaults to [`ServiceKind::Regular`].
    ///
    /// Not idempotent: callers must not resubmit on an ambiguous failure.
    async fn submit(
        &self,
        subject: &SubjectId,
        kind: Option<ServiceKind>,
        params: &QueryParametersInput,
    ) -> Result<RequestReport, BrokerError>;

    /// Re-check a request's remote status. Safe to repeat.
    async fn verify(
        &self,
        subject: &SubjectId,
        request_id: &RequestId,
        kind: Option<ServiceKind>,
    ) -> Result<RequestReport, BrokerError>;

    /// Fetch one package of a finished request. Persists nothing.
    async fn download(
        &self,
        subject: &SubjectId,
        package_id: &str,
        kind: Option<ServiceKind>,
    ) -> Result<DownloadedPackage, BrokerError>;

    /// Requests of `subject` not yet observed terminal.
    async fn list_pending(&self, subject: &SubjectId) -> Vec<RequestId>;

    /// Forget every cached session of `subject`.
    async fn clear_session(&self, subject: &SubjectId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionRoute {
    Known(ServiceKind),
    Blind,
}

impl SessionRoute {
    fn resolve(explicit: Option<ServiceKind>, recorded: Option<ServiceKind>) -> Self {
        match explicit.or(recorded) {
            Some(kind) => SessionRoute::Known(kind),
            None => SessionRoute::Blind,
        }
    }

    fn candidates(&self) -> &'static [ServiceKind] {
        match self {
            SessionRoute::Known(ServiceKind::Regular) => &[ServiceKind::Regular],
            SessionRoute::Known(ServiceKind::Withholding) => &[ServiceKind::Withholding],
            SessionRoute::Blind => &ServiceKind::ALL,
        }
    }
}

/// What one remote verify round (plus package enumeration) observed.
struct Observation {
    state: RequestState,
    package_ids: Vec<String>,
    verify: VerifyResult,
}

pub struct StandardDownloadLifecycleService {
    gate: Arc<dyn CredentialGate>,
    sessions: Arc<SessionCache>,
    pending: Arc<PendingSet>,
    repository: Arc<dyn DownloadRequestRepository>,
}

impl StandardDownloadLifecycleService {
    pub fn new(
        gate: Arc<dyn CredentialGate>,
        sessions: Arc<SessionCache>,
        pending: Arc<PendingSet>,
        repository: Arc<dyn DownloadRequestRepository>,
    ) -> Self {
        Self {
            gate,
            sessions,
            pending,
            repository,
        }
    }

    pub fn sessions(&self) -> Arc<SessionCache> {
        self.sessions.clone()
    }

    pub fn pending(&self) -> Arc<PendingSet> {
        self.pending.clone()
    }

    /// Re-track every non-terminal request from the registry (startup recovery).
    pub async fn restore_pending(&self) -> Result<usize, BrokerError> {
        let open = self.repository.find_non_terminal().await?;
        let restored = open
            .into_iter()
            .filter(|request| self.pending.insert(request.clone()))
            .count();
        self.record_pending_gauge();
        info!(restored, "Restored pending download requests from registry");
        Ok(restored)
    }

    /// Run `op` against the session(s) selected by `route`.
    ///
    /// Returns the kind whose session succeeded. For blind routes the last
    /// (`Withholding`) failure wins when every candidate fails.
    async fn route_call<T, F, Fut>(
        &self,
        subject: &SubjectId,
        route: SessionRoute,
        op: F,
    ) -> Result<(ServiceKind, T), BrokerError>
    where
        F: Fn(Arc<dyn RemoteSession>) -> Fut,
        Fut: Future<Output = Result<T, BrokerError>>,
    {
        let mut last_error = None;
        for &kind in route.candidates() {
            let Some(session) = self.sessions.get(subject, kind) else {
                last_error = Some(BrokerError::SessionExpired(kind));
                continue;
            };
            match op(session).await {
                Ok(value) => {
                    if route == SessionRoute::Blind {
                        debug!(subject = %subject, kind = %kind, "Blind fallback resolved sub-service");
                    }
                    return Ok((kind, value));
                }
                Err(e) => {
                    if route == SessionRoute::Blind {
                        debug!(subject = %subject, kind = %kind, error = %e, "Blind attempt failed");
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(BrokerError::SessionExpired(ServiceKind::Withholding)))
    }

    async fn observe(&self, session: Arc<dyn RemoteSession>, request_id: &RequestId) -> Result<Observation, BrokerError> {
        let verify = session.verify(request_id).await?;
        verify.status.ensure_accepted()?;

        let state = verify.status_request.state();
        let package_ids = if state == RequestState::Finished {
            let packages = session.packages(request_id).await?;
            packages.status.ensure_accepted()?;
            packages.package_ids
        } else {
            Vec::new()
        };

        Ok(Observation {
            state,
            package_ids,
            verify,
        })
    }

    /// Write an observation back, guarded against terminal regression.
    ///
    /// Write failures are logged and swallowed: the remote observation already
    /// happened and the caller still gets it.
    async fn persist_observation(&self, current: DownloadRequest, observation: &Observation) -> DownloadRequest {
        let mut local = current;
        local.apply_observation(observation.state, observation.package_ids.clone());

        match self
            .repository
            .record_observation(&local.request_id, observation.state, &observation.package_ids)
            .await
        {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                // The submission's registry write was lost; heal it now.
                if let Err(e) = self.repository.save(&local).await {
                    warn!(request_id = %local.request_id, error = %e, "Failed to persist download request");
                }
                local
            }
            Err(e) => {
                warn!(request_id = %local.request_id, error = %e, "Failed to persist verify observation");
                local
            }
        }
    }

    /// Drop a terminal request from the pending set, counting it once.
    fn untrack_terminal(&self, request: &DownloadRequest) {
        if self.pending.remove(&request.request_id) {
            metrics::counter!("sat_broker_requests_completed_total", "state" => request.state.as_str()).increment(1);
            info!(
                request_id = %request.request_id,
                state = %request.state,
                packages = request.package_ids.len(),
                "Download request reached terminal state"
            );
        }
    }

    fn record_pending_gauge(&self) {
        metrics::gauge!("sat_broker_pending_requests").set(self.pending.len() as f64);
    }
}

#[async_trait]
impl DownloadLifecycleService for StandardDownloadLifecycleService {
    async fn login(&self, material: SigningMaterial, passphrase: &str) -> Result<LoginOutcome, BrokerError> {
        material.ensure_complete()?;

        let authenticated = self.gate.authenticate(&material, passphrase).await?;
        let subject_id = authenticated.subject_id.clone();

        // Re-authentication replaces both handles in one write
        self.sessions.put_pair(&subject_id, authenticated.sessions.into());

        info!(subject = %subject_id, "Subject authenticated, sessions cached");
        Ok(LoginOutcome {
            subject_id,
            valid_until: authenticated.valid_until,
        })
    }

    async fn submit(
        &self,
        subject: &SubjectId,
        kind: Option<ServiceKind>,
        params: &QueryParametersInput,
    ) -> Result<RequestReport, BrokerError> {
        let kind = kind.unwrap_or_default();
        let session = self
            .sessions
            .get(subject, kind)
            .ok_or(BrokerError::SessionExpired(kind))?;

        let params = params.validate().map_err(BrokerError::Validation)?;

        debug!(subject = %subject, kind = %kind, ?params, "Submitting download query");
        let result = session.query(&params).await?;
        result.status.ensure_accepted()?;

        let request_id = result.request_id.clone().ok_or_else(|| {
            BrokerError::RemoteUnavailable("accepted query response carried no request id".to_string())
        })?;

        let request = DownloadRequest::accepted(request_id, subject.clone(), kind, params);
        if let Err(e) = self.repository.save(&request).await {
            warn!(request_id = %request.request_id, error = %e, "Failed to persist download request");
        }
        self.pending.insert(request.clone());

        metrics::counter!("sat_broker_requests_submitted_total", "kind" => kind.as_str()).increment(1);
        self.record_pending_gauge();
        info!(
            subject = %subject,
            kind = %kind,
            request_id = %request.request_id,
            documents_found = ?result.documents_found,
            "Download request accepted"
        );

        Ok(RequestReport {
            request,
            status: Some(result.status),
            status_request: None,
            code_request: None,
            documents_count: result.documents_found,
        })
    }

    async fn verify(
        &self,
        subject: &SubjectId,
        request_id: &RequestId,
        kind: Option<ServiceKind>,
    ) -> Result<RequestReport, BrokerError> {
        let stored = match self.repository.find_by_id(request_id, subject).await {
            Ok(stored) => stored,
            // An explicit kind does not need the registry, as long as ownership is evident
            Err(e) if kind.is_some() && self.pending.get_owned(request_id, subject).is_some() => {
                warn!(request_id = %request_id, error = %e, "Registry lookup failed, verifying with explicit kind");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let current = match stored {
            Some(request) if request.is_terminal() => {
                debug!(request_id = %request_id, state = %request.state, "Request already terminal, serving registry record");
                // Another writer may have completed it while it was still tracked here
                self.untrack_terminal(&request);
                self.record_pending_gauge();
                return Ok(RequestReport::from_registry(request));
            }
            Some(request) => request,
            None => self.pending.get_owned(request_id, subject).ok_or_else(|| {
                BrokerError::NotFound(format!("request {} does not belong to {}", request_id, subject))
            })?,
        };

        let route = SessionRoute::resolve(kind, current.service_kind);
        let (used_kind, observation) = self
            .route_call(subject, route, |session| self.observe(session, request_id))
            .await?;

        let request = self.persist_observation(current, &observation).await;

        if request.is_terminal() {
            self.untrack_terminal(&request);
        } else {
            self.pending.refresh(request.clone());
            debug!(request_id = %request_id, kind = %used_kind, state = %request.state, "Download request still pending");
        }
        self.record_pending_gauge();

        Ok(RequestReport {
            request,
            status: Some(observation.verify.status),
            status_request: Some(observation.verify.status_request),
            code_request: observation.verify.code_request,
            documents_count: observation.verify.documents_count,
        })
    }

    async fn download(
        &self,
        subject: &SubjectId,
        package_id: &str,
        kind: Option<ServiceKind>,
    ) -> Result<DownloadedPackage, BrokerError> {
        let owner = self
            .repository
            .find_by_package(package_id, subject)
            .await?
            .ok_or_else(|| BrokerError::NotFound(format!("package {} does not belong to {}", package_id, subject)))?;

        let route = SessionRoute::resolve(kind, owner.service_kind);
        let (used_kind, content) = self
            .route_call(subject, route, |session| async move {
                let result = session.download(package_id).await?;
                result.status.ensure_accepted()?;
                Ok::<_, BrokerError>(result.content)
            })
            .await?;

        metrics::counter!("sat_broker_packages_downloaded_total").increment(1);
        info!(
            subject = %subject,
            kind = %used_kind,
            package_id,
            bytes = content.len(),
            "Package downloaded"
        );

        Ok(DownloadedPackage {
            package_id: package_id.to_string(),
            file_name: package_file_name(package_id),
            content,
        })
    }

    async fn list_pending(&self, subject: &SubjectId) -> Vec<RequestId> {
        self.pending.for_subject(subject)
    }

    async fn clear_session(&self, subject: &SubjectId) {
        self.sessions.invalidate(subject, None);
        info!(subject = %subject, "Sessions cleared");
    }
}
