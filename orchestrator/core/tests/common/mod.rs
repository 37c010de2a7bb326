// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fakes for the lifecycle and scheduler integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use sat_broker_core::application::{PendingSet, SessionCache, StandardDownloadLifecycleService};
use sat_broker_core::domain::credential::{AuthenticatedSubject, BoundSessions, CredentialGate, SigningMaterial};
use sat_broker_core::domain::download_request::{DownloadRequest, RequestId, RequestState};
use sat_broker_core::domain::error::BrokerError;
use sat_broker_core::domain::query::{QueryParameters, QueryParametersInput};
use sat_broker_core::domain::remote::{
    DownloadResult, PackagesResult, QueryResult, RemoteError, RemoteSession, RemoteStatus, StatusRequest,
    VerifyResult, STATUS_ACCEPTED,
};
use sat_broker_core::domain::repository::{DownloadRequestRepository, RepositoryError};
use sat_broker_core::domain::subject::{ServiceKind, SubjectId};
use sat_broker_core::infrastructure::repositories::InMemoryDownloadRequestRepository;

pub const SUBJECT: &str = "AAA010101AAA";
pub const OTHER_SUBJECT: &str = "BBB020202BBB";

/// Remote code for "request not found in this namespace".
pub const STATUS_NOT_FOUND: i32 = 5004;

/// One sub-service namespace of the remote service, driven by the test.
pub struct ScriptedSession {
    kind: ServiceKind,
    prefix: &'static str,
    issued: AtomicUsize,
    query_status: Mutex<RemoteStatus>,
    /// request id -> (status request code, package ids)
    requests: Mutex<HashMap<String, (i32, Vec<String>)>>,
    unreachable_ids: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
    pub query_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl ScriptedSession {
    pub fn new(kind: ServiceKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            prefix: match kind {
                ServiceKind::Regular => "REG",
                ServiceKind::Withholding => "RET",
            },
            issued: AtomicUsize::new(0),
            query_status: Mutex::new(RemoteStatus::new(STATUS_ACCEPTED, "Solicitud Aceptada")),
            requests: Mutex::new(HashMap::new()),
            unreachable_ids: Mutex::new(HashSet::new()),
            unreachable: AtomicBool::new(false),
            query_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        })
    }

    /// Make the remote side report `code` (and packages) for `request_id`.
    pub fn set_state(&self, request_id: &str, code: i32, packages: &[&str]) {
        self.requests.lock().insert(
            request_id.to_string(),
            (code, packages.iter().map(|p| p.to_string()).collect()),
        );
    }

    pub fn reject_queries(&self, status: RemoteStatus) {
        *self.query_status.lock() = status;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn make_unreachable_for(&self, request_id: &str) {
        self.unreachable_ids.lock().insert(request_id.to_string());
    }

    fn check_reachable(&self, request_id: Option<&str>) -> Result<(), RemoteError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport(format!("{} namespace unreachable", self.kind)));
        }
        if let Some(id) = request_id {
            if self.unreachable_ids.lock().contains(id) {
                return Err(RemoteError::Transport(format!("timeout verifying {}", id)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    fn kind(&self) -> ServiceKind {
        self.kind
    }

    async fn query(&self, _params: &QueryParameters) -> Result<QueryResult, RemoteError> {
        self.check_reachable(None)?;
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let status = self.query_status.lock().clone();
        if !status.is_accepted() {
            return Ok(QueryResult {
                status,
                request_id: None,
                documents_found: None,
            });
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{}-{}", self.prefix, n);
        self.set_state(&id, 1, &[]);
        Ok(QueryResult {
            status,
            request_id: Some(RequestId::new(id)),
            documents_found: Some(7),
        })
    }

    async fn verify(&self, request_id: &RequestId) -> Result<VerifyResult, RemoteError> {
        self.check_reachable(Some(request_id.as_str()))?;
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let known = self.requests.lock().get(request_id.as_str()).cloned();
        Ok(match known {
            Some((code, packages)) => VerifyResult {
                status: RemoteStatus::new(STATUS_ACCEPTED, "Solicitud Aceptada"),
                status_request: StatusRequest {
                    code,
                    message: format!("estado {}", code),
                },
                code_request: Some(STATUS_ACCEPTED),
                documents_count: Some(packages.len() as u64),
                package_ids: Vec::new(),
            },
            None => VerifyResult {
                status: RemoteStatus::new(STATUS_NOT_FOUND, "No se encontró la solicitud"),
                status_request: StatusRequest {
                    code: 0,
                    message: String::new(),
                },
                code_request: None,
                documents_count: None,
                package_ids: Vec::new(),
            },
        })
    }

    async fn packages(&self, request_id: &RequestId) -> Result<PackagesResult, RemoteError> {
        self.check_reachable(Some(request_id.as_str()))?;
        let packages = self
            .requests
            .lock()
            .get(request_id.as_str())
            .map(|(_, p)| p.clone())
            .unwrap_or_default();
        Ok(PackagesResult {
            status: RemoteStatus::new(STATUS_ACCEPTED, "Solicitud Aceptada"),
            package_ids: packages,
        })
    }

    async fn download(&self, package_id: &str) -> Result<DownloadResult, RemoteError> {
        self.check_reachable(None)?;
        let exists = self
            .requests
            .lock()
            .values()
            .any(|(_, packages)| packages.iter().any(|p| p == package_id));
        Ok(if exists {
            DownloadResult {
                status: RemoteStatus::new(STATUS_ACCEPTED, "Solicitud Aceptada"),
                content: format!("zip:{}", package_id).into_bytes(),
            }
        } else {
            DownloadResult {
                status: RemoteStatus::new(STATUS_NOT_FOUND, "No existe el paquete"),
                content: Vec::new(),
            }
        })
    }
}

/// Gate that accepts passphrase "secret" and binds the given sessions.
pub struct StaticGate {
    pub subject: SubjectId,
    pub regular: Arc<ScriptedSession>,
    pub withholding: Arc<ScriptedSession>,
}

#[async_trait]
impl CredentialGate for StaticGate {
    async fn authenticate(
        &self,
        material: &SigningMaterial,
        passphrase: &str,
    ) -> Result<AuthenticatedSubject, BrokerError> {
        material.ensure_complete()?;
        if passphrase != "secret" {
            return Err(BrokerError::InvalidCredential("passphrase does not unlock the key".into()));
        }
        Ok(AuthenticatedSubject {
            subject_id: self.subject.clone(),
            valid_until: None,
            sessions: BoundSessions {
                regular: self.regular.clone(),
                withholding: self.withholding.clone(),
            },
        })
    }
}

/// In-memory registry whose reads and writes can be made to fail.
#[derive(Default)]
pub struct FlakyRepository {
    inner: InMemoryDownloadRequestRepository,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
}

impl FlakyRepository {
    fn write_guard(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database("connection reset".into()));
        }
        Ok(())
    }

    fn read_guard(&self) -> Result<(), RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadRequestRepository for FlakyRepository {
    async fn save(&self, request: &DownloadRequest) -> Result<(), RepositoryError> {
        self.write_guard()?;
        self.inner.save(request).await
    }

    async fn find_by_id(
        &self,
        request_id: &RequestId,
        requester: &SubjectId,
    ) -> Result<Option<DownloadRequest>, RepositoryError> {
        self.read_guard()?;
        self.inner.find_by_id(request_id, requester).await
    }

    async fn find_by_package(
        &self,
        package_id: &str,
        requester: &SubjectId,
    ) -> Result<Option<DownloadRequest>, RepositoryError> {
        self.read_guard()?;
        self.inner.find_by_package(package_id, requester).await
    }

    async fn record_observation(
        &self,
        request_id: &RequestId,
        state: RequestState,
        package_ids: &[String],
    ) -> Result<Option<DownloadRequest>, RepositoryError> {
        self.write_guard()?;
        self.inner.record_observation(request_id, state, package_ids).await
    }

    async fn find_non_terminal(&self) -> Result<Vec<DownloadRequest>, RepositoryError> {
        self.read_guard()?;
        self.inner.find_non_terminal().await
    }
}

pub struct Broker {
    pub service: Arc<StandardDownloadLifecycleService>,
    pub sessions: Arc<SessionCache>,
    pub pending: Arc<PendingSet>,
    pub repository: Arc<FlakyRepository>,
    pub regular: Arc<ScriptedSession>,
    pub withholding: Arc<ScriptedSession>,
    pub subject: SubjectId,
}

pub fn broker() -> Broker {
    broker_with_repository(Arc::new(FlakyRepository::default()))
}

pub fn broker_with_repository(repository: Arc<FlakyRepository>) -> Broker {
    let regular = ScriptedSession::new(ServiceKind::Regular);
    let withholding = ScriptedSession::new(ServiceKind::Withholding);
    let subject = SubjectId::new(SUBJECT);
    let gate = Arc::new(StaticGate {
        subject: subject.clone(),
        regular: regular.clone(),
        withholding: withholding.clone(),
    });
    let sessions = Arc::new(SessionCache::new());
    let pending = Arc::new(PendingSet::new());
    let service = Arc::new(StandardDownloadLifecycleService::new(
        gate,
        sessions.clone(),
        pending.clone(),
        repository.clone(),
    ));
    Broker {
        service,
        sessions,
        pending,
        repository,
        regular,
        withholding,
        subject,
    }
}

pub fn credential() -> SigningMaterial {
    SigningMaterial {
        certificate: b"certificate".to_vec(),
        private_key: b"private-key".to_vec(),
    }
}

pub fn january() -> QueryParametersInput {
    QueryParametersInput {
        start: Some("2024-01-01".into()),
        end: Some("2024-01-31".into()),
        ..Default::default()
    }
}

/// A stored request with no recorded provenance (legacy record).
pub fn legacy_request(id: &str, subject: &str) -> DownloadRequest {
    let params = january().validate().expect("valid params");
    let mut request = DownloadRequest::accepted(RequestId::new(id), SubjectId::new(subject), ServiceKind::Regular, params);
    request.service_kind = None;
    request
}
