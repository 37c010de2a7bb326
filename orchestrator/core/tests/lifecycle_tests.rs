// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use sat_broker_core::application::DownloadLifecycleService;
use sat_broker_core::domain::credential::SigningMaterial;
use sat_broker_core::domain::download_request::{RequestId, RequestState};
use sat_broker_core::domain::error::BrokerError;
use sat_broker_core::domain::query::QueryParametersInput;
use sat_broker_core::domain::remote::{RemoteStatus, STATUS_QUOTA_EXHAUSTED};
use sat_broker_core::domain::repository::DownloadRequestRepository;
use sat_broker_core::domain::subject::{ServiceKind, SubjectId};

#[tokio::test]
async fn test_full_request_lifecycle() {
    let b = broker();
    let login = b.service.login(credential(), "secret").await.unwrap();
    assert_eq!(login.subject_id, b.subject);

    let submitted = b.service.submit(&b.subject, None, &january()).await.unwrap();
    let id = submitted.request.request_id.clone();
    assert_eq!(submitted.request.state, RequestState::Accepted);
    assert_eq!(submitted.request.service_kind, Some(ServiceKind::Regular));
    assert_eq!(submitted.documents_count, Some(7));
    assert_eq!(b.service.list_pending(&b.subject).await, vec![id.clone()]);

    b.regular.set_state(id.as_str(), 2, &[]);
    let report = b.service.verify(&b.subject, &id, None).await.unwrap();
    assert_eq!(report.request.state, RequestState::InProgress);
    assert_eq!(report.message().as_deref(), Some("[estado 2] Solicitud Aceptada"));
    assert!(b.pending.contains(&id));

    b.regular.set_state(id.as_str(), 3, &["PKG_01", "PKG_02"]);
    let report = b.service.verify(&b.subject, &id, None).await.unwrap();
    assert_eq!(report.request.state, RequestState::Finished);
    assert_eq!(report.request.package_ids, vec!["PKG_01", "PKG_02"]);
    assert!(!b.pending.contains(&id));

    let package = b.service.download(&b.subject, "PKG_02", None).await.unwrap();
    assert_eq!(package.file_name, "paquete_PKG_02.zip");
    assert_eq!(package.content, b"zip:PKG_02");

    // Finished requests are served from the registry without a remote round trip
    let calls = b.regular.verify_calls.load(Ordering::SeqCst);
    let again = b.service.verify(&b.subject, &id, None).await.unwrap();
    assert_eq!(again.request.state, RequestState::Finished);
    assert_eq!(again.request.package_ids, report.request.package_ids);
    assert!(again.status.is_none());
    assert_eq!(b.regular.verify_calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn test_submit_routes_to_requested_namespace() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();

    let report = b
        .service
        .submit(&b.subject, Some(ServiceKind::Withholding), &january())
        .await
        .unwrap();
    assert_eq!(report.request.service_kind, Some(ServiceKind::Withholding));
    assert_eq!(b.withholding.query_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b.regular.query_calls.load(Ordering::SeqCst), 0);

    // Provenance decides the session on verify
    let id = report.request.request_id;
    b.withholding.set_state(id.as_str(), 2, &[]);
    b.service.verify(&b.subject, &id, None).await.unwrap();
    assert_eq!(b.regular.verify_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_login_requires_complete_credential() {
    let b = broker();
    let err = b
        .service
        .login(
            SigningMaterial {
                certificate: b"certificate".to_vec(),
                private_key: Vec::new(),
            },
            "secret",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::InvalidCredential(_)));

    let err = b.service.login(credential(), "wrong").await.unwrap_err();
    assert!(matches!(err, BrokerError::InvalidCredential(_)));
    assert!(!b.sessions.contains(&b.subject));
}

#[tokio::test]
async fn test_submit_without_session_is_session_expired() {
    let b = broker();
    let err = b.service.submit(&b.subject, None, &january()).await.unwrap_err();
    assert!(matches!(err, BrokerError::SessionExpired(ServiceKind::Regular)));
    assert!(b.pending.is_empty());
}

#[tokio::test]
async fn test_logout_drops_both_sessions() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();
    b.service.clear_session(&b.subject).await;

    for kind in ServiceKind::ALL {
        let err = b.service.submit(&b.subject, Some(kind), &january()).await.unwrap_err();
        assert!(matches!(err, BrokerError::SessionExpired(k) if k == kind));
    }
}

#[tokio::test]
async fn test_validation_reports_every_violation_without_remote_call() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();

    let params = QueryParametersInput {
        start: Some("2024-02-01".into()),
        end: Some("2024-01-01".into()),
        direction: Some("sideways".into()),
        ..Default::default()
    };
    let err = b.service.submit(&b.subject, None, &params).await.unwrap_err();
    match err {
        BrokerError::Validation(violations) => assert!(violations.len() >= 2, "{violations:?}"),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(b.regular.query_calls.load(Ordering::SeqCst), 0);
    assert!(b.pending.is_empty());
    assert!(b.repository.find_non_terminal().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_quota_exhaustion_is_distinguished() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();
    b.regular
        .reject_queries(RemoteStatus::new(STATUS_QUOTA_EXHAUSTED, "Se agotó las solicitudes de por vida"));

    let err = b.service.submit(&b.subject, None, &january()).await.unwrap_err();
    assert!(matches!(err, BrokerError::QuotaExceeded { code: 5002, .. }));
    assert!(b.pending.is_empty());
}

#[tokio::test]
async fn test_finished_with_zero_packages_is_terminal() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();
    let id = b.service.submit(&b.subject, None, &january()).await.unwrap().request.request_id;

    b.regular.set_state(id.as_str(), 3, &[]);
    let report = b.service.verify(&b.subject, &id, None).await.unwrap();
    assert_eq!(report.request.state, RequestState::Finished);
    assert!(report.request.package_ids.is_empty());
    assert!(b.pending.is_empty());
}

#[tokio::test]
async fn test_failed_states_are_removed_from_pending() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();

    for (code, state) in [(4, RequestState::Error), (5, RequestState::Rejected), (6, RequestState::Expired)] {
        let id = b.service.submit(&b.subject, None, &january()).await.unwrap().request.request_id;
        b.regular.set_state(id.as_str(), code, &[]);
        let report = b.service.verify(&b.subject, &id, None).await.unwrap();
        assert_eq!(report.request.state, state);
        assert!(!b.pending.contains(&id));
    }
}

#[tokio::test]
async fn test_blind_fallback_resolves_withholding_request() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();
    b.repository.save(&legacy_request("RET-77", SUBJECT)).await.unwrap();
    b.withholding.set_state("RET-77", 3, &["RET-77_01"]);

    let report = b.service.verify(&b.subject, &RequestId::new("RET-77"), None).await.unwrap();
    assert_eq!(report.request.state, RequestState::Finished);
    assert_eq!(b.regular.verify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b.withholding.verify_calls.load(Ordering::SeqCst), 1);

    // Provenance learned through fallback is not written back
    let stored = b
        .repository
        .find_by_id(&RequestId::new("RET-77"), &b.subject)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.service_kind, None);

    let package = b.service.download(&b.subject, "RET-77_01", None).await.unwrap();
    assert_eq!(package.content, b"zip:RET-77_01");
}

#[tokio::test]
async fn test_blind_fallback_reports_second_failure() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();
    b.repository.save(&legacy_request("LOST-1", SUBJECT)).await.unwrap();
    b.withholding.set_unreachable(true);

    // Regular rejects (unknown request), withholding is unreachable
    let err = b.service.verify(&b.subject, &RequestId::new("LOST-1"), None).await.unwrap_err();
    assert!(matches!(err, BrokerError::RemoteUnavailable(_)), "{err:?}");
}

#[tokio::test]
async fn test_explicit_kind_skips_fallback() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();
    b.repository.save(&legacy_request("RET-5", SUBJECT)).await.unwrap();
    b.withholding.set_state("RET-5", 2, &[]);

    let err = b
        .service
        .verify(&b.subject, &RequestId::new("RET-5"), Some(ServiceKind::Regular))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::RemoteRejected { code: 5004, .. }));
    assert_eq!(b.withholding.verify_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_persistence_write_failure_is_swallowed_and_healed() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();
    b.repository.fail_writes.store(true, Ordering::SeqCst);

    let id = b.service.submit(&b.subject, None, &january()).await.unwrap().request.request_id;
    assert!(b.pending.contains(&id));
    assert!(b.repository.find_by_id(&id, &b.subject).await.unwrap().is_none());

    b.repository.fail_writes.store(false, Ordering::SeqCst);
    b.regular.set_state(id.as_str(), 2, &[]);
    let report = b.service.verify(&b.subject, &id, None).await.unwrap();
    assert_eq!(report.request.state, RequestState::InProgress);

    let healed = b.repository.find_by_id(&id, &b.subject).await.unwrap().unwrap();
    assert_eq!(healed.state, RequestState::InProgress);
    assert_eq!(healed.service_kind, Some(ServiceKind::Regular));
}

#[tokio::test]
async fn test_persistence_read_failure_is_fatal_without_kind() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();
    let id = b.service.submit(&b.subject, None, &january()).await.unwrap().request.request_id;
    b.regular.set_state(id.as_str(), 2, &[]);
    b.repository.fail_reads.store(true, Ordering::SeqCst);

    let err = b.service.verify(&b.subject, &id, None).await.unwrap_err();
    assert!(matches!(err, BrokerError::Persistence(_)));

    // An explicit kind does not need the registry for a request this process submitted
    let report = b
        .service
        .verify(&b.subject, &id, Some(ServiceKind::Regular))
        .await
        .unwrap();
    assert_eq!(report.request.state, RequestState::InProgress);
}

#[tokio::test]
async fn test_foreign_requests_and_packages_are_not_found() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();
    let id = b.service.submit(&b.subject, None, &january()).await.unwrap().request.request_id;
    b.regular.set_state(id.as_str(), 3, &["PKG_X"]);
    b.service.verify(&b.subject, &id, None).await.unwrap();

    let stranger = SubjectId::new(OTHER_SUBJECT);
    let err = b.service.verify(&stranger, &id, None).await.unwrap_err();
    assert!(matches!(err, BrokerError::NotFound(_)));
    let err = b.service.download(&stranger, "PKG_X", None).await.unwrap_err();
    assert!(matches!(err, BrokerError::NotFound(_)));

    let err = b.service.download(&b.subject, "PKG_UNKNOWN", None).await.unwrap_err();
    assert!(matches!(err, BrokerError::NotFound(_)));
}

#[tokio::test]
async fn test_relogin_replaces_session_pair() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();
    let first = b.sessions.get_pair(&b.subject).unwrap();

    b.service.login(credential(), "secret").await.unwrap();
    let second = b.sessions.get_pair(&b.subject).unwrap();

    assert!(first.regular.is_some() && second.regular.is_some());
    assert!(second.withholding.is_some());
    assert_eq!(b.sessions.len(), 1);
}

#[tokio::test]
async fn test_restore_pending_from_registry() {
    let repository = Arc::new(FlakyRepository::default());
    repository.save(&legacy_request("OPEN-1", SUBJECT)).await.unwrap();
    let mut finished = legacy_request("DONE-1", SUBJECT);
    finished.apply_observation(RequestState::Finished, vec!["DONE-1_01".into()]);
    repository.save(&finished).await.unwrap();

    let b = broker_with_repository(repository);
    let restored = b.service.restore_pending().await.unwrap();

    assert_eq!(restored, 1);
    assert!(b.pending.contains(&RequestId::new("OPEN-1")));
    assert!(!b.pending.contains(&RequestId::new("DONE-1")));
}

#[tokio::test]
async fn test_verify_of_request_completed_elsewhere_untracks_it() {
    let b = broker();
    b.service.login(credential(), "secret").await.unwrap();
    let submitted = b.service.submit(&b.subject, None, &january()).await.unwrap().request;
    let id = submitted.request_id.clone();

    // Another broker instance on the same registry finished it
    let mut finished = submitted.clone();
    finished.apply_observation(RequestState::Finished, vec!["PKG_09".to_string()]);
    b.repository.save(&finished).await.unwrap();

    let report = b.service.verify(&b.subject, &id, None).await.unwrap();
    assert_eq!(report.request.state, RequestState::Finished);
    assert_eq!(report.request.package_ids, vec!["PKG_09"]);
    assert!(!b.pending.contains(&id));
    assert!(b.service.list_pending(&b.subject).await.is_empty());
    assert_eq!(b.regular.verify_calls.load(Ordering::SeqCst), 0);
}
