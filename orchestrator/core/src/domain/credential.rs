// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Credential Gate
//!
//! Validates a signing credential (certificate + encrypted private key +
//! passphrase), derives the subject identifier from the credential's
//! embedded identity and yields one bound session per sub-service.
//!
//! The cryptography stays behind this trait; the HTTP gateway adapter in
//! `crate::infrastructure::sat_gateway` is the production implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::domain::error::BrokerError;
use crate::domain::remote::RemoteSession;
use crate::domain::subject::SubjectId;

/// Raw signing credential as uploaded by the taxpayer.
#[derive(Clone, Default)]
pub struct SigningMaterial {
    /// DER certificate bytes (`.cer`).
    pub certificate: Vec<u8>,
    /// Encrypted PKCS#8 private key bytes (`.key`).
    pub private_key: Vec<u8>,
}

impl SigningMaterial {
    /// Reject material with a missing part before any remote round trip.
    pub fn ensure_complete(&self) -> Result<(), BrokerError> {
        if self.certificate.is_empty() || self.private_key.is_empty() {
            return Err(BrokerError::InvalidCredential(
                "both the certificate (.cer) and the private key (.key) are required".to_string(),
            ));
        }
        Ok(())
    }
}

// Never print key material.
impl fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("certificate_len", &self.certificate.len())
            .field("private_key_len", &self.private_key.len())
            .finish()
    }
}

/// One bound session per sub-service, produced together.
#[derive(Clone)]
pub struct BoundSessions {
    pub regular: Arc<dyn RemoteSession>,
    pub withholding: Arc<dyn RemoteSession>,
}

/// Successful authentication result.
#[derive(Clone)]
pub struct AuthenticatedSubject {
    pub subject_id: SubjectId,
    /// End of the credential's validity window, when known.
    pub valid_until: Option<DateTime<Utc>>,
    pub sessions: BoundSessions,
}

#[async_trait]
pub trait CredentialGate: Send + Sync {
    /// Validate the credential and open both bound sessions.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::InvalidCredential`] if the material cannot be parsed or
    ///   the passphrase does not unlock it
    /// - [`BrokerError::ExpiredCredential`] if the validity window has passed
    async fn authenticate(
        &self,
        material: &SigningMaterial,
        passphrase: &str,
    ) -> Result<AuthenticatedSubject, BrokerError>;
}
