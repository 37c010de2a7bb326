// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Session Cache
//!
//! Process-wide mapping from `(subject, sub-service kind)` to a bound remote
//! session. Lifetime follows the credential (login / logout), not individual
//! requests.
//!
//! ## Invariants
//!
//! - At most one handle per `(subject, kind)`; a put replaces the old handle.
//! - Both handles of a subject live in one map slot, so
//!   [`SessionCache::put_pair`] replaces them in a single write and
//!   [`SessionCache::get_pair`] never observes one new and one stale handle.
//! - Lookups clone the `Arc` out and release the shard lock immediately; no
//!   lock is held while a caller awaits the remote service.

use dashmap::DashMap;
use std::sync::Arc;

use crate::domain::credential::BoundSessions;
use crate::domain::remote::RemoteSession;
use crate::domain::subject::{ServiceKind, SubjectId};

/// Snapshot of a subject's cached handles.
#[derive(Clone, Default)]
pub struct SessionPair {
    pub regular: Option<Arc<dyn RemoteSession>>,
    pub withholding: Option<Arc<dyn RemoteSession>>,
}

impl SessionPair {
    pub fn get(&self, kind: ServiceKind) -> Option<Arc<dyn RemoteSession>> {
        match kind {
            ServiceKind::Regular => self.regular.clone(),
            ServiceKind::Withholding => self.withholding.clone(),
        }
    }

    fn slot_mut(&mut self, kind: ServiceKind) -> &mut Option<Arc<dyn RemoteSession>> {
        match kind {
            ServiceKind::Regular => &mut self.regular,
            ServiceKind::Withholding => &mut self.withholding,
        }
    }

    fn is_empty(&self) -> bool {
        self.regular.is_none() && self.withholding.is_none()
    }
}

impl From<BoundSessions> for SessionPair {
    fn from(sessions: BoundSessions) -> Self {
        Self {
            regular: Some(sessions.regular),
            withholding: Some(sessions.withholding),
        }
    }
}

#[derive(Default)]
pub struct SessionCache {
    sessions: DashMap<SubjectId, SessionPair>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache one handle, replacing any existing handle for `(subject, kind)`.
    pub fn put(&self, subject: &SubjectId, kind: ServiceKind, handle: Arc<dyn RemoteSession>) {
        let mut entry = self.sessions.entry(subject.clone()).or_default();
        *entry.slot_mut(kind) = Some(handle);
    }

    /// Replace every handle of `subject` in one write (re-authentication).
    pub fn put_pair(&self, subject: &SubjectId, pair: SessionPair) {
        self.sessions.insert(subject.clone(), pair);
    }

    /// `None` means "session expired, re-authenticate".
    pub fn get(&self, subject: &SubjectId, kind: ServiceKind) -> Option<Arc<dyn RemoteSession>> {
        self.sessions.get(subject).and_then(|pair| pair.get(kind))
    }

    pub fn get_pair(&self, subject: &SubjectId) -> Option<SessionPair> {
        self.sessions.get(subject).map(|pair| pair.clone())
    }

    /// Drop one handle, or every handle of the subject when `kind` is `None`.
    pub fn invalidate(&self, subject: &SubjectId, kind: Option<ServiceKind>) {
        match kind {
            None => {
                self.sessions.remove(subject);
            }
            Some(kind) => {
                if let Some(mut pair) = self.sessions.get_mut(subject) {
                    *pair.slot_mut(kind) = None;
                }
                self.sessions.remove_if(subject, |_, pair| pair.is_empty());
            }
        }
    }

    pub fn contains(&self, subject: &SubjectId) -> bool {
        self.sessions.contains_key(subject)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
