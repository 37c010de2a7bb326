// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pending Set
//!
//! Working set of requests not yet observed in a terminal state, holding the
//! last locally known view of each. Written by submissions (insert), by
//! verify (refresh, or remove on terminal) and by startup recovery; scanned
//! by the poll scheduler through [`PendingSet::snapshot`] so a sweep never
//! iterates the live collection.
//!
//! The stored view doubles as ownership and provenance evidence for a
//! submission whose registry write failed.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::domain::download_request::{DownloadRequest, RequestId};
use crate::domain::subject::SubjectId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub request_id: RequestId,
    pub subject_id: SubjectId,
}

#[derive(Default)]
pub struct PendingSet {
    // Ordered so snapshots (and therefore sweeps) are deterministic
    entries: RwLock<BTreeMap<RequestId, DownloadRequest>>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a request. Terminal requests are never tracked and an existing
    /// entry is left untouched. Returns whether the request was added.
    pub fn insert(&self, request: DownloadRequest) -> bool {
        if request.is_terminal() {
            return false;
        }
        let mut entries = self.entries.write();
        if entries.contains_key(&request.request_id) {
            return false;
        }
        entries.insert(request.request_id.clone(), request);
        true
    }

    /// Replace the view of a request that is still tracked.
    pub fn refresh(&self, request: DownloadRequest) {
        if let Some(slot) = self.entries.write().get_mut(&request.request_id) {
            *slot = request;
        }
    }

    /// Stop tracking a request. Returns whether it was pending.
    pub fn remove(&self, request_id: &RequestId) -> bool {
        self.entries.write().remove(request_id).is_some()
    }

    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.entries.read().contains_key(request_id)
    }

    /// The tracked view of `request_id`, if it is pending on behalf of `subject_id`.
    pub fn get_owned(&self, request_id: &RequestId, subject_id: &SubjectId) -> Option<DownloadRequest> {
        self.entries
            .read()
            .get(request_id)
            .filter(|request| &request.subject_id == subject_id)
            .cloned()
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<PendingEntry> {
        self.entries
            .read()
            .values()
            .map(|request| PendingEntry {
                request_id: request.request_id.clone(),
                subject_id: request.subject_id.clone(),
            })
            .collect()
    }

    pub fn for_subject(&self, subject_id: &SubjectId) -> Vec<RequestId> {
        self.entries
            .read()
            .values()
            .filter(|request| &request.subject_id == subject_id)
            .map(|request| request.request_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
