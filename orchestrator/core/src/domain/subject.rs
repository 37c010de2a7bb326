// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Subject Identity & Sub-Service Kinds
//!
//! A [`SubjectId`] is the taxpayer identifier (RFC) derived from a validated
//! signing credential. It is the single key used by every downstream
//! component: the session cache, the request registry and the pending set.
//!
//! The remote bulk-download service exposes two independent namespaces,
//! modelled as [`ServiceKind`]. Each needs its own bound session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Taxpayer identifier (RFC) of an authenticated subject.
///
/// Only the credential gate constructs these from credential material; the
/// HTTP layer rebuilds them from verified bearer tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(rfc: impl Into<String>) -> Self {
        Self(rfc.into().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote sub-service namespace a session (and every request it creates) belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Regular CFDI documents.
    #[default]
    #[serde(alias = "cfdi")]
    Regular,
    /// Withholding (retenciones) documents.
    #[serde(alias = "retenciones")]
    Withholding,
}

impl ServiceKind {
    /// Fixed order used by blind fallback.
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Regular, ServiceKind::Withholding];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Regular => "regular",
            ServiceKind::Withholding => "withholding",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "regular" | "cfdi" => Ok(ServiceKind::Regular),
            "withholding" | "retenciones" => Ok(ServiceKind::Withholding),
            other => Err(format!("unknown service kind '{}'", other)),
        }
    }
}
