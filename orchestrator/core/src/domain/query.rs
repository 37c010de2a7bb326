// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Download Query Parameters
//!
//! Filter parameters for a bulk-download submission. Raw caller input
//! ([`QueryParametersInput`]) is validated into a typed [`QueryParameters`]
//! value; validation collects every violated constraint instead of stopping
//! at the first one.
//!
//! ## Rules
//!
//! - `start` and `end` are required. Accepted formats are
//!   `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and `YYYY-MM-DD`
//!   (a date-only `end` covers the whole day).
//! - `start` must not be after `end`.
//! - `direction` is `issued` or `received` (default `issued`).
//! - `content_type` is `metadata` or `full_document` (default `metadata`).
//! - The counterpart RFC filter is the receiver for issued documents and the
//!   issuer for received documents; supplying the other one is a violation.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::domain::error::FieldViolation;

static RFC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-ZÑ&]{3,4}[0-9]{6}[A-Z0-9]{3}$").expect("RFC pattern is a valid regex")
});

const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Whether the subject issued or received the requested documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadDirection {
    Issued,
    Received,
}

impl DownloadDirection {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "issued" | "emitidos" => Some(Self::Issued),
            "received" | "recibidos" => Some(Self::Received),
            _ => None,
        }
    }
}

/// What the remote service should package: metadata listings or full documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestContentType {
    Metadata,
    FullDocument,
}

impl RequestContentType {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "metadata" => Some(Self::Metadata),
            "full_document" | "fulldocument" | "cfdi" | "xml" => Some(Self::FullDocument),
            _ => None,
        }
    }
}

/// Closed date-time range of the query, in the remote service's local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimePeriod {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Validated filter parameters, retained with the request for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameters {
    pub period: DateTimePeriod,
    pub direction: DownloadDirection,
    pub content_type: RequestContentType,
    /// Receiver RFC for issued queries, issuer RFC for received queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpart_rfc: Option<String>,
}

/// Unvalidated filter parameters as supplied by a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryParametersInput {
    #[serde(default, alias = "fechaInicio")]
    pub start: Option<String>,
    #[serde(default, alias = "fechaFin")]
    pub end: Option<String>,
    #[serde(default, alias = "tipo")]
    pub direction: Option<String>,
    #[serde(default, alias = "requestType")]
    pub content_type: Option<String>,
    #[serde(default, alias = "rfcEmisor")]
    pub issuer_rfc: Option<String>,
    #[serde(default, alias = "rfcReceptor")]
    pub receiver_rfc: Option<String>,
}

impl QueryParametersInput {
    /// Validate into [`QueryParameters`], reporting every violated constraint.
    pub fn validate(&self) -> Result<QueryParameters, Vec<FieldViolation>> {
        let mut violations = Vec::new();

        let start = required_bound("start", self.start.as_deref(), false, &mut violations);
        let end = required_bound("end", self.end.as_deref(), true, &mut violations);

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                violations.push(FieldViolation::new(
                    "end",
                    format!("end ({}) must not be before start ({})", end, start),
                ));
            }
        }

        let direction = match non_empty(self.direction.as_deref()) {
            None => Some(DownloadDirection::Issued),
            Some(raw) => {
                let parsed = DownloadDirection::parse(raw);
                if parsed.is_none() {
                    violations.push(FieldViolation::new(
                        "direction",
                        format!("'{}' is not one of: issued, received", raw),
                    ));
                }
                parsed
            }
        };

        let content_type = match non_empty(self.content_type.as_deref()) {
            None => Some(RequestContentType::Metadata),
            Some(raw) => {
                let parsed = RequestContentType::parse(raw);
                if parsed.is_none() {
                    violations.push(FieldViolation::new(
                        "content_type",
                        format!("'{}' is not one of: metadata, full_document", raw),
                    ));
                }
                parsed
            }
        };

        let issuer = non_empty(self.issuer_rfc.as_deref()).map(str::to_uppercase);
        let receiver = non_empty(self.receiver_rfc.as_deref()).map(str::to_uppercase);
        for (field, value) in [("issuer_rfc", &issuer), ("receiver_rfc", &receiver)] {
            if let Some(rfc) = value {
                if !RFC_PATTERN.is_match(rfc) {
                    violations.push(FieldViolation::new(field, format!("'{}' is not a well-formed RFC", rfc)));
                }
            }
        }

        let counterpart_rfc = match direction {
            Some(DownloadDirection::Issued) => {
                if issuer.is_some() {
                    violations.push(FieldViolation::new(
                        "issuer_rfc",
                        "issuer filter only applies to received documents",
                    ));
                }
                receiver
            }
            Some(DownloadDirection::Received) => {
                if receiver.is_some() {
                    violations.push(FieldViolation::new(
                        "receiver_rfc",
                        "receiver filter only applies to issued documents",
                    ));
                }
                issuer
            }
            None => None,
        };

        match (start, end, direction, content_type) {
            (Some(start), Some(end), Some(direction), Some(content_type)) if violations.is_empty() => {
                Ok(QueryParameters {
                    period: DateTimePeriod { start, end },
                    direction,
                    content_type,
                    counterpart_rfc,
                })
            }
            _ => Err(violations),
        }
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn required_bound(
    field: &str,
    raw: Option<&str>,
    end_of_day: bool,
    violations: &mut Vec<FieldViolation>,
) -> Option<NaiveDateTime> {
    let Some(raw) = non_empty(raw) else {
        violations.push(FieldViolation::new(field, "is required"));
        return None;
    };
    let parsed = parse_bound(raw, end_of_day);
    if parsed.is_none() {
        violations.push(FieldViolation::new(
            field,
            format!("'{}' is not a date (YYYY-MM-DD) or date-time (YYYY-MM-DD HH:MM:SS)", raw),
        ));
    }
    parsed
}

fn parse_bound(raw: &str, end_of_day: bool) -> Option<NaiveDateTime> {
    for format in DATE_TIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    }
}
