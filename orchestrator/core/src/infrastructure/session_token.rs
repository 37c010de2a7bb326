// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::subject::SubjectId;

const ISSUER: &str = "sat-broker";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issued bearer token and its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// HS256 bearer tokens binding API calls to an authenticated subject.
///
/// The token is never trusted on its own: every route also requires the
/// subject to still have cached sessions.
pub struct SessionTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionTokenIssuer {
    pub fn new(secret: &str, ttl_hours: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(anyhow::anyhow!("token secret must not be empty"));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours as i64),
        })
    }

    /// Issue a token for `subject`, never outliving the credential.
    pub fn issue(&self, subject: &SubjectId, valid_until: Option<DateTime<Utc>>) -> Result<IssuedToken> {
        let now = Utc::now();
        let mut expires_at = now + self.ttl;
        if let Some(limit) = valid_until {
            expires_at = expires_at.min(limit);
        }

        let claims = SessionClaims {
            sub: subject.as_str().to_string(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(IssuedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<SubjectId> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.set_issuer(&[ISSUER]);
        validation.leeway = 0;

        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation)?;
        Ok(SubjectId::new(data.claims.sub))
    }
}
