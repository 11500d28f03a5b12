// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token signing and verification with zero-downtime key rotation.

use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::{AuthError, TokenClaims};

/// HS256 signing keys: the primary secret, plus optionally the previous one
/// accepted during a rotation grace window.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    previous: Option<DecodingKey>,
    grace: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, previous_secret: Option<&str>, grace: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            previous: previous_secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
            grace,
        }
    }

    pub fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Verify a token signature and expiry. Tokens signed with the previous
    /// secret are accepted only while their issue time is within the grace
    /// window; older ones fail with `needs_refresh`.
    pub fn verify(&self, token: &str, now: i64) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        match jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::Expired),
                ErrorKind::InvalidSignature => self.verify_previous(token, &validation, now),
                _ => Err(AuthError::Malformed),
            },
        }
    }

    fn verify_previous(
        &self,
        token: &str,
        validation: &Validation,
        now: i64,
    ) -> Result<TokenClaims, AuthError> {
        let Some(previous) = &self.previous else {
            return Err(AuthError::Malformed);
        };
        match jsonwebtoken::decode::<TokenClaims>(token, previous, validation) {
            Ok(data) => {
                let age = now.saturating_sub(data.claims.iat);
                if !self.grace.is_zero() && age <= self.grace.as_secs() as i64 {
                    Ok(data.claims)
                } else {
                    Err(AuthError::NeedsRefresh)
                }
            }
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::Expired),
                _ => Err(AuthError::Malformed),
            },
        }
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
