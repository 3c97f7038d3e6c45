// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read-only access to JWT claims.
//!
//! Tokens come straight from the XRPC service over TLS and are only used to
//! schedule refreshes, so the payload is decoded without checking the
//! signature. Nothing here should be used to make an authorization decision.

use crate::error::ParseError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Claims we care about in an access token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    /// Account DID
    pub sub: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: Option<i64>,
    /// Issued at (Unix timestamp)
    pub iat: Option<i64>,
    pub scope: Option<String>,
}

/// Decode the payload segment of a compact JWT.
pub fn decode_claims(token: &str) -> Result<TokenClaims, ParseError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ParseError::Token("expected three segments".to_string()));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ParseError::Token(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| ParseError::Token(format!("payload is not a JSON object: {e}")))
}

/// Expiry of `token`, if it can be read.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    decode_claims(token)
        .ok()?
        .exp
        .and_then(|exp| DateTime::from_timestamp(exp, 0))
}

/// True once `now` is within `margin` of the token's expiry. A token whose
/// expiry cannot be read counts as expired.
pub fn is_token_expired(token: &str, now: DateTime<Utc>, margin: Duration) -> bool {
    match expires_at(token) {
        // An expiry too close to the minimum timestamp is already past.
        Some(exp) => exp.checked_sub_signed(margin).is_none_or(|t| now >= t),
        None => {
            tracing::debug!("Could not read token expiry, treating as expired");
            true
        }
    }
}
