// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! `at://` record URIs.

use crate::error::ParseError;
use std::fmt;
use std::str::FromStr;

/// A record address of the form `at://<authority>/<collection>/<rkey>`.
///
/// The authority is either a DID or a handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtUri {
    pub authority: String,
    pub collection: String,
    pub rkey: String,
}

impl AtUri {
    pub fn parse(uri: &str) -> Result<Self, ParseError> {
        let rest = uri
            .trim()
            .strip_prefix("at://")
            .ok_or_else(|| ParseError::Uri(format!("missing at:// scheme: {uri}")))?;

        // Query and fragment are not part of a record address.
        let rest = rest.split(['?', '#']).next().unwrap_or_default();

        let mut parts = rest.split('/');
        let authority = parts.next().unwrap_or_default();
        let collection = parts.next().unwrap_or_default();
        let rkey = parts.next().unwrap_or_default();

        if parts.next().is_some() {
            return Err(ParseError::Uri(format!("too many path segments: {uri}")));
        }
        if authority.is_empty() {
            return Err(ParseError::Uri(format!("missing authority: {uri}")));
        }
        if collection.is_empty() || rkey.is_empty() {
            return Err(ParseError::Uri(format!(
                "expected at://<repo>/<collection>/<rkey>: {uri}"
            )));
        }

        Ok(Self {
            authority: authority.to_string(),
            collection: collection.to_string(),
            rkey: rkey.to_string(),
        })
    }

    /// True if the authority is a DID rather than a handle.
    pub fn has_did_authority(&self) -> bool {
        self.authority.starts_with("did:")
    }

    /// Same collection and record key, ignoring how the repo is named.
    pub fn same_record(&self, other: &AtUri) -> bool {
        self.collection == other.collection && self.rkey == other.rkey
    }
}

impl FromStr for AtUri {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}/{}/{}", self.authority, self.collection, self.rkey)
    }
}
