// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! XRPC client for the handful of endpoints Macroblog calls.
//!
//! Handles:
//! - Session creation and refresh
//! - Profile lookup
//! - Record get/list
//! - Mapping non-success responses to a typed error

use crate::error::{FetchError, ParseError};
use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;

pub const CREATE_SESSION: &str = "com.atproto.server.createSession";
pub const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";
pub const GET_PROFILE: &str = "app.bsky.actor.getProfile";
pub const GET_RECORD: &str = "com.atproto.repo.getRecord";
pub const LIST_RECORDS: &str = "com.atproto.repo.listRecords";

/// Failure of a single XRPC call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum XrpcError {
    /// Connection, TLS or timeout failure.
    #[error("XRPC request failed: {0}")]
    Transport(String),

    /// Non-success status. `error` is the XRPC error name when the body had one.
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        error: Option<String>,
        message: String,
    },

    #[error("XRPC response parse error: {0}")]
    Decode(String),
}

impl From<XrpcError> for FetchError {
    fn from(err: XrpcError) -> Self {
        match err {
            XrpcError::Transport(msg) => FetchError::Network(msg),
            XrpcError::Decode(msg) => FetchError::Parse(ParseError::Response(msg)),
            // The API answers 400 for unknown actors and missing records.
            XrpcError::Status {
                status: 400 | 404,
                message,
                ..
            } => FetchError::NotFound(message),
            XrpcError::Status {
                status: 401 | 403,
                message,
                ..
            } => FetchError::Unauthorized(message),
            XrpcError::Status {
                status, message, ..
            } => FetchError::Server { status, message },
        }
    }
}

/// XRPC error body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Thin XRPC client.
#[derive(Clone)]
pub struct XrpcClient {
    http: reqwest::Client,
    base_url: String,
}

impl XrpcClient {
    /// Create a client for `service_url` whose every request is bounded by `timeout`.
    pub fn new(service_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building XRPC HTTP client")?;

        Ok(Self {
            http,
            base_url: service_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.base_url, nsid)
    }

    /// Exchange an identifier and app password for a token pair.
    pub async fn create_session(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SessionOutput, XrpcError> {
        let body = serde_json::json!({
            "identifier": identifier,
            "password": password,
        });

        let response = self
            .http
            .post(self.endpoint(CREATE_SESSION))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        self.check_response_json(response).await
    }

    /// Rotate the token pair. The refresh JWT is the bearer credential.
    pub async fn refresh_session(&self, refresh_jwt: &str) -> Result<SessionOutput, XrpcError> {
        let response = self
            .http
            .post(self.endpoint(REFRESH_SESSION))
            .bearer_auth(refresh_jwt)
            .send()
            .await
            .map_err(transport_error)?;

        self.check_response_json(response).await
    }

    /// Look up a profile by handle or DID.
    pub async fn get_profile(
        &self,
        actor: &str,
        access_token: Option<&str>,
    ) -> Result<ProfileView, XrpcError> {
        self.get_json(GET_PROFILE, &[("actor", actor.to_string())], access_token)
            .await
    }

    /// Fetch a single record.
    pub async fn get_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
        access_token: Option<&str>,
    ) -> Result<RecordOutput, XrpcError> {
        self.get_json(
            GET_RECORD,
            &[
                ("repo", repo.to_string()),
                ("collection", collection.to_string()),
                ("rkey", rkey.to_string()),
            ],
            access_token,
        )
        .await
    }

    /// List one page of a repo collection.
    pub async fn list_records(
        &self,
        repo: &str,
        collection: &str,
        limit: u32,
        cursor: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<ListRecordsOutput, XrpcError> {
        let mut query = vec![
            ("repo", repo.to_string()),
            ("collection", collection.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        self.get_json(LIST_RECORDS, &query, access_token).await
    }

    /// Generic GET query with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        nsid: &str,
        query: &[(&str, String)],
        access_token: Option<&str>,
    ) -> Result<T, XrpcError> {
        let mut request = self.http.get(self.endpoint(nsid)).query(query);
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;
        self.check_response_json(response).await
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, XrpcError> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
            let (error, message) = match parsed {
                Some(ErrorBody { error, message }) => {
                    let message = message
                        .or_else(|| error.clone())
                        .unwrap_or_else(|| body.clone());
                    (error, message)
                }
                None => (None, body),
            };

            if status.as_u16() == 429 {
                tracing::warn!("XRPC rate limit hit (429)");
            }

            return Err(XrpcError::Status {
                status: status.as_u16(),
                error,
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| XrpcError::Decode(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> XrpcError {
    if e.is_timeout() {
        XrpcError::Transport(format!("request timed out: {e}"))
    } else {
        XrpcError::Transport(e.to_string())
    }
}

/// `createSession` / `refreshSession` output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutput {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

/// `getProfile` output (the fields we use).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub description: Option<String>,
    pub followers_count: Option<u64>,
    pub follows_count: Option<u64>,
    pub posts_count: Option<u64>,
}

/// A record as returned by `getRecord` and inside `listRecords`.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordOutput {
    pub uri: String,
    pub cid: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// `listRecords` output.
#[derive(Debug, Clone, Deserialize)]
pub struct ListRecordsOutput {
    #[serde(default)]
    pub records: Vec<RecordOutput>,
    pub cursor: Option<String>,
}
