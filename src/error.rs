// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error taxonomy for the session core, the content fetchers, and the
//! HTTP gateway.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Malformed input that never reached (or came back garbled from) the remote API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed AT-URI: {0}")]
    Uri(String),

    #[error("Malformed token: {0}")]
    Token(String),

    #[error("Malformed response: {0}")]
    Response(String),
}

/// Failures of login and refresh.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Too many login attempts. Please try again later.")]
    RateLimited,

    #[error("Session refresh failed: {0}")]
    InvalidRefreshToken(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl AuthError {
    /// Stable machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials(_) => "invalid_credentials",
            AuthError::RateLimited => "rate_limited",
            AuthError::InvalidRefreshToken(_) => "invalid_refresh_token",
            AuthError::Network(_) => "network",
            AuthError::Server { .. } => "server",
            AuthError::Storage(_) => "storage",
            AuthError::Parse(_) => "parse",
        }
    }
}

/// Failures of profile and record fetches.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl FetchError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::NotFound(_) => "not_found",
            FetchError::Unauthorized(_) => "unauthorized",
            FetchError::Network(_) => "network",
            FetchError::Server { .. } => "server",
            FetchError::Parse(_) => "parse",
        }
    }
}

/// A post or profile that was still absent after an exhaustive search.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{what} not found: {id}")]
pub struct NotFoundError {
    pub what: &'static str,
    pub id: String,
}

impl NotFoundError {
    pub fn post(uri: impl Into<String>) -> Self {
        Self {
            what: "Post",
            id: uri.into(),
        }
    }
}

/// Outcome of resolving a single post.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PostError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Gateway error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Sessions are disabled")]
    SessionsDisabled,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<PostError> for AppError {
    fn from(err: PostError) -> Self {
        match err {
            PostError::Fetch(e) => AppError::Fetch(e),
            PostError::NotFound(e) => AppError::NotFound(e),
            PostError::Parse(e) => AppError::Parse(e),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::SessionsDisabled => (StatusCode::NOT_FOUND, "sessions_disabled", None),
            AppError::Auth(err) => {
                let status = match err {
                    AuthError::InvalidCredentials(_) | AuthError::InvalidRefreshToken(_) => {
                        StatusCode::UNAUTHORIZED
                    }
                    AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                    AuthError::Storage(_) => {
                        tracing::error!(error = %err, "Token storage error");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, err.reason(), Some(err.to_string()))
            }
            AppError::Fetch(err) => {
                let status = match err {
                    FetchError::NotFound(_) => StatusCode::NOT_FOUND,
                    FetchError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, err.kind(), Some(err.to_string()))
            }
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, "not_found", Some(err.to_string())),
            AppError::Parse(err) => (StatusCode::BAD_REQUEST, "parse_error", Some(err.to_string())),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
