// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session routes: login, logout, refresh and the current session.

use crate::error::{AppError, Result};
use crate::models::Session;
use crate::services::AuthState;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Session routes. They answer `sessions_disabled` when auth is off.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/session", get(get_session))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
}

/// Login request body.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Handle or email
    #[validate(length(min = 1, max = 256))]
    pub identifier: String,
    /// App password
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

/// Current session state.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub state: AuthState,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

async fn get_session(State(state): State<Arc<AppState>>) -> Result<Json<SessionResponse>> {
    let sessions = state.sessions()?;
    let session = sessions.current_session();

    Ok(Json(SessionResponse {
        state: sessions.state(),
        authenticated: session.is_some(),
        session,
        last_error: sessions.last_error(),
    }))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Session>> {
    let sessions = state.sessions()?;
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let session = sessions.login(&req.identifier, &req.password).await?;
    Ok(Json(session))
}

async fn logout(State(state): State<Arc<AppState>>) -> Result<Json<SessionResponse>> {
    let sessions = state.sessions()?;
    sessions.logout().await;

    Ok(Json(SessionResponse {
        state: sessions.state(),
        authenticated: false,
        session: None,
        last_error: None,
    }))
}

async fn refresh(State(state): State<Arc<AppState>>) -> Result<Json<Session>> {
    let sessions = state.sessions()?;
    let session = sessions.refresh().await?;
    Ok(Json(session))
}
