// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Attaches the session's access token to content requests.

use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Access token to send with remote calls made for this request.
/// `None` means fetch anonymously.
#[derive(Debug, Clone, Default)]
pub struct ViewerToken(pub Option<String>);

impl ViewerToken {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Middleware that inserts a [`ViewerToken`] into request extensions.
///
/// The token is refreshed first when it is close to expiry. A failed
/// refresh has already logged the session out, so the request carries on
/// anonymously.
pub async fn attach_viewer_token(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match &state.sessions {
        Some(sessions) => match sessions.valid_access_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(
                    reason = e.reason(),
                    error = %e,
                    "Could not refresh session, continuing anonymously"
                );
                None
            }
        },
        None => None,
    };

    request.extensions_mut().insert(ViewerToken(token));
    next.run(request).await
}
