// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Macroblog: long-form blog posts stored in AT Protocol repos
//!
//! This crate provides the session core (login, refresh, cross-instance
//! propagation), the post and profile fetchers, and a small JSON gateway
//! over them.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod time_utils;

use anyhow::Context;
use config::{AuthMode, Config};
use services::{AuthNotifier, PostService, ProfileFetcher, SessionManager, XrpcClient};
use std::sync::Arc;
use store::TokenStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// `None` when sessions are disabled.
    pub sessions: Option<Arc<SessionManager>>,
    pub profiles: ProfileFetcher,
    pub posts: PostService,
}

impl AppState {
    /// Wire the services for `config` on top of `store`.
    pub fn new(config: Config, store: Arc<dyn TokenStore>) -> anyhow::Result<Self> {
        let xrpc = XrpcClient::new(&config.service_url, config.http_timeout)
            .context("Failed to create XRPC client")?;

        let sessions = match config.auth_mode {
            AuthMode::Session => {
                let notifier = AuthNotifier::new(store);
                Some(Arc::new(SessionManager::from_config(
                    &config,
                    xrpc.clone(),
                    notifier,
                )))
            }
            AuthMode::Disabled => None,
        };

        Ok(Self {
            profiles: ProfileFetcher::new(xrpc.clone()),
            posts: PostService::new(xrpc, config.post_collection.clone()),
            sessions,
            config,
        })
    }

    /// Session manager, or `SessionsDisabled` for read-only deployments.
    pub fn sessions(&self) -> error::Result<&Arc<SessionManager>> {
        self.sessions
            .as_ref()
            .ok_or(error::AppError::SessionsDisabled)
    }
}
