// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile lookup by handle or DID.

use crate::error::FetchError;
use crate::models::Profile;
use crate::services::xrpc::{ProfileView, XrpcClient};

/// Fetches profiles. No caching and no retries; the caller decides.
#[derive(Clone)]
pub struct ProfileFetcher {
    xrpc: XrpcClient,
}

impl ProfileFetcher {
    pub fn new(xrpc: XrpcClient) -> Self {
        Self { xrpc }
    }

    /// Fetch the profile for `handle_or_did`, authenticated if a token is given.
    pub async fn fetch(
        &self,
        handle_or_did: &str,
        access_token: Option<&str>,
    ) -> Result<Profile, FetchError> {
        let actor = handle_or_did.trim().trim_start_matches('@');
        if actor.is_empty() {
            return Err(FetchError::NotFound("empty handle".to_string()));
        }

        let view = self
            .xrpc
            .get_profile(actor, access_token)
            .await
            .map_err(|e| {
                tracing::debug!(actor, error = %e, "Profile lookup failed");
                FetchError::from(e)
            })?;

        Ok(profile_from_view(view))
    }

    /// DIDs pass through; handles are resolved through their profile.
    pub async fn resolve_did(
        &self,
        handle_or_did: &str,
        access_token: Option<&str>,
    ) -> Result<String, FetchError> {
        let actor = handle_or_did.trim();
        if actor.starts_with("did:") {
            return Ok(actor.to_string());
        }
        Ok(self.fetch(actor, access_token).await?.did)
    }
}

fn profile_from_view(view: ProfileView) -> Profile {
    let display_name = view
        .display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| view.handle.clone());

    Profile {
        did: view.did,
        handle: view.handle,
        display_name,
        avatar: view.avatar.unwrap_or_default(),
        description: view.description,
        followers_count: view.followers_count,
        follows_count: view.follows_count,
        posts_count: view.posts_count,
    }
}
