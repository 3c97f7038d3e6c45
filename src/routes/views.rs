// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read-only content views: home, search, blog listing and single post.

use crate::config::AuthMode;
use crate::error::{FetchError, Result};
use crate::middleware::ViewerToken;
use crate::models::{Post, Profile, Session};
use crate::services::posts::ListOptions;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(home))
        .route("/search", get(search))
        .route("/blog/{handle}", get(blog))
        .route("/post/{handle}/{uri}", get(post))
}

/// Path of the single-post view for `uri` under `handle`.
pub fn post_path(handle: &str, uri: &str) -> String {
    format!(
        "/post/{}/{}",
        urlencoding::encode(handle),
        urlencoding::encode(uri)
    )
}

// ─── Home ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HomeResponse {
    pub service: &'static str,
    pub service_url: String,
    pub sessions_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Session>,
}

async fn home(State(state): State<Arc<AppState>>) -> Json<HomeResponse> {
    Json(HomeResponse {
        service: "macroblog",
        service_url: state.config.service_url.clone(),
        sessions_enabled: state.config.auth_mode == AuthMode::Session,
        user: state.sessions.as_ref().and_then(|s| s.current_session()),
    })
}

// ─── Search ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<Profile>,
}

/// Resolve the query as a handle or DID. Unknown accounts are an empty
/// result, not an error.
async fn search(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<ViewerToken>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let query = params.q.trim().trim_start_matches('@').to_string();
    if query.is_empty() {
        return Ok(Json(SearchResponse {
            query,
            results: Vec::new(),
        }));
    }

    let results = match state.profiles.fetch(&query, viewer.as_deref()).await {
        Ok(profile) => vec![profile],
        Err(FetchError::NotFound(_)) => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    tracing::debug!(query = %query, found = results.len(), "Profile search");
    Ok(Json(SearchResponse { query, results }))
}

// ─── Blog ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BlogParams {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

/// A post in a listing, with the path of its own view.
#[derive(Serialize)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    pub path: String,
}

#[derive(Serialize)]
pub struct BlogResponse {
    pub profile: Profile,
    pub posts: Vec<PostSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

async fn blog(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<ViewerToken>,
    Path(handle): Path<String>,
    Query(params): Query<BlogParams>,
) -> Result<Json<BlogResponse>> {
    let token = viewer.as_deref();
    let profile = state.profiles.fetch(&handle, token).await?;

    let options = ListOptions {
        limit: params.limit,
        cursor: params.cursor.filter(|c| !c.is_empty()),
        access_token: viewer.0.clone(),
    };
    let page = state.posts.list_page(&profile.did, &options).await?;

    let posts = page
        .posts
        .into_iter()
        .map(|post| PostSummary {
            path: post_path(&profile.handle, &post.uri),
            post,
        })
        .collect();

    Ok(Json(BlogResponse {
        profile,
        posts,
        cursor: page.cursor,
    }))
}

// ─── Single post ─────────────────────────────────────────────

#[derive(Serialize)]
pub struct PostResponse {
    pub post: Post,
    pub author: Profile,
}

async fn post(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<ViewerToken>,
    Path((handle, uri)): Path<(String, String)>,
) -> Result<Json<PostResponse>> {
    let token = viewer.as_deref();
    let post = state.posts.get_by_uri(&uri, token).await?;
    let author = state.profiles.fetch(&handle, token).await?;

    Ok(Json(PostResponse { post, author }))
}
