// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Blog post listing and single-post resolution.
//!
//! Handles:
//! - Cursor pagination over the post collection of one repo
//! - Dropping records that do not look like posts
//! - Direct record lookup with a paginated-scan fallback

use crate::error::{FetchError, NotFoundError, PostError};
use crate::models::{AtUri, Page, Post};
use crate::services::profile::ProfileFetcher;
use crate::services::xrpc::{RecordOutput, XrpcClient};
use crate::time_utils::{Clock, SystemClock};
use futures_util::stream::{self, Stream};
use std::collections::HashSet;
use std::sync::Arc;

/// Page size when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;
/// Largest page the service will return.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Options for one `list_page` call.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    pub access_token: Option<String>,
}

impl ListOptions {
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

/// Clamp a requested page size to `1..=MAX_PAGE_LIMIT`.
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

/// Reads posts out of repo collections.
#[derive(Clone)]
pub struct PostService {
    xrpc: XrpcClient,
    profiles: ProfileFetcher,
    collection: String,
    clock: Arc<dyn Clock>,
}

impl PostService {
    pub fn new(xrpc: XrpcClient, collection: impl Into<String>) -> Self {
        Self {
            profiles: ProfileFetcher::new(xrpc.clone()),
            xrpc,
            collection: collection.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fetch one page of posts from `repo` (a handle or DID).
    pub async fn list_page(&self, repo: &str, options: &ListOptions) -> Result<Page, FetchError> {
        let token = options.access_token.as_deref();
        let did = self.profiles.resolve_did(repo, token).await?;
        let limit = clamp_limit(options.limit);

        let output = self
            .xrpc
            .list_records(
                &did,
                &self.collection,
                limit,
                options.cursor.as_deref(),
                token,
            )
            .await?;

        let fetched = output.records.len();
        let posts = self.accept_records(output.records);

        tracing::debug!(
            repo = %did,
            fetched,
            accepted = posts.len(),
            has_cursor = output.cursor.is_some(),
            "Listed posts"
        );

        Ok(Page {
            posts,
            cursor: output.cursor.filter(|c| !c.is_empty()),
        })
    }

    /// Follow cursors until the collection is exhausted.
    ///
    /// Duplicate uris are dropped, and the walk stops if the server hands
    /// back a cursor it has already given.
    pub async fn list_all(
        &self,
        repo: &str,
        access_token: Option<&str>,
    ) -> Result<Vec<Post>, FetchError> {
        let did = self.profiles.resolve_did(repo, access_token).await?;

        let mut options = ListOptions {
            limit: Some(MAX_PAGE_LIMIT),
            cursor: None,
            access_token: access_token.map(str::to_string),
        };
        let mut seen_uris = HashSet::new();
        let mut seen_cursors = HashSet::new();
        let mut posts = Vec::new();

        loop {
            let page = self.list_page(&did, &options).await?;
            posts.extend(
                page.posts
                    .into_iter()
                    .filter(|p| seen_uris.insert(p.uri.clone())),
            );

            match page.cursor {
                Some(cursor) if seen_cursors.insert(cursor.clone()) => {
                    options.cursor = Some(cursor);
                }
                Some(cursor) => {
                    tracing::warn!(repo = %did, cursor = %cursor, "Cursor repeated, stopping");
                    break;
                }
                None => break,
            }
        }

        Ok(posts)
    }

    /// Stream pages of `repo` starting from `options.cursor`. The stream
    /// ends after the page without a cursor or after the first error.
    pub fn stream<'a>(
        &'a self,
        repo: &'a str,
        options: ListOptions,
    ) -> impl Stream<Item = Result<Page, FetchError>> + 'a {
        enum Step {
            Next(ListOptions),
            Done,
        }

        stream::unfold(Step::Next(options), move |step| async move {
            let Step::Next(mut options) = step else {
                return None;
            };

            match self.list_page(repo, &options).await {
                Ok(page) => {
                    let next = match &page.cursor {
                        Some(cursor) if options.cursor.as_ref() != Some(cursor) => {
                            options.cursor = Some(cursor.clone());
                            Step::Next(options)
                        }
                        _ => Step::Done,
                    };
                    Some((Ok(page), next))
                }
                Err(e) => Some((Err(e), Step::Done)),
            }
        })
    }

    /// Resolve one post by its record URI.
    ///
    /// Tries a direct `getRecord` first. If that fails for any reason, pages
    /// through the repo's post collection looking for the record.
    pub async fn get_by_uri(
        &self,
        uri: &str,
        access_token: Option<&str>,
    ) -> Result<Post, PostError> {
        let target = AtUri::parse(uri)?;

        match self.get_direct(&target, access_token).await {
            Ok(post) => return Ok(post),
            Err(e) => {
                tracing::info!(uri, error = %e, "Direct record lookup failed, scanning collection");
            }
        }

        let did = if target.has_did_authority() {
            target.authority.clone()
        } else {
            self.profiles
                .resolve_did(&target.authority, access_token)
                .await?
        };
        let mut options = ListOptions {
            limit: Some(MAX_PAGE_LIMIT),
            cursor: None,
            access_token: access_token.map(str::to_string),
        };
        let mut seen_cursors = HashSet::new();

        loop {
            let page = self.list_page(&did, &options).await?;

            let found = page.posts.into_iter().find(|p| {
                p.uri == uri || AtUri::parse(&p.uri).is_ok_and(|u| u.same_record(&target))
            });
            if let Some(post) = found {
                return Ok(post);
            }

            match page.cursor {
                Some(cursor) if seen_cursors.insert(cursor.clone()) => {
                    options.cursor = Some(cursor);
                }
                _ => break,
            }
        }

        Err(NotFoundError::post(uri).into())
    }

    async fn get_direct(
        &self,
        target: &AtUri,
        access_token: Option<&str>,
    ) -> Result<Post, PostError> {
        let record = self
            .xrpc
            .get_record(
                &target.authority,
                &target.collection,
                &target.rkey,
                access_token,
            )
            .await
            .map_err(FetchError::from)?;

        let uri = record.uri.clone();
        self.accept_record(record)
            .ok_or_else(|| NotFoundError::post(uri).into())
    }

    fn accept_records(&self, records: Vec<RecordOutput>) -> Vec<Post> {
        records
            .into_iter()
            .filter_map(|r| self.accept_record(r))
            .collect()
    }

    fn accept_record(&self, record: RecordOutput) -> Option<Post> {
        match Post::from_record(
            &record.uri,
            record.cid.as_deref(),
            &record.value,
            self.clock.now(),
        ) {
            Ok(post) => Some(post),
            Err(reason) => {
                tracing::debug!(uri = %record.uri, %reason, "Skipping malformed post record");
                None
            }
        }
    }
}
