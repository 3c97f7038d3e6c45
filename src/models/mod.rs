// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod at_uri;
pub mod post;
pub mod profile;
pub mod user;

pub use at_uri::AtUri;
pub use post::{Page, Post};
pub use profile::Profile;
pub use user::{CachedUser, Session};
