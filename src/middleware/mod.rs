// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (viewer token, security headers).

pub mod security;
pub mod viewer;

pub use viewer::{attach_viewer_token, ViewerToken};
