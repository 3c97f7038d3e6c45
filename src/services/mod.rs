// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - session, remote API and content logic.

pub mod notifier;
pub mod posts;
pub mod profile;
pub mod session;
pub mod token;
pub mod xrpc;

pub use notifier::{AuthEvent, AuthEventKind, AuthNotifier};
pub use posts::{ListOptions, PostService};
pub use profile::ProfileFetcher;
pub use session::{AuthState, BackgroundTask, SessionManager};
pub use xrpc::{XrpcClient, XrpcError};
