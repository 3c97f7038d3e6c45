// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auth event fan-out between session manager instances.
//!
//! Each login, logout or refresh writes a short-lived marker into the shared
//! token store and publishes the event on an in-process broadcast bus.
//! Receivers re-read the store and converge on its contents.
//!
//! Delivery is at-most-once per receiver and ordering is last-write-wins;
//! there is no total order across instances. Two instances logging in to
//! different accounts at the same time end up with whichever tokens were
//! written last.

use crate::store::{keys, TokenStore};
use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// How long the stored marker lives before it is cleaned up.
pub const DEFAULT_MARKER_TTL: Duration = Duration::from_secs(1);

const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthEventKind {
    Login,
    Logout,
    Refresh,
}

/// One state change, as broadcast and as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEvent {
    #[serde(rename = "type")]
    pub kind: AuthEventKind,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Instance that caused the change
    pub origin_id: String,
}

/// Publisher and subscription point for auth events. Clones share the bus.
#[derive(Clone)]
pub struct AuthNotifier {
    store: Arc<dyn TokenStore>,
    tx: broadcast::Sender<AuthEvent>,
    marker_ttl: Duration,
}

impl AuthNotifier {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            store,
            tx,
            marker_ttl: DEFAULT_MARKER_TTL,
        }
    }

    pub fn with_marker_ttl(mut self, ttl: Duration) -> Self {
        self.marker_ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Record and broadcast an event from `origin_id`.
    pub fn publish(&self, kind: AuthEventKind, origin_id: &str) -> AuthEvent {
        let event = AuthEvent {
            kind,
            timestamp: Utc::now().timestamp_millis(),
            origin_id: origin_id.to_string(),
        };

        match serde_json::to_string(&event) {
            Ok(marker) => {
                if let Err(e) = self.store.set(keys::AUTH_EVENT, &marker) {
                    tracing::warn!(error = %e, "Failed to store auth event marker");
                } else {
                    self.schedule_marker_cleanup(marker);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode auth event marker"),
        }

        // No receivers is fine.
        let receivers = self.tx.send(event.clone()).unwrap_or(0);
        tracing::debug!(?kind, origin_id, receivers, "Published auth event");

        event
    }

    /// The marker currently in the store, if any.
    pub fn last_event(&self) -> Option<AuthEvent> {
        let raw = self.store.get(keys::AUTH_EVENT)?;
        serde_json::from_str(&raw).ok()
    }

    fn schedule_marker_cleanup(&self, marker: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let ttl = self.marker_ttl;

        runtime.spawn(async move {
            tokio::time::sleep(ttl).await;
            // A newer event may own the key now; leave it alone.
            match store.remove_if(keys::AUTH_EVENT, &marker) {
                Ok(true) => tracing::trace!("Cleared auth event marker"),
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to clear auth event marker"),
            }
        });
    }
}

/// Random identifier for one session manager instance.
pub fn new_origin_id() -> String {
    let mut bytes = [0u8; 8];
    if SystemRandom::new().fill(&mut bytes).is_err() {
        // Only uniqueness within a process matters.
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        bytes = nanos.to_le_bytes();
    }
    hex::encode(bytes)
}
