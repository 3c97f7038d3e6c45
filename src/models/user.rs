//! Session and cached-user models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Profile;

/// An authenticated session for one account.
///
/// Tokens are never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Account DID (stable user identifier)
    pub did: String,
    /// Human-readable handle
    pub handle: String,
    /// Display name, once the profile has been fetched
    pub display_name: Option<String>,
    /// Avatar URL, once the profile has been fetched
    pub avatar: Option<String>,
    /// Short-lived access JWT
    #[serde(skip_serializing)]
    pub access_jwt: String,
    /// Long-lived refresh JWT
    #[serde(skip_serializing)]
    pub refresh_jwt: String,
    /// Expiry read from the access token's `exp` claim
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Copy display fields from a freshly fetched profile.
    pub fn apply_profile(&mut self, profile: &Profile) {
        if profile.did != self.did {
            return;
        }
        self.handle = profile.handle.clone();
        self.display_name = Some(profile.display_name.clone());
        self.avatar = (!profile.avatar.is_empty()).then(|| profile.avatar.clone());
    }

    /// Copy display fields from the persisted user blob, if it is the same account.
    pub fn apply_cached(&mut self, cached: &CachedUser) {
        if cached.did != self.did {
            return;
        }
        self.handle = cached.handle.clone();
        self.display_name = cached.display_name.clone();
        self.avatar = cached.avatar.clone();
    }
}

/// User profile blob persisted next to the tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedUser {
    pub did: String,
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl From<&Session> for CachedUser {
    fn from(session: &Session) -> Self {
        Self {
            did: session.did.clone(),
            handle: session.handle.clone(),
            display_name: session.display_name.clone(),
            avatar: session.avatar.clone(),
        }
    }
}
