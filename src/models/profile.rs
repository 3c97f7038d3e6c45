//! Account profile model.

use serde::{Deserialize, Serialize};

/// Public profile of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub did: String,
    pub handle: String,
    /// Falls back to the handle when the account has none.
    pub display_name: String,
    /// Empty when the account has no avatar.
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follows_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts_count: Option<u64>,
}
