// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Blog post model and record validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lexicon limit for post titles (characters).
pub const MAX_TITLE_CHARS: usize = 120;
/// Lexicon limit for post bodies (characters).
pub const MAX_TEXT_CHARS: usize = 20_000;

/// A blog post, as read from its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Record URI
    pub uri: String,
    /// Content id of the record version that was fetched
    pub cid: String,
    pub title: String,
    /// Markdown body
    pub text: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One page of posts plus the cursor for the next page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Page {
    pub posts: Vec<Post>,
    /// Absent once the end of the collection is reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Record value as stored in the repo. Every field is optional so that
/// schema drift shows up as a rejected record instead of a failed page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPostRecord {
    pub title: Option<String>,
    pub text: Option<String>,
    pub tags: Option<Vec<String>>,
    pub created_at: Option<String>,
}

/// Why a record was not accepted as a post.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRecord {
    #[error("record value is not an object")]
    NotAnObject,
    #[error("record has no title")]
    MissingTitle,
    #[error("record has no text")]
    MissingText,
    #[error("title has {0} characters")]
    TitleTooLong(usize),
    #[error("text has {0} characters")]
    TextTooLong(usize),
}

impl Post {
    /// Build a post from a raw record value.
    ///
    /// A missing or unparseable `createdAt` falls back to `fetched_at`.
    pub fn from_record(
        uri: &str,
        cid: Option<&str>,
        value: &serde_json::Value,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, InvalidRecord> {
        if !value.is_object() {
            return Err(InvalidRecord::NotAnObject);
        }
        let record: BlogPostRecord =
            serde_json::from_value(value.clone()).map_err(|_| InvalidRecord::NotAnObject)?;

        let title = record
            .title
            .filter(|t| !t.is_empty())
            .ok_or(InvalidRecord::MissingTitle)?;
        let text = record
            .text
            .filter(|t| !t.is_empty())
            .ok_or(InvalidRecord::MissingText)?;

        let title_chars = title.chars().count();
        if title_chars > MAX_TITLE_CHARS {
            return Err(InvalidRecord::TitleTooLong(title_chars));
        }
        let text_chars = text.chars().count();
        if text_chars > MAX_TEXT_CHARS {
            return Err(InvalidRecord::TextTooLong(text_chars));
        }

        let created_at = record
            .created_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(fetched_at);

        Ok(Self {
            uri: uri.to_string(),
            cid: cid.unwrap_or_default().to_string(),
            title,
            text,
            tags: record.tags.unwrap_or_default(),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn accepts_well_formed_record() {
        let value = json!({
            "$type": "com.macroblog.blog.post",
            "title": "Hello",
            "text": "# Body",
            "tags": ["rust", "atproto"],
            "createdAt": "2025-01-02T03:04:05.000Z"
        });
        let post = Post::from_record("at://did:plc:abc/c/1", Some("bafy"), &value, now()).unwrap();
        assert_eq!(post.title, "Hello");
        assert_eq!(post.cid, "bafy");
        assert_eq!(post.tags, vec!["rust", "atproto"]);
        assert_eq!(post.created_at.timestamp(), 1_735_787_045);
    }

    #[test]
    fn defaults_tags_and_created_at() {
        let value = json!({ "title": "t", "text": "b" });
        let post = Post::from_record("at://did:plc:abc/c/1", None, &value, now()).unwrap();
        assert!(post.tags.is_empty());
        assert_eq!(post.created_at, now());
        assert_eq!(post.cid, "");
    }

    #[test]
    fn rejects_missing_fields() {
        let cases = [
            (json!({ "text": "b" }), InvalidRecord::MissingTitle),
            (json!({ "title": "t" }), InvalidRecord::MissingText),
            (json!({ "title": "", "text": "b" }), InvalidRecord::MissingTitle),
            (json!("just a string"), InvalidRecord::NotAnObject),
        ];
        for (value, expected) in cases {
            assert_eq!(
                Post::from_record("at://x/c/1", None, &value, now()),
                Err(expected)
            );
        }
    }

    #[test]
    fn rejects_oversized_title() {
        let value = json!({ "title": "x".repeat(121), "text": "b" });
        assert_eq!(
            Post::from_record("at://x/c/1", None, &value, now()),
            Err(InvalidRecord::TitleTooLong(121))
        );
    }
}
