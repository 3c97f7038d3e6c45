// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Which authentication mode is active is an explicit setting here, chosen
//! once at startup and injected into everything that needs it.

use std::env;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default XRPC service (PDS / entryway).
pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";

/// Record collection that holds blog posts.
pub const DEFAULT_POST_COLLECTION: &str = "com.macroblog.blog.post";

/// Largest accepted refresh margin.
pub const MAX_REFRESH_MARGIN: Duration = Duration::from_secs(24 * 60 * 60);

/// How the application authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// App-password sessions against the XRPC service.
    Session,
    /// Read-only: no login, content is fetched anonymously.
    Disabled,
}

impl FromStr for AuthMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(AuthMode::Session),
            "disabled" | "none" => Ok(AuthMode::Disabled),
            _ => Err(ConfigError::Invalid("MACROBLOG_AUTH_MODE", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the XRPC service
    pub service_url: String,
    /// NSID of the blog post collection
    pub post_collection: String,
    /// File backing the token store (memory store when unset)
    pub store_path: Option<PathBuf>,
    /// Authentication mode
    pub auth_mode: AuthMode,
    /// How often the background task checks token expiry
    pub refresh_check_interval: Duration,
    /// Refresh this long before the access token expires
    pub refresh_margin: Duration,
    /// Upper bound for every remote call
    pub http_timeout: Duration,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            post_collection: DEFAULT_POST_COLLECTION.to_string(),
            store_path: None,
            auth_mode: AuthMode::Session,
            refresh_check_interval: Duration::from_secs(5 * 60),
            refresh_margin: Duration::from_secs(5 * 60),
            http_timeout: Duration::from_secs(10),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Self::default();

        Ok(Self {
            service_url: env::var("MACROBLOG_SERVICE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or(defaults.service_url),
            post_collection: env::var("MACROBLOG_POST_COLLECTION")
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.post_collection),
            store_path: env::var("MACROBLOG_STORE_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            auth_mode: match env::var("MACROBLOG_AUTH_MODE") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.auth_mode,
            },
            refresh_check_interval: secs_var(
                "MACROBLOG_REFRESH_CHECK_SECS",
                defaults.refresh_check_interval,
                1..=u64::MAX,
            )?,
            refresh_margin: secs_var(
                "MACROBLOG_REFRESH_MARGIN_SECS",
                defaults.refresh_margin,
                0..=MAX_REFRESH_MARGIN.as_secs(),
            )?,
            http_timeout: secs_var(
                "MACROBLOG_HTTP_TIMEOUT_SECS",
                defaults.http_timeout,
                1..=u64::MAX,
            )?,
            frontend_url: env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        })
    }
}

/// Whole seconds from `name`, which must fall within `allowed`.
fn secs_var(
    name: &'static str,
    default: Duration,
    allowed: RangeInclusive<u64>,
) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if allowed.contains(&secs) => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::Invalid(name, raw)),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
