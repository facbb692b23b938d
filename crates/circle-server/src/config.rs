use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

/// Placeholder JWT secrets that must not reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", DEFAULT_JWT_SECRET];

/// Server settings, read from `CIRCLE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub media_dir: PathBuf,
    /// Base of the signed media URLs handed to clients.
    pub public_url: String,
    pub media_url_ttl_secs: i64,
    /// Browser origin allowed by CORS; `None` allows any.
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let jwt_secret = var("CIRCLE_JWT_SECRET", DEFAULT_JWT_SECRET);
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            warn!("CIRCLE_JWT_SECRET is unset or a placeholder; tokens and media URLs are forgeable");
        }

        let port = var("CIRCLE_PORT", "5001");
        let ttl = var("CIRCLE_MEDIA_URL_TTL_SECS", "3600");

        Ok(Self {
            jwt_secret,
            db_path: var("CIRCLE_DB_PATH", "circle.db").into(),
            host: var("CIRCLE_HOST", "0.0.0.0"),
            port: port
                .parse()
                .with_context(|| format!("CIRCLE_PORT '{port}' is not a port number"))?,
            media_dir: var("CIRCLE_MEDIA_DIR", "./media").into(),
            public_url: var("CIRCLE_PUBLIC_URL", "http://localhost:5001"),
            media_url_ttl_secs: ttl
                .parse()
                .with_context(|| format!("CIRCLE_MEDIA_URL_TTL_SECS '{ttl}' is not a number"))?,
            cors_origin: lookup("CIRCLE_CORS_ORIGIN").filter(|o| !o.is_empty()),
        })
    }
}
