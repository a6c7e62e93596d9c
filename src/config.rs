use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024 * 1024 + 1024 * 1024;

/// Process configuration, read once from the environment at startup.
///
/// Site behaviour that administrators change at runtime lives in
/// [`crate::services::settings::SiteSettings`] instead.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: SocketAddr,

    /// sqlx connection string
    pub database_url: String,

    /// HMAC secret for session tokens
    pub secret_key: String,

    /// Root of the blob store; files live under `files/{user_id}/`
    pub storage_dir: PathBuf,

    /// Static assets served for non-API paths
    pub public_dir: PathBuf,

    /// Upper bound on any request body, uploads included
    pub max_body_bytes: usize,

    pub session_ttl_hours: i64,

    /// Registrations with this email are granted admin
    pub admin_email: Option<String>,

    /// Seconds between expired-file sweeps
    pub cleanup_interval_secs: u64,

    /// Mark the session cookie `Secure`
    pub cookie_secure: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("SECRET_KEY").context("SECRET_KEY must be set")?;
        if secret_key.len() < 16 {
            anyhow::bail!("SECRET_KEY must be at least 16 characters long");
        }

        Ok(Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000".parse()?)?,
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://yukifiles.db?mode=rwc".to_string()),
            secret_key,
            storage_dir: PathBuf::from(
                std::env::var("STORAGE_DIR").unwrap_or_else(|_| "./storage".to_string()),
            ),
            public_dir: PathBuf::from(
                std::env::var("PUBLIC_DIR").unwrap_or_else(|_| "./public".to_string()),
            ),
            max_body_bytes: env_or("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?,
            session_ttl_hours: env_or("SESSION_TTL_HOURS", 168)?,
            admin_email: std::env::var("ADMIN_EMAIL")
                .ok()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty()),
            cleanup_interval_secs: env_or("CLEANUP_INTERVAL_SECS", 3600)?,
            cookie_secure: env_or("COOKIE_SECURE", false)?,
        })
    }

    /// Configuration for tests and embedding: everything defaulted except
    /// the secret and the storage root.
    pub fn with_storage(secret_key: &str, storage_dir: PathBuf) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: "sqlite::memory:".to_string(),
            secret_key: secret_key.to_string(),
            public_dir: storage_dir.join("public"),
            storage_dir,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            session_ttl_hours: 168,
            admin_email: None,
            cleanup_interval_secs: 3600,
            cookie_secure: false,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}
