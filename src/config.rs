use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::auth::TokenConfig;
use crate::rate_limit::RateLimitConfig;
use crate::storage::{MediaHostConfig, SignatureAlgorithm};

/// Shortest secret accepted for signing tokens.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("{0} must be at least 32 characters long")]
    WeakSecret(&'static str),
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub name: Option<String>,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// `DATABASE_URL` with `/DB_NAME` appended when a name is configured.
    pub fn connection_url(&self) -> Option<String> {
        let url = self.url.as_deref()?;
        Some(match self.name.as_deref() {
            Some(name) => format!("{}/{}", url.trim_end_matches('/'), name),
            None => url.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub staging_dir: PathBuf,
    pub max_file_bytes: usize,
}

/// Everything the process needs, read once at start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub cors_origin: String,
    pub database: DatabaseConfig,
    pub tokens: TokenConfig,
    pub media: MediaHostConfig,
    pub uploads: UploadConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tokens = TokenConfig {
            access_secret: secret(get, "ACCESS_TOKEN_SECRET")?,
            access_ttl: lookup_duration(get, "ACCESS_TOKEN_EXPIRATION", "1d")?,
            refresh_secret: secret(get, "REFRESH_TOKEN_SECRET")?,
            refresh_ttl: lookup_duration(get, "REFRESH_TOKEN_EXPIRATION", "10d")?,
        };

        let media = MediaHostConfig {
            cloud_name: required(get, "CLOUDINARY_CLOUD_NAME")?,
            api_key: required(get, "CLOUDINARY_API_KEY")?,
            api_secret: required(get, "CLOUDINARY_API_SECRET")?,
            api_base: get("CLOUDINARY_API_BASE")
                .unwrap_or_else(|| "https://api.cloudinary.com".to_string()),
            timeout: Duration::from_secs(lookup_parsed(get, "UPLOAD_TIMEOUT_SECS", 60u64)?),
            signature_algorithm: lookup_parsed(
                get,
                "CLOUDINARY_SIGNATURE_ALGORITHM",
                SignatureAlgorithm::default(),
            )?,
        };

        Ok(Self {
            port: lookup_parsed(get, "PORT", 8000u16)?,
            cors_origin: get("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string()),
            database: DatabaseConfig {
                url: non_empty(get("DATABASE_URL")),
                name: non_empty(get("DB_NAME")),
                max_connections: lookup_parsed(get, "DATABASE_MAX_CONNECTIONS", 5u32)?,
            },
            tokens,
            media,
            uploads: UploadConfig {
                staging_dir: get("UPLOAD_STAGING_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("public/temp")),
                max_file_bytes: lookup_parsed(get, "UPLOAD_MAX_BYTES", 10 * 1024 * 1024usize)?,
            },
            rate_limit: RateLimitConfig::from_lookup(get)?,
        })
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn required<F>(get: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(get(var)).ok_or(ConfigError::Missing(var))
}

fn secret<F>(get: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = required(get, var)?;
    if value.len() < MIN_SECRET_LEN {
        return Err(ConfigError::WeakSecret(var));
    }
    Ok(value)
}

pub(crate) fn lookup_parsed<F, T>(get: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

pub(crate) fn lookup_bool<F>(get: &F, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { var, value: raw }),
        },
    }
}

fn lookup_duration<F>(get: &F, var: &'static str, default: &str) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = get(var).unwrap_or_else(|| default.to_string());
    parse_duration(&raw).ok_or(ConfigError::Invalid { var, value: raw })
}

/// Parse `"90"`, `"45s"`, `"15m"`, `"2h"`, `"1d"` or `"1w"`. Bare numbers are seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits.parse().ok()?;
    let secs = match unit.trim() {
        "" | "s" => n,
        "m" => n.checked_mul(60)?,
        "h" => n.checked_mul(60 * 60)?,
        "d" => n.checked_mul(24 * 60 * 60)?,
        "w" => n.checked_mul(7 * 24 * 60 * 60)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}
