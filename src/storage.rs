use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::staging::StagedFile;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport: {0}")]
    Transport(String),
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("decode: {0}")]
    Decode(String),
}

/// What the media host reports back for a stored asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedMedia {
    pub url: String,
    #[serde(default)]
    pub secure_url: String,
    pub public_id: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Push a local file to the media host. Does not touch the local file.
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia, MediaError>;
}

/// Upload an optional staged file and always clean it up afterwards.
///
/// `None` in means `None` out. Any provider failure is logged and turned into
/// `None`; callers treat a missing result as the only failure signal.
pub async fn upload_on_media_host(uploader: &dyn MediaUploader, file: Option<StagedFile>) -> Option<UploadedMedia> {
    let file = file?;
    let result = uploader.upload(file.path()).await;
    let path = file.path().display().to_string();
    file.discard();
    match result {
        Ok(media) => {
            metrics::increment_counter!("media_uploads_total", "outcome" => "ok");
            info!("uploaded {path} as {}", media.public_id);
            Some(media)
        }
        Err(e) => {
            metrics::increment_counter!("media_uploads_total", "outcome" => "failed");
            warn!("media upload failed for {path}: {e}");
            None
        }
    }
}

// ---------------- Cloudinary implementation ----------------
/// Digest the media host checks request signatures with. Accounts default to SHA-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl FromStr for SignatureAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            other => Err(format!("unknown signature algorithm: {other}")),
        }
    }
}

#[derive(Clone)]
pub struct MediaHostConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base: String,
    pub timeout: Duration,
    pub signature_algorithm: SignatureAlgorithm,
}

impl fmt::Debug for MediaHostConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHostConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .field("signature_algorithm", &self.signature_algorithm)
            .finish()
    }
}

#[derive(Deserialize)]
struct CloudinaryErrorBody {
    error: CloudinaryErrorMessage,
}

#[derive(Deserialize)]
struct CloudinaryErrorMessage {
    message: String,
}

pub struct CloudinaryUploader {
    client: reqwest::Client,
    cfg: MediaHostConfig,
}

impl CloudinaryUploader {
    pub fn new(cfg: MediaHostConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        info!("Initialized Cloudinary client for cloud '{}'", cfg.cloud_name);
        Ok(Self { client, cfg })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1_1/{}/auto/upload",
            self.cfg.api_base.trim_end_matches('/'),
            self.cfg.cloud_name
        )
    }
}

/// Request signature over the signed parameters (sorted `k=v` pairs joined by
/// `&`) followed by the API secret, hex encoded.
pub fn sign_params(params: &[(&str, String)], api_secret: &str, algorithm: SignatureAlgorithm) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let payload = format!("{joined}{api_secret}");
    match algorithm {
        SignatureAlgorithm::Sha1 => format!("{:x}", Sha1::digest(payload.as_bytes())),
        SignatureAlgorithm::Sha256 => format!("{:x}", Sha256::digest(payload.as_bytes())),
    }
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia, MediaError> {
        use reqwest::multipart::{Form, Part};

        let bytes = tokio::fs::read(local_path).await?;
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".into());

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("timestamp", timestamp.clone())],
            &self.cfg.api_secret,
            self.cfg.signature_algorithm,
        );

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(&mime)
            .map_err(|e| MediaError::Transport(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("api_key", self.cfg.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature);

        let endpoint = self.endpoint();
        let resp = self
            .client
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!("cloudinary request failed endpoint={endpoint} err={e:?}");
                MediaError::Transport(e.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<CloudinaryErrorBody>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| status.to_string());
            error!("cloudinary rejected upload status={status} message={message}");
            return Err(MediaError::Rejected { status: status.as_u16(), message });
        }

        resp.json::<UploadedMedia>()
            .await
            .map_err(|e| MediaError::Decode(e.to_string()))
    }
}
