//! Image hosting for teacher/child photos and payment proofs.

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const TEACHER_FOLDER: &str = "tlinky/teachers";
pub const CHILD_FOLDER: &str = "tlinky/children";
pub const PAYMENT_FOLDER: &str = "tlinky/payments";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Image host is not configured.")]
    NotConfigured,

    #[error("Upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Image host rejected the upload ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Stores the file under `folder` and returns its public URL.
    async fn upload(&self, folder: &str, file: UploadFile) -> Result<String, UploadError>;
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

pub struct CloudinaryHost {
    config: CloudinaryConfig,
    client: Client,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl CloudinaryHost {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.config.cloud_name
        )
    }
}

/// Signs the upload parameters: sorted `key=value` pairs joined with `&`,
/// followed by the API secret, hashed with SHA-256.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let digest = Sha256::digest(format!("{}{}", joined, api_secret).as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, folder: &str, file: UploadFile) -> Result<String, UploadError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("folder", folder), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );

        let mut part = multipart::Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(ct) = file.content_type.as_deref() {
            part = part.mime_str(ct)?;
        }
        let form = multipart::Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder.to_string())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let response = self.client.post(self.endpoint()).multipart(form).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UploadError::Rejected { status, body });
        }
        let parsed: UploadResponse = response.json().await?;
        Ok(parsed.secure_url)
    }
}

/// Stand-in used when no credentials are configured.
pub struct DisabledHost;

#[async_trait]
impl ImageHost for DisabledHost {
    async fn upload(&self, _folder: &str, _file: UploadFile) -> Result<String, UploadError> {
        Err(UploadError::NotConfigured)
    }
}
