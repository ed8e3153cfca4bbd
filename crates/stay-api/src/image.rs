//! Image uploads and binding their result onto a listing.
//!
//! The upload collaborator runs before the binder and hands over `{url, filename}`.
//! Unlike geocoding, an upload failure fails the request.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use stay_types::models::ImageRef;

use crate::error::ListingError;
use crate::geocode::build_client;

pub const ALLOWED_FORMATS: [&str; 4] = ["jpeg", "jpg", "png", "webp"];

/// Hosted folder for listing images.
pub const IMAGE_FOLDER: &str = "StayBnb";

/// 10 MB upload limit for listing images
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Rejected(String),
    #[error("upload request failed: {0}")]
    Request(String),
    #[error("invalid upload response: {0}")]
    Response(String),
    #[error("upload timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to store image: {0}")]
    Io(#[from] std::io::Error),
}

/// A file part received with a listing form.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadRequest {
    /// The image format, from the file extension or else the content type.
    pub fn format(&self) -> Result<&'static str, UploadError> {
        let from_name = self
            .filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        let from_type = self
            .content_type
            .as_deref()
            .and_then(|ct| ct.strip_prefix("image/"))
            .map(|t| t.to_ascii_lowercase());

        from_name
            .into_iter()
            .chain(from_type)
            .find_map(|candidate| ALLOWED_FORMATS.into_iter().find(|f| *f == candidate))
            .ok_or_else(|| {
                UploadError::Rejected(format!(
                    "\"image\" must be one of [{}]",
                    ALLOWED_FORMATS.join(", ")
                ))
            })
    }
}

/// What the image host returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub url: String,
    pub filename: String,
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<UploadedImage, UploadError>;
}

/// Upload with a bounded wait. Any failure is fatal to the request.
pub async fn upload(
    store: &dyn ImageStore,
    request: UploadRequest,
    timeout: Duration,
) -> Result<UploadedImage, ListingError> {
    if request.data.is_empty() {
        return Err(ListingError::Validation("\"image\" is empty".to_string()));
    }
    if request.data.len() > MAX_IMAGE_SIZE {
        return Err(ListingError::Validation(format!(
            "\"image\" must be at most {} MB",
            MAX_IMAGE_SIZE / (1024 * 1024)
        )));
    }
    request
        .format()
        .map_err(|e| ListingError::Validation(e.to_string()))?;

    let filename = request.filename.clone();
    let result = match tokio::time::timeout(timeout, store.upload(request)).await {
        Ok(result) => result,
        Err(_) => Err(UploadError::Timeout(timeout)),
    };

    result.map_err(|e| {
        error!("Image upload of '{}' failed: {}", filename, e);
        match e {
            UploadError::Rejected(msg) => ListingError::Validation(msg),
            other => ListingError::Upload(other.to_string()),
        }
    })
}

// ── Binder ──────────────────────────────────────────────────────────────

/// The effect of a request on a listing's image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageBinding {
    /// No upload came with the request; the stored image stays.
    Keep,
    Replace(ImageRef),
}

/// Map an upload result onto the listing's image field.
pub fn bind(upload: Option<UploadedImage>) -> ImageBinding {
    match upload {
        Some(UploadedImage { url, filename }) => ImageBinding::Replace(ImageRef { url, filename }),
        None => ImageBinding::Keep,
    }
}

impl ImageBinding {
    pub fn apply(self, current: Option<ImageRef>) -> Option<ImageRef> {
        match self {
            Self::Keep => current,
            Self::Replace(image) => Some(image),
        }
    }

    pub fn replacement(&self) -> Option<&ImageRef> {
        match self {
            Self::Keep => None,
            Self::Replace(image) => Some(image),
        }
    }
}

// ── Cloudinary ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CloudinaryResponse {
    secure_url: String,
    public_id: String,
}

/// Signed uploads to Cloudinary.
pub struct CloudinaryStore {
    http: Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

impl CloudinaryStore {
    pub fn new(cloud_name: String, api_key: String, api_secret: String, timeout: Duration) -> Self {
        Self {
            http: build_client(timeout),
            cloud_name,
            api_key,
            api_secret,
            folder: IMAGE_FOLDER.to_string(),
        }
    }

    fn signature(&self, timestamp: i64) -> String {
        // Parameters sorted by name, then the secret appended.
        let payload = format!("folder={}&timestamp={}{}", self.folder, timestamp, self.api_secret);
        hex::encode(Sha1::digest(payload.as_bytes()))
    }
}

#[async_trait]
impl ImageStore for CloudinaryStore {
    async fn upload(&self, request: UploadRequest) -> Result<UploadedImage, UploadError> {
        let format = request.format()?;
        let timestamp = chrono::Utc::now().timestamp();
        let url = format!("https://api.cloudinary.com/v1_1/{}/image/upload", self.cloud_name);

        let part = Part::bytes(request.data.to_vec())
            .file_name(request.filename.clone())
            .mime_str(&format!("image/{}", if format == "jpg" { "jpeg" } else { format }))
            .map_err(|e| UploadError::Request(e.to_string()))?;

        let form = Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("folder", self.folder.clone())
            .text("signature", self.signature(timestamp));

        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Request(format!("status {}: {}", status, body)));
        }

        let body: CloudinaryResponse = resp
            .json()
            .await
            .map_err(|e| UploadError::Response(e.to_string()))?;

        info!("Uploaded '{}' as {}", request.filename, body.public_id);
        Ok(UploadedImage {
            url: body.secure_url,
            filename: body.public_id,
        })
    }
}

// ── Local disk ──────────────────────────────────────────────────────────

/// Writes images under a directory served at `/uploads`. For development.
pub struct LocalImageStore {
    dir: PathBuf,
}

impl LocalImageStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn upload(&self, request: UploadRequest) -> Result<UploadedImage, UploadError> {
        let format = request.format()?;
        let name = format!("{}.{}", Uuid::new_v4(), format);

        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::File::create(self.dir.join(&name)).await?;
        file.write_all(&request.data).await?;
        file.flush().await?;

        Ok(UploadedImage {
            url: format!("/uploads/{}", name),
            filename: format!("{}/{}", IMAGE_FOLDER, name),
        })
    }
}
