//! Upload service and review store abstractions.
//!
//! Implementations:
//! - `LocalUploadStore` - Stores images in a local directory using tokio::fs
//! - `FileReviewStore` - Stores review updates as TOML files
//!
//! Tests substitute their own implementations to observe call ordering.

mod local_store;
mod review_store;

pub use local_store::{DEFAULT_MAX_UPLOAD_BYTES, LocalUploadStore};
pub use review_store::{FileReviewStore, StoreError, load_review_file};

use crate::richtext::ReviewFormat;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Upload of {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("Upload service rejected the request: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveError {
    #[error("Review store rejected the update: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Kind of media a review belongs to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    Anime,
    Manga,
    LightNovel,
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OwnerType::Anime => "anime",
            OwnerType::Manga => "manga",
            OwnerType::LightNovel => "light-novel",
        })
    }
}

/// The entity whose review is being edited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub owner_type: OwnerType,
    pub owner_id: u64,
}

impl Owner {
    pub fn new(owner_type: OwnerType, owner_id: u64) -> Self {
        Owner {
            owner_type,
            owner_id,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.owner_type, self.owner_id)
    }
}

/// True for `image/*` MIME types
pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type
        .trim()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

/// Image bytes waiting to be uploaded
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub mime_type: String,
    /// Name of the file the bytes came from, when known
    pub file_name: Option<String>,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        ImageUpload {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn is_image(&self) -> bool {
        is_image_mime(&self.mime_type)
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub media_id: String,
    pub url: String,
}

/// Stores uploaded images and deletes them again.
#[async_trait]
pub trait UploadService: Send + Sync {
    async fn upload(&self, upload: ImageUpload, owner: &Owner) -> Result<UploadedMedia, UploadError>;

    /// Delete stored media. Deleting an id that is not stored succeeds.
    async fn delete(&self, media_id: &str) -> Result<(), UploadError>;
}

/// Progress of the reviewer through the work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStatus {
    Planned,
    #[serde(rename = "On Hold")]
    OnHold,
    #[serde(rename = "On Progress")]
    OnProgress,
    Completed,
    Dropped,
}

/// Everything persisted when a review is saved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewUpdate {
    pub serialized_document: String,
    pub format: ReviewFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_status: Option<ProgressStatus>,
    /// First day of the month the work was finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_month: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
    /// Scores keyed by aspect, e.g. `storyline` or `art`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratings: Option<BTreeMap<String, u8>>,
}

impl ReviewUpdate {
    pub fn new(serialized_document: String, format: ReviewFormat) -> Self {
        ReviewUpdate {
            serialized_document,
            format,
            progress_status: None,
            consumed_month: None,
            updated_at: Utc::now(),
            ratings: None,
        }
    }
}

/// Review fields other than the document, supplied by the caller on save
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewFields {
    pub ratings: Option<BTreeMap<String, u8>>,
    pub progress_status: Option<ProgressStatus>,
    pub consumed_month: Option<NaiveDate>,
}

impl ReviewFields {
    /// Set the consumed month from any date in it
    pub fn consumed_in(mut self, date: NaiveDate) -> Self {
        self.consumed_month = date.with_day(1);
        self
    }
}

/// Persists review updates.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn save_review(&self, owner: &Owner, update: &ReviewUpdate) -> Result<(), SaveError>;
}
