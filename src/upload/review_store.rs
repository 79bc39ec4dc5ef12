//! Review store writing each review to its own TOML file.

use super::{Owner, ReviewStore, ReviewUpdate, SaveError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to parse review file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Failed to serialize review: {0}")]
    Serialize(String),
}

impl From<StoreError> for SaveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(message) => SaveError::Io(message),
            other => SaveError::Rejected(other.to_string()),
        }
    }
}

/// Stores the latest update of each review as `<dir>/<owner-type>-<owner-id>.toml`
pub struct FileReviewStore {
    dir: PathBuf,
}

impl FileReviewStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, owner: &Owner) -> PathBuf {
        self.dir.join(format!("{owner}.toml"))
    }

    /// Write `update` as the review of `owner`, replacing any earlier one
    pub async fn write(&self, owner: &Owner, update: &ReviewUpdate) -> Result<PathBuf, StoreError> {
        let path = self.path_for(owner);
        let toml =
            toml::to_string_pretty(update).map_err(|e| StoreError::Serialize(e.to_string()))?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;

        // Write then rename so readers never see a partial file
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, toml)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(path)
    }

    /// The saved review of `owner`, if there is one
    pub async fn load(&self, owner: &Owner) -> Result<Option<ReviewUpdate>, StoreError> {
        load_review_file(&self.path_for(owner)).await
    }
}

/// Read a review file written by [`FileReviewStore`]
pub async fn load_review_file(path: &Path) -> Result<Option<ReviewUpdate>, StoreError> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::Io(e.to_string())),
    };
    toml::from_str(&contents)
        .map(Some)
        .map_err(|e| StoreError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

#[async_trait]
impl ReviewStore for FileReviewStore {
    async fn save_review(&self, owner: &Owner, update: &ReviewUpdate) -> Result<(), SaveError> {
        let path = self.write(owner, update).await?;
        info!(%owner, path = %path.display(), "saved review");
        Ok(())
    }
}
