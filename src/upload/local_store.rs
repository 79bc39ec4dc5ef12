//! Upload store backed by a local directory, using tokio::fs.

use super::{ImageUpload, Owner, UploadError, UploadService, UploadedMedia};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default size limit for a single image
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Stores each image as `<dir>/<uuid>.<ext>` and serves it from
/// `<public_base_url>/<uuid>.<ext>`.
pub struct LocalUploadStore {
    dir: PathBuf,
    public_base_url: String,
    max_bytes: u64,
}

impl LocalUploadStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.into(),
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn url_for(&self, file_name: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), file_name)
    }
}

/// File extension for an upload: the original file's, else one for its MIME type
fn extension_for(upload: &ImageUpload) -> String {
    let from_name = upload
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase);
    if let Some(ext) = from_name {
        return ext;
    }

    let mime = upload.mime_type.trim().to_ascii_lowercase();
    let subtype = mime.split(';').next().unwrap_or("").trim_start_matches("image/");
    match subtype {
        "jpeg" | "pjpeg" => "jpg".to_string(),
        "svg+xml" => "svg".to_string(),
        "x-icon" | "vnd.microsoft.icon" => "ico".to_string(),
        other if !other.is_empty() && other.chars().all(|c| c.is_ascii_alphanumeric()) => {
            other.to_string()
        }
        _ => "img".to_string(),
    }
}

/// Media ids name a single file in the upload directory
fn is_plain_id(media_id: &str) -> bool {
    !media_id.is_empty()
        && media_id != "."
        && media_id != ".."
        && !media_id.contains(['/', '\\'])
}

#[async_trait]
impl UploadService for LocalUploadStore {
    async fn upload(&self, upload: ImageUpload, owner: &Owner) -> Result<UploadedMedia, UploadError> {
        if !upload.is_image() {
            return Err(UploadError::UnsupportedMediaType(upload.mime_type));
        }
        let size = upload.bytes.len() as u64;
        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let media_id = Uuid::new_v4().to_string();
        let file_name = format!("{}.{}", media_id, extension_for(&upload));

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| UploadError::Io(e.to_string()))?;
        fs::write(self.dir.join(&file_name), &upload.bytes)
            .await
            .map_err(|e| UploadError::Io(e.to_string()))?;

        info!(%owner, %media_id, size, "stored upload");
        Ok(UploadedMedia {
            url: self.url_for(&file_name),
            media_id,
        })
    }

    async fn delete(&self, media_id: &str) -> Result<(), UploadError> {
        if !is_plain_id(media_id) {
            return Err(UploadError::Rejected(format!("invalid media id: {media_id:?}")));
        }

        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(%media_id, dir = %self.dir.display(), "upload directory missing, nothing to delete");
                return Ok(());
            }
            Err(e) => return Err(UploadError::Io(e.to_string())),
        };

        let mut removed = 0;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| UploadError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) != Some(media_id) {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "removed upload");
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(UploadError::Io(e.to_string())),
            }
        }

        if removed == 0 {
            warn!(%media_id, "media not found, treating delete as done");
        } else {
            info!(%media_id, "deleted upload");
        }
        Ok(())
    }
}
