//! Media references embedded in review documents.
//!
//! Images are stored by the upload service and referenced from the document
//! by url. The media id is recovered from the url as the segment between the
//! last `/` and the last `.`; every codec and the extractor rely on that rule.

mod extract;

pub use extract::{extract_references, extract_references_from_text};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("no media id can be recovered from url: {0}")]
    UnparseableUrl(String),

    #[error("url encodes media id {found:?}, expected {media_id:?}")]
    UrlMismatch { media_id: String, found: String },
}

/// Recover the media id from an image url.
///
/// Returns `None` when there is no `.` after the last `/`, or when the
/// segment between them is empty.
pub fn media_id_from_url(url: &str) -> Option<&str> {
    let start = url.rfind('/').map_or(0, |idx| idx + 1);
    let dot = url.rfind('.')?;
    if dot <= start {
        return None;
    }
    Some(&url[start..dot])
}
