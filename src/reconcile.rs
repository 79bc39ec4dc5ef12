//! Save-time reconciliation of stored media against the saved document.
//!
//! After a review is persisted, media that the previous version referenced
//! and the new one does not are orphans and get deleted from the upload
//! service. Deletion runs only after the save succeeded, so an interrupted
//! save can leave an unreferenced image behind but never a dangling
//! reference.

use crate::upload::{UploadError, UploadService};
use futures::future::join_all;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Media ids in `known` that `current` no longer references
pub fn orphans(known: &BTreeSet<String>, current: &BTreeSet<String>) -> BTreeSet<String> {
    known.difference(current).cloned().collect()
}

/// Outcome of deleting orphaned media after a save
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub deleted: Vec<String>,
    pub failed_deletions: Vec<(String, UploadError)>,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.failed_deletions.is_empty()
    }
}

/// Delete every id in `orphan_ids` concurrently.
///
/// A failed deletion is logged and reported; it never stops the others.
pub async fn delete_orphans(service: &dyn UploadService, orphan_ids: &BTreeSet<String>) -> SaveReport {
    let results = join_all(orphan_ids.iter().map(|id| async move {
        let result = service.delete(id).await;
        (id.clone(), result)
    }))
    .await;

    let mut report = SaveReport::default();
    for (id, result) in results {
        match result {
            Ok(()) => {
                info!(media_id = %id, "deleted orphaned media");
                report.deleted.push(id);
            }
            Err(err) => {
                warn!(media_id = %id, error = %err, "failed to delete orphaned media");
                report.failed_deletions.push((id, err));
            }
        }
    }
    report
}
