// Save-time reconciliation through an editor session

use async_trait::async_trait;
use reviewdoc::media::extract_references_from_text;
use reviewdoc::richtext::{CommandResult, DocumentPosition, ReviewFormat, Selection};
use reviewdoc::session::{EditorSession, SessionEvent};
use reviewdoc::upload::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

type Log = Arc<Mutex<Vec<String>>>;

/// Records deletions; fails for ids listed in `failing`
struct RecordingUploads {
    log: Log,
    failing: Vec<String>,
}

#[async_trait]
impl UploadService for RecordingUploads {
    async fn upload(&self, _: ImageUpload, _: &Owner) -> Result<UploadedMedia, UploadError> {
        Err(UploadError::Rejected("not used".into()))
    }

    async fn delete(&self, media_id: &str) -> Result<(), UploadError> {
        self.log.lock().unwrap().push(format!("delete:{media_id}"));
        if self.failing.iter().any(|id| id == media_id) {
            return Err(UploadError::Io("bucket unavailable".into()));
        }
        Ok(())
    }
}

/// Takes a while to persist; rejects the first `failures` saves
struct SlowStore {
    log: Log,
    failures: AtomicUsize,
}

#[async_trait]
impl ReviewStore for SlowStore {
    async fn save_review(&self, _: &Owner, _: &ReviewUpdate) -> Result<(), SaveError> {
        self.log.lock().unwrap().push("save:start".into());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            self.log.lock().unwrap().push("save:failed".into());
            return Err(SaveError::Rejected("server error".into()));
        }
        self.log.lock().unwrap().push("save:done".into());
        Ok(())
    }
}

fn image(id: &str) -> String {
    format!(r#"<figure><img src="https://storage.googleapis.com/bucket/review-images/{id}.png"></figure>"#)
}

fn open(html: &str, failing: &[&str], save_failures: usize) -> (EditorSession, Log) {
    let log: Log = Arc::default();
    let uploads = RecordingUploads {
        log: log.clone(),
        failing: failing.iter().map(|s| s.to_string()).collect(),
    };
    let store = SlowStore {
        log: log.clone(),
        failures: AtomicUsize::new(save_failures),
    };
    let session = EditorSession::open(
        html,
        ReviewFormat::Html,
        Owner::new(OwnerType::Anime, 21),
        Arc::new(uploads),
        Arc::new(store),
    );
    (session, log)
}

fn ids(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Put the cursor on the image block for `media_id` and delete it
fn delete_image(session: &mut EditorSession, media_id: &str) {
    let block = session
        .document()
        .blocks()
        .iter()
        .find(|b| b.block_type.media().is_some_and(|m| m.media_id() == media_id))
        .map(|b| b.id)
        .unwrap();
    session.set_selection(Selection::collapsed(DocumentPosition::new(block, 0)));
    assert_eq!(session.handle_key_command("backspace"), CommandResult::Handled);
}

#[tokio::test]
async fn deletes_removed_image_only_after_save_succeeds() {
    let (mut session, log) = open(&format!("<p>Intro</p>{}", image("abc123")), &[], 0);
    assert_eq!(session.known_media_ids(), &ids(&["abc123"]));

    delete_image(&mut session, "abc123");
    let report = session.save(ReviewFields::default()).await.unwrap();

    assert_eq!(report.deleted, vec!["abc123"]);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["save:start", "save:done", "delete:abc123"]
    );
    assert!(session.known_media_ids().is_empty());
}

#[tokio::test]
async fn failed_save_deletes_nothing() {
    let (mut session, log) = open(&format!("<p>Intro</p>{}", image("abc123")), &[], 1);
    delete_image(&mut session, "abc123");

    let err = session.save(ReviewFields::default()).await.unwrap_err();
    assert_eq!(err, SaveError::Rejected("server error".into()));
    assert_eq!(*log.lock().unwrap(), vec!["save:start", "save:failed"]);
    assert_eq!(session.known_media_ids(), &ids(&["abc123"]));

    // Retrying once the store recovers reconciles as usual
    let report = session.save(ReviewFields::default()).await.unwrap();
    assert_eq!(report.deleted, vec!["abc123"]);
    assert_eq!(log.lock().unwrap().last().unwrap(), "delete:abc123");
}

#[tokio::test]
async fn only_unreferenced_media_are_deleted() {
    let html = format!("{}<p>middle</p>{}{}", image("A"), image("B"), image("C"));
    let (mut session, log) = open(&html, &[], 0);
    assert_eq!(session.known_media_ids(), &ids(&["A", "B", "C"]));

    delete_image(&mut session, "B");
    let report = session.save(ReviewFields::default()).await.unwrap();

    assert_eq!(report.deleted, vec!["B"]);
    assert!(report.is_clean());
    assert_eq!(session.known_media_ids(), &ids(&["A", "C"]));
    let deletions: Vec<_> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|entry| entry.starts_with("delete:"))
        .cloned()
        .collect();
    assert_eq!(deletions, vec!["delete:B"]);
}

#[tokio::test]
async fn failed_deletion_does_not_fail_the_save() {
    let html = format!("{}{}{}", image("A"), image("B"), image("C"));
    let (mut session, _log) = open(&html, &["B"], 0);

    delete_image(&mut session, "A");
    delete_image(&mut session, "B");
    let report = session.save(ReviewFields::default()).await.unwrap();

    assert_eq!(report.deleted, vec!["A"]);
    assert_eq!(report.failed_deletions.len(), 1);
    assert_eq!(report.failed_deletions[0].0, "B");
    // The save committed, so the next reconciliation starts from the saved version
    assert_eq!(session.known_media_ids(), &ids(&["C"]));
}

#[tokio::test]
async fn unchanged_review_deletes_nothing() {
    let (mut session, log) = open(&format!("<p>Intro</p>{}", image("keep")), &[], 0);
    let report = session.save(ReviewFields::default()).await.unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(*log.lock().unwrap(), vec!["save:start", "save:done"]);
}

#[tokio::test]
async fn local_stores_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let uploads = Arc::new(LocalUploadStore::new(
        tmp.path().join("uploads"),
        "http://localhost:5000/uploads",
    ));
    let reviews = Arc::new(FileReviewStore::new(tmp.path().join("reviews")));
    let owner = Owner::new(OwnerType::Manga, 8);

    let mut session = EditorSession::new(
        ReviewFormat::Markdown,
        owner,
        uploads.clone(),
        reviews.clone(),
    );
    session.apply(|state| state.insert_text("Cover art"));
    let ticket = session
        .begin_upload(ImageUpload::new(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .unwrap();

    let media_id = match session.next_upload_event().await.unwrap() {
        SessionEvent::UploadInserted { ticket: t, media_id } => {
            assert_eq!(t, ticket);
            media_id
        }
        other => panic!("upload failed: {other:?}"),
    };
    let stored = uploads.dir().join(format!("{media_id}.png"));
    assert!(stored.exists());

    let fields = ReviewFields {
        progress_status: Some(ProgressStatus::Completed),
        ..ReviewFields::default()
    };
    session.save(fields).await.unwrap();
    let saved = reviews.load(&owner).await.unwrap().unwrap();
    assert_eq!(saved.format, ReviewFormat::Markdown);
    assert_eq!(saved.progress_status, Some(ProgressStatus::Completed));
    assert_eq!(
        extract_references_from_text(saved.format, &saved.serialized_document),
        ids(&[media_id.as_str()])
    );

    delete_image(&mut session, &media_id);
    let report = session.save(ReviewFields::default()).await.unwrap();
    assert_eq!(report.deleted, vec![media_id]);
    assert!(!stored.exists());
}

#[tokio::test]
async fn unsaved_upload_removed_again_leaves_no_file() {
    let tmp = TempDir::new().unwrap();
    let uploads = Arc::new(LocalUploadStore::new(
        tmp.path().join("uploads"),
        "http://localhost:5000/uploads",
    ));
    let reviews = Arc::new(FileReviewStore::new(tmp.path().join("reviews")));
    let mut session = EditorSession::new(
        ReviewFormat::Html,
        Owner::new(OwnerType::LightNovel, 3),
        uploads.clone(),
        reviews,
    );

    session
        .begin_upload(ImageUpload::new(vec![0xff, 0xd8], "image/jpeg"))
        .unwrap();
    let media_id = match session.next_upload_event().await.unwrap() {
        SessionEvent::UploadInserted { media_id, .. } => media_id,
        other => panic!("upload failed: {other:?}"),
    };
    let stored = uploads.dir().join(format!("{media_id}.jpg"));
    assert!(stored.exists());

    delete_image(&mut session, &media_id);
    let report = session.save(ReviewFields::default()).await.unwrap();
    assert_eq!(report.deleted, vec![media_id]);
    assert!(!stored.exists());
}
