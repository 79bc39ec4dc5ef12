//! Editor session: the single writer of one review document.
//!
//! The session owns the editor state, the set of media ids the last saved
//! version referenced, and the uploads in flight. Uploads run as spawned
//! tokio tasks; each carries the cursor position captured when it started
//! and reports back over a channel. The session applies completions when
//! polled, so every document mutation happens on the caller's loop.
//!
//! Dropping the session drops the channel. Uploads that finish afterwards
//! find nobody listening and their insertion is discarded.

use crate::media::extract_references_from_text;
use crate::reconcile::{SaveReport, delete_orphans, orphans};
use crate::richtext::structured_editor::CommandOutput;
use crate::richtext::{
    CommandResult, DocumentPosition, EditorState, ReviewFormat, Selection, StructuredDocument,
};
use crate::upload::{
    ImageUpload, Owner, ReviewFields, ReviewStore, ReviewUpdate, SaveError, UploadError,
    UploadService, UploadedMedia,
};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Identifies one upload started by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UploadTicket(u64);

impl UploadTicket {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Uploading,
    Inserted { media_id: String },
    Failed(UploadError),
}

/// Something that happened to an upload, for the caller to show the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    UploadInserted {
        ticket: UploadTicket,
        media_id: String,
    },
    UploadFailed {
        ticket: UploadTicket,
        error: UploadError,
    },
}

struct UploadCompletion {
    ticket: UploadTicket,
    anchor: DocumentPosition,
    result: Result<UploadedMedia, UploadError>,
}

pub struct EditorSession {
    state: EditorState,
    owner: Owner,
    format: ReviewFormat,
    known_ids: BTreeSet<String>,
    uploads: HashMap<UploadTicket, UploadState>,
    next_ticket: u64,
    upload_service: Arc<dyn UploadService>,
    review_store: Arc<dyn ReviewStore>,
    completions_tx: mpsc::UnboundedSender<UploadCompletion>,
    completions_rx: mpsc::UnboundedReceiver<UploadCompletion>,
}

impl EditorSession {
    /// Open a session on a review that has not been written yet
    pub fn new(
        format: ReviewFormat,
        owner: Owner,
        upload_service: Arc<dyn UploadService>,
        review_store: Arc<dyn ReviewStore>,
    ) -> Self {
        Self::open("", format, owner, upload_service, review_store)
    }

    /// Open a session on saved review text.
    ///
    /// The media it references become the known set that the first save
    /// reconciles against.
    pub fn open(
        text: &str,
        format: ReviewFormat,
        owner: Owner,
        upload_service: Arc<dyn UploadService>,
        review_store: Arc<dyn ReviewStore>,
    ) -> Self {
        let document = format.deserialize(text);
        let known_ids = extract_references_from_text(format, text);
        debug!(%owner, %format, known = known_ids.len(), "opened review");
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        EditorSession {
            state: EditorState::with_document(document),
            owner,
            format,
            known_ids,
            uploads: HashMap::new(),
            next_ticket: 0,
            upload_service,
            review_store,
            completions_tx,
            completions_rx,
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn document(&self) -> &StructuredDocument {
        &self.state.document
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn format(&self) -> ReviewFormat {
        self.format
    }

    /// Media ids referenced by the last saved version, plus every upload
    /// stored since then
    pub fn known_media_ids(&self) -> &BTreeSet<String> {
        &self.known_ids
    }

    /// Run an editing command against the current state and keep its result
    pub fn apply<F>(&mut self, command: F) -> CommandResult
    where
        F: FnOnce(&EditorState) -> CommandOutput,
    {
        let (next, result) = command(&self.state);
        self.state = next;
        result
    }

    pub fn handle_key_command(&mut self, name: &str) -> CommandResult {
        self.apply(|state| state.handle_key_command(name))
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.state = self.state.set_selection(selection);
    }

    pub fn upload_state(&self, ticket: UploadTicket) -> Option<&UploadState> {
        self.uploads.get(&ticket)
    }

    /// Number of uploads still waiting for the upload service
    pub fn pending_uploads(&self) -> usize {
        self.uploads
            .values()
            .filter(|state| **state == UploadState::Uploading)
            .count()
    }

    /// Start uploading an image; it will be inserted at the current cursor.
    ///
    /// Returns `None` for anything but `image/*`. Must be called within a
    /// tokio runtime. Editing continues while the upload runs.
    pub fn begin_upload(&mut self, upload: ImageUpload) -> Option<UploadTicket> {
        if !upload.is_image() {
            debug!(mime_type = %upload.mime_type, "ignoring non-image upload");
            return None;
        }

        let ticket = UploadTicket(self.next_ticket);
        self.next_ticket += 1;
        self.uploads.insert(ticket, UploadState::Uploading);

        let anchor = self.state.selection.focus;
        let service = Arc::clone(&self.upload_service);
        let owner = self.owner;
        let tx = self.completions_tx.clone();
        info!(%owner, ticket = ticket.0, size = upload.bytes.len(), "starting upload");

        tokio::spawn(async move {
            let result = service.upload(upload, &owner).await;
            if tx
                .send(UploadCompletion {
                    ticket,
                    anchor,
                    result,
                })
                .is_err()
            {
                debug!(ticket = ticket.0, "editor session closed before upload finished");
            }
        });

        Some(ticket)
    }

    /// Start an upload for every image among pasted or dropped files
    pub fn handle_pasted_files(
        &mut self,
        files: impl IntoIterator<Item = ImageUpload>,
    ) -> (Vec<UploadTicket>, CommandResult) {
        let tickets: Vec<_> = files
            .into_iter()
            .filter_map(|file| self.begin_upload(file))
            .collect();
        let result = if tickets.is_empty() {
            CommandResult::NotHandled
        } else {
            CommandResult::Handled
        };
        (tickets, result)
    }

    /// Apply every upload that has finished so far, without waiting
    pub fn poll_uploads(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            events.push(self.complete_upload(completion));
        }
        events
    }

    /// Wait for the next upload to finish and apply it.
    ///
    /// Returns `None` when no upload is in flight.
    pub async fn next_upload_event(&mut self) -> Option<SessionEvent> {
        if self.pending_uploads() == 0 {
            return None;
        }
        let completion = self.completions_rx.recv().await?;
        Some(self.complete_upload(completion))
    }

    fn complete_upload(&mut self, completion: UploadCompletion) -> SessionEvent {
        let UploadCompletion {
            ticket,
            anchor,
            result,
        } = completion;

        let inserted = result.and_then(|media| {
            // Stored media is reconciled on the next save, inserted or not
            self.known_ids.insert(media.media_id.clone());
            self.insert_uploaded(anchor, media)
        });
        match inserted {
            Ok(media_id) => {
                info!(ticket = ticket.0, %media_id, "inserted uploaded image");
                self.uploads.insert(
                    ticket,
                    UploadState::Inserted {
                        media_id: media_id.clone(),
                    },
                );
                SessionEvent::UploadInserted { ticket, media_id }
            }
            Err(error) => {
                warn!(ticket = ticket.0, %error, "upload failed");
                self.uploads.insert(ticket, UploadState::Failed(error.clone()));
                SessionEvent::UploadFailed { ticket, error }
            }
        }
    }

    /// Insert an uploaded image at `anchor`, leaving the user's selection where it was
    fn insert_uploaded(
        &mut self,
        anchor: DocumentPosition,
        media: UploadedMedia,
    ) -> Result<String, UploadError> {
        let selection = self.state.selection;
        let pending_style = self.state.pending_style;

        let at_anchor = self.state.set_selection(Selection::collapsed(anchor));
        let (next, result) = at_anchor.insert_image_placeholder(&media.media_id, &media.url);
        if result == CommandResult::NotHandled {
            return Err(UploadError::Rejected(format!(
                "url {} does not carry media id {}",
                media.url, media.media_id
            )));
        }

        let mut next = next.set_selection(selection);
        next.pending_style = pending_style;
        self.state = next;
        Ok(media.media_id)
    }

    /// Persist the review, then delete media it no longer references.
    ///
    /// Nothing is deleted unless the review store accepted the update.
    /// Deletion failures are logged and reported, they do not fail the save.
    pub async fn save(&mut self, fields: ReviewFields) -> Result<SaveReport, SaveError> {
        let serialized_document = self.format.serialize(&self.state.document);
        let current_ids = extract_references_from_text(self.format, &serialized_document);
        let orphan_ids = orphans(&self.known_ids, &current_ids);

        let update = ReviewUpdate {
            serialized_document,
            format: self.format,
            progress_status: fields.progress_status,
            consumed_month: fields.consumed_month,
            updated_at: Utc::now(),
            ratings: fields.ratings,
        };
        self.review_store.save_review(&self.owner, &update).await?;
        info!(
            owner = %self.owner,
            referenced = current_ids.len(),
            orphans = orphan_ids.len(),
            "saved review"
        );

        let report = delete_orphans(self.upload_service.as_ref(), &orphan_ids).await;
        self.known_ids = current_ids;
        Ok(report)
    }
}
