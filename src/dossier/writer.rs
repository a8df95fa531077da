use std::sync::{Arc, Mutex};

use color_eyre::{
    Result,
    eyre::{OptionExt, WrapErr},
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::{
    autosave::Saver,
    identity::Identity,
    remote::{NoteDraft, NoteId, NoteRow, NotesBackend, RemoteError, Scope, TastingNote, WhiskyId},
    storage::LocalStorage,
};

/// Writes the editor's form for one whisky, inserting the first time and updating after.
///
/// Whether a row exists is decided once when the editor loads and then tracked locally,
/// not looked up again before each save.
pub struct NoteWriter<B, S> {
    backend: Arc<B>,
    identity: Arc<Identity<S>>,
    whisky_id: WhiskyId,
    existing: Mutex<Option<NoteId>>,
    notice_tx: UnboundedSender<String>,
}

impl<B: NotesBackend, S: LocalStorage> NoteWriter<B, S> {
    pub fn new(
        backend: Arc<B>,
        identity: Arc<Identity<S>>,
        whisky_id: WhiskyId,
        existing: Option<NoteId>,
        notice_tx: UnboundedSender<String>,
    ) -> Self {
        Self {
            backend,
            identity,
            whisky_id,
            existing: Mutex::new(existing),
            notice_tx,
        }
    }

    pub fn existing(&self) -> Option<NoteId> {
        *self.existing.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_existing(&self, id: Option<NoteId>) {
        *self.existing.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = id;
    }

    async fn write(&self, draft: &NoteDraft) -> Result<TastingNote> {
        let scope = self.identity.write_scope()?;
        let owner = scope.owner().ok_or_eyre("no identity to save under")?;
        let row = NoteRow::new(owner, self.whisky_id, draft);
        match self.existing() {
            Some(id) => {
                debug!("Updating tasting note {id} as {owner}");
                self.backend
                    .update_note(&scope, id, &row)
                    .await
                    .wrap_err_with(|| format!("updating tasting note {id}"))
            }
            None => {
                debug!("Inserting tasting note for whisky {} as {owner}", self.whisky_id);
                match self.backend.insert_note(&scope, &row).await {
                    Ok(note) => Ok(note),
                    Err(RemoteError::Conflict(reason)) => self.reconcile(&scope, &row, reason).await,
                    Err(err) => Err(err).wrap_err("inserting tasting note"),
                }
            }
        }
    }

    /// Another editor created the row first. Take it over instead of inserting a duplicate.
    async fn reconcile(&self, scope: &Scope, row: &NoteRow<'_>, reason: String) -> Result<TastingNote> {
        warn!("Insert conflicted ({reason}), switching to update of the existing note");
        let existing = self
            .backend
            .find_note(scope, self.whisky_id)
            .await
            .wrap_err("looking up conflicting tasting note")?
            .ok_or_eyre("insert conflicted but no existing tasting note was found")?;
        self.backend
            .update_note(scope, existing.id, row)
            .await
            .wrap_err_with(|| format!("updating tasting note {}", existing.id))
    }
}

impl<B: NotesBackend, S: LocalStorage> Saver<NoteDraft> for NoteWriter<B, S> {
    async fn save(&self, draft: NoteDraft) -> Result<()> {
        match self.write(&draft).await {
            Ok(note) => {
                self.set_existing(Some(note.id));
                Ok(())
            }
            Err(err) => {
                let _ = self
                    .notice_tx
                    .send(format!("Couldn't save your tasting note, keep editing to retry: {err}"));
                Err(err)
            }
        }
    }
}
