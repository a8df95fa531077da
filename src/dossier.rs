use std::sync::Arc;

use color_eyre::{Result, eyre::WrapErr};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    watch,
};
use tracing::{info, warn};

mod state;
mod writer;

pub use state::TastingForm;
pub use writer::NoteWriter;

use crate::{
    autosave::{AutoSave, AutoSaveStatus},
    config::AutoSaveConfig,
    identity::Identity,
    remote::{IntensityAxis, NoteDraft, NotesBackend, Rating, WhiskyId},
    storage::LocalStorage,
};

/// Tasting note editor for one whisky. Every field change is applied locally right away
/// and then handed to the debounced auto-save as the complete form.
pub struct TastingNoteEditor<B, S> {
    whisky_id: WhiskyId,
    form: TastingForm,
    backend: Arc<B>,
    identity: Arc<Identity<S>>,
    writer: Arc<NoteWriter<B, S>>,
    autosave: AutoSave<NoteDraft>,
    flush_on_close: bool,
    notice_tx: UnboundedSender<String>,
    notice_rx: Option<UnboundedReceiver<String>>,
}

impl<B: NotesBackend, S: LocalStorage> TastingNoteEditor<B, S> {
    /// Loads the current owner's note, if any. A guest id is not created just to look.
    pub async fn open(
        backend: Arc<B>,
        identity: Arc<Identity<S>>,
        whisky_id: WhiskyId,
        config: &AutoSaveConfig,
    ) -> Self {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let scope = identity.read_scope();
        let existing = match backend.find_note(&scope, whisky_id).await {
            Ok(existing) => existing,
            Err(err) => {
                warn!("Loading tasting note for {whisky_id} failed: {err}");
                let _ = notice_tx.send(format!("Couldn't load your earlier notes: {err}"));
                None
            }
        };
        let form = existing.as_ref().map(TastingForm::from_note).unwrap_or_default();
        if let Some(note) = &existing {
            info!("Loaded tasting note {} for whisky {whisky_id}", note.id);
        }

        let writer = Arc::new(NoteWriter::new(
            backend.clone(),
            identity.clone(),
            whisky_id,
            existing.map(|note| note.id),
            notice_tx.clone(),
        ));
        let autosave = AutoSave::spawn(writer.clone(), config);
        Self {
            whisky_id,
            form,
            backend,
            identity,
            writer,
            autosave,
            flush_on_close: config.flush_on_exit,
            notice_tx,
            notice_rx: Some(notice_rx),
        }
    }

    pub fn whisky_id(&self) -> WhiskyId {
        self.whisky_id
    }

    pub fn form(&self) -> &TastingForm {
        &self.form
    }

    pub fn has_saved_note(&self) -> bool {
        self.writer.existing().is_some()
    }

    pub fn status(&self) -> watch::Receiver<AutoSaveStatus> {
        self.autosave.status()
    }

    /// Non-fatal problems worth showing to the user. Can be taken once.
    pub fn take_notices(&mut self) -> Option<UnboundedReceiver<String>> {
        self.notice_rx.take()
    }

    pub fn toggle_flavor(&mut self, tag: &str) -> Result<bool> {
        let selected = self.form.toggle_flavor(tag)?;
        self.changed();
        Ok(selected)
    }

    pub fn set_rating(&mut self, rating: Option<Rating>) {
        self.form.rating = rating;
        self.changed();
    }

    pub fn set_intensity(&mut self, axis: IntensityAxis, level: u8) -> Result<()> {
        self.form.intensity.set(axis, level)?;
        self.changed();
        Ok(())
    }

    pub fn set_note(&mut self, text: &str) {
        self.form.note = text.to_string();
        self.changed();
    }

    pub fn flush(&self) {
        self.autosave.flush();
    }

    /// Removes the saved note and resets the form. Pending edits are dropped.
    pub async fn delete(&mut self) -> Result<()> {
        self.autosave.cancel();
        if let Some(id) = self.writer.existing() {
            let scope = self.identity.read_scope();
            self.backend
                .delete_note(&scope, id)
                .await
                .wrap_err_with(|| format!("deleting tasting note {id}"))?;
            info!("Deleted tasting note {id}");
        }
        self.writer.set_existing(None);
        self.form = TastingForm::default();
        Ok(())
    }

    /// Writes any pending edit under the current identity and waits for it.
    pub async fn settle(&self) -> Result<()> {
        self.autosave.flush_and_wait().await
    }

    /// Looks the note up again after the identity changed. A note found under the new
    /// identity replaces the form; otherwise the form is kept and the next edit creates a
    /// new note.
    pub async fn reload(&mut self) -> Result<()> {
        let scope = self.identity.read_scope();
        let found = self
            .backend
            .find_note(&scope, self.whisky_id)
            .await
            .wrap_err_with(|| format!("loading tasting note for {}", self.whisky_id))?;
        match found {
            Some(note) => {
                info!("Switched to tasting note {} for whisky {}", note.id, self.whisky_id);
                self.form = TastingForm::from_note(&note);
                self.writer.set_existing(Some(note.id));
            }
            None => self.writer.set_existing(None),
        }
        Ok(())
    }

    /// Closing drops a pending edit that has not been saved yet, unless configured to
    /// flush on close.
    pub async fn close(self) {
        if !self.flush_on_close {
            return;
        }
        if let Err(err) = self.autosave.flush_and_wait().await {
            warn!("{err:#}");
            let _ = self.notice_tx.send("Auto-save stopped before the last edit was saved".into());
        }
    }

    fn changed(&self) {
        self.autosave.trigger(self.form.to_draft());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::time::sleep;
    use uuid::Uuid;

    use super::*;
    use crate::{
        accounts::Accounts,
        remote::{
            Owner,
            fake::{Call, FakeBackend},
        },
        storage::MemoryStorage,
    };

    const SETTLE: Duration = Duration::from_millis(600);

    struct Fixture {
        backend: FakeBackend,
        identity: Arc<Identity<MemoryStorage>>,
        whisky: WhiskyId,
        config: AutoSaveConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                backend: FakeBackend::new(),
                identity: Arc::new(Identity::load(Arc::new(MemoryStorage::default())).unwrap()),
                whisky: WhiskyId(Uuid::new_v4()),
                config: AutoSaveConfig::default(),
            }
        }

        async fn editor(&self) -> TastingNoteEditor<FakeBackend, MemoryStorage> {
            TastingNoteEditor::open(
                Arc::new(self.backend.clone()),
                self.identity.clone(),
                self.whisky,
                &self.config,
            )
            .await
        }
    }

    fn draft(rating: u8, flavors: &[&str]) -> NoteDraft {
        NoteDraft {
            rating: Some(Rating::new(rating).unwrap()),
            flavors: flavors.iter().map(|it| it.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_as_anonymous_does_not_create_guest() {
        let fixture = Fixture::new();
        let editor = fixture.editor().await;

        assert_eq!(editor.form(), &TastingForm::default());
        assert_eq!(fixture.identity.guests.current(), None);
        assert_eq!(
            fixture.backend.calls(),
            vec![Call::Find {
                owner: None,
                whisky_id: fixture.whisky
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_loads_existing_note() {
        let fixture = Fixture::new();
        let guest = fixture.identity.guests.get_or_create().unwrap();
        fixture
            .backend
            .seed_note(Owner::Guest(guest), fixture.whisky, &draft(3, &["peat"]));

        let editor = fixture.editor().await;

        assert_eq!(editor.form().rating, Some(Rating::new(3).unwrap()));
        assert!(editor.has_saved_note());
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_note_is_updated_not_inserted() {
        let fixture = Fixture::new();
        let session = crate::remote::fake::session_for("a@example.com");
        fixture.identity.auth.store(session.clone()).unwrap();
        let seeded = fixture.backend.seed_note(
            Owner::User(session.user_id),
            fixture.whisky,
            &draft(2, &[]),
        );
        let mut editor = fixture.editor().await;

        editor.set_rating(Some(Rating::new(4).unwrap()));
        sleep(SETTLE).await;

        assert_eq!(
            fixture.backend.writes(),
            vec![Call::Update {
                id: seeded.id,
                owner: Some(Owner::User(session.user_id)),
                draft: draft(4, &[]),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_then_update() {
        let fixture = Fixture::new();
        let mut editor = fixture.editor().await;

        editor.set_rating(Some(Rating::new(2).unwrap()));
        sleep(SETTLE).await;
        editor.set_rating(Some(Rating::new(3).unwrap()));
        sleep(SETTLE).await;

        let writes = fixture.backend.writes();
        assert_eq!(writes.len(), 2);
        assert!(matches!(writes[0], Call::Insert { .. }));
        let inserted = fixture.backend.notes()[0].id;
        assert!(matches!(writes[1], Call::Update { id, .. } if id == inserted));
        assert_eq!(fixture.backend.notes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guest_to_account_end_to_end() {
        let fixture = Fixture::new();
        let backend = Arc::new(fixture.backend.clone());
        let accounts = Accounts::new(backend, fixture.identity.clone());
        let mut editor = fixture.editor().await;

        editor.set_rating(Some(Rating::new(4).unwrap()));
        editor.toggle_flavor("smoke").unwrap();
        editor.toggle_flavor("honey").unwrap();
        sleep(Duration::from_millis(500)).await;
        sleep(Duration::from_millis(10)).await;

        let guest = fixture.identity.guests.current().expect("guest id created on first write");
        assert_eq!(
            fixture.backend.writes(),
            vec![Call::Insert {
                owner: Some(Owner::Guest(guest)),
                draft: draft(4, &["smoke", "honey"]),
            }]
        );
        let note_id = fixture.backend.notes()[0].id;

        let signed_in = accounts.sign_up("new@example.com", "pw").await.unwrap();
        let account = signed_in.session.user_id;
        assert_eq!(fixture.identity.guests.current(), None);
        assert_eq!(fixture.backend.notes()[0].owner(), Some(Owner::User(account)));

        editor.set_rating(Some(Rating::new(5).unwrap()));
        sleep(SETTLE).await;

        assert_eq!(
            fixture.backend.writes()[1],
            Call::Update {
                id: note_id,
                owner: Some(Owner::User(account)),
                draft: draft(5, &["smoke", "honey"]),
            }
        );
        assert_eq!(fixture.backend.notes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_is_reported_and_retried_on_next_edit() {
        let fixture = Fixture::new();
        let mut editor = fixture.editor().await;
        let mut notices = editor.take_notices().unwrap();
        fixture.backend.fail_next(1);

        editor.set_note("vanilla");
        sleep(SETTLE).await;
        assert!(notices.try_recv().is_ok());
        assert!(fixture.backend.notes().is_empty());

        editor.set_note("vanilla, toffee");
        sleep(SETTLE).await;
        assert_eq!(fixture.backend.notes().len(), 1);
        assert_eq!(fixture.backend.notes()[0].note.as_deref(), Some("vanilla, toffee"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_conflict_reconciles_to_update() {
        let fixture = Fixture::new();
        let mut editor = fixture.editor().await;
        let guest = fixture.identity.guests.get_or_create().unwrap();
        // another tab saved first
        let other = fixture
            .backend
            .seed_note(Owner::Guest(guest), fixture.whisky, &draft(1, &[]));
        fixture.backend.conflict_next_insert();

        editor.set_rating(Some(Rating::new(5).unwrap()));
        sleep(SETTLE).await;

        let notes = fixture.backend.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, other.id);
        assert_eq!(notes[0].rating, Some(Rating::new(5).unwrap()));
        assert!(editor.has_saved_note());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_resets_form() {
        let fixture = Fixture::new();
        let mut editor = fixture.editor().await;
        editor.set_intensity(IntensityAxis::Smoke, 4).unwrap();
        sleep(SETTLE).await;
        let id = fixture.backend.notes()[0].id;

        editor.delete().await.unwrap();

        assert_eq!(editor.form(), &TastingForm::default());
        assert!(!editor.has_saved_note());
        assert!(fixture.backend.notes().is_empty());
        assert!(fixture.backend.calls().contains(&Call::Delete { id }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_intensity_does_not_save() {
        let fixture = Fixture::new();
        let mut editor = fixture.editor().await;

        assert!(editor.set_intensity(IntensityAxis::Fruit, 9).is_err());
        sleep(SETTLE).await;

        assert!(fixture.backend.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_drops_pending_edit_by_default() {
        let fixture = Fixture::new();
        let mut editor = fixture.editor().await;

        editor.set_note("lost");
        editor.close().await;
        sleep(SETTLE).await;

        assert!(fixture.backend.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_when_configured() {
        let mut fixture = Fixture::new();
        fixture.config.flush_on_exit = true;
        let mut editor = fixture.editor().await;

        editor.set_note("kept");
        editor.close().await;

        assert_eq!(fixture.backend.notes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_waits_for_slow_save() {
        let mut fixture = Fixture::new();
        fixture.backend = fixture.backend.with_save_delay(Duration::from_secs(3));
        fixture.config.flush_on_exit = true;
        let mut editor = fixture.editor().await;

        editor.set_rating(Some(Rating::new(2).unwrap()));
        sleep(SETTLE).await;
        // first save is still running
        editor.set_rating(Some(Rating::new(3).unwrap()));
        editor.close().await;

        let notes = fixture.backend.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].rating, Some(Rating::new(3).unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_slow_save_is_written_after_it() {
        let mut fixture = Fixture::new();
        fixture.backend = fixture.backend.with_save_delay(Duration::from_secs(3));
        let mut editor = fixture.editor().await;
        let mut status = editor.status();

        editor.set_note("peat");
        sleep(SETTLE).await;
        editor.set_note("peat, brine");
        editor.flush();
        status
            .wait_for(|it| *it == AutoSaveStatus::Saved)
            .await
            .unwrap();

        let writes = fixture.backend.writes();
        assert_eq!(writes.len(), 2);
        assert!(matches!(writes[0], Call::Insert { .. }));
        assert!(matches!(writes[1], Call::Update { .. }));
        assert_eq!(fixture.backend.notes()[0].note.as_deref(), Some("peat, brine"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_after_sign_out_saves_as_guest() {
        let fixture = Fixture::new();
        let accounts = Accounts::new(Arc::new(fixture.backend.clone()), fixture.identity.clone());
        accounts.sign_in("a@example.com", "pw").await.unwrap();
        let mut editor = fixture.editor().await;

        editor.set_rating(Some(Rating::new(3).unwrap()));
        editor.settle().await.unwrap();
        accounts.sign_out().unwrap();
        editor.reload().await.unwrap();

        editor.set_rating(Some(Rating::new(5).unwrap()));
        editor.set_rating(Some(Rating::new(4).unwrap()));
        sleep(SETTLE).await;

        let guest = fixture.identity.guests.current().unwrap();
        let owned = fixture
            .backend
            .notes()
            .into_iter()
            .map(|note| (note.owner(), note.rating))
            .collect::<Vec<_>>();
        let user = crate::remote::fake::session_for("a@example.com").user_id;
        assert_eq!(
            owned,
            vec![
                (Some(Owner::User(user)), Some(Rating::new(3).unwrap())),
                (Some(Owner::Guest(guest)), Some(Rating::new(4).unwrap())),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_adopts_note_of_new_identity() {
        let fixture = Fixture::new();
        let session = crate::remote::fake::session_for("b@example.com");
        let seeded = fixture.backend.seed_note(
            Owner::User(session.user_id),
            fixture.whisky,
            &draft(5, &["sherry"]),
        );
        let mut editor = fixture.editor().await;
        assert!(!editor.has_saved_note());

        fixture.identity.auth.store(session).unwrap();
        editor.reload().await.unwrap();

        assert_eq!(editor.form().rating, Some(Rating::new(5).unwrap()));
        assert!(editor.has_saved_note());
        editor.set_note("raisins");
        sleep(SETTLE).await;
        assert!(matches!(fixture.backend.writes()[0], Call::Update { id, .. } if id == seeded.id));
    }
}
