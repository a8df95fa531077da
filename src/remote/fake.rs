//! In-memory backend used by tests. Records every call so tests can assert on
//! the exact remote traffic an operation produced.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use time::OffsetDateTime;
use uuid::Uuid;

use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Find { owner: Option<Owner>, whisky_id: WhiskyId },
    Insert { owner: Option<Owner>, draft: NoteDraft },
    Update { id: NoteId, owner: Option<Owner>, draft: NoteDraft },
    Delete { id: NoteId },
    Migrate { guest: GuestSessionId, user: UserId },
    ListWhiskies,
    SignIn { email: String },
    SignUp { email: String },
}

#[derive(Default)]
struct State {
    notes: Vec<TastingNote>,
    whiskies: Vec<Whisky>,
    calls: Vec<Call>,
    failures_left: usize,
    conflict_next_insert: bool,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
    save_delay: Duration,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts and updates take this long before they land.
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Insert { .. } | Call::Update { .. }))
            .collect()
    }

    pub fn notes(&self) -> Vec<TastingNote> {
        self.state.lock().unwrap().notes.clone()
    }

    pub fn fail_next(&self, count: usize) {
        self.state.lock().unwrap().failures_left = count;
    }

    pub fn conflict_next_insert(&self) {
        self.state.lock().unwrap().conflict_next_insert = true;
    }

    pub fn add_whisky(&self, whisky: Whisky) {
        self.state.lock().unwrap().whiskies.push(whisky);
    }

    /// Seeds a row as if written earlier, e.g. by another tab.
    pub fn seed_note(&self, owner: Owner, whisky_id: WhiskyId, draft: &NoteDraft) -> TastingNote {
        let note = to_note(NoteId(Uuid::new_v4()), &NoteRow::new(owner, whisky_id, draft));
        self.state.lock().unwrap().notes.push(note.clone());
        note
    }

    fn record(&self, call: Call) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(RemoteError::Rejected {
                status: 503,
                message: "injected failure".into(),
            });
        }
        Ok(())
    }
}

fn draft_of(row: &NoteRow<'_>) -> NoteDraft {
    NoteDraft {
        rating: row.rating,
        note: row.note.map(str::to_string),
        flavors: row.flavors.clone(),
        intensity_ratings: row.intensity_ratings.clone(),
    }
}

fn owner_of(row: &NoteRow<'_>) -> Option<Owner> {
    match (row.user_id, row.guest_session_id) {
        (Some(user), None) => Some(Owner::User(user)),
        (None, Some(guest)) => Some(Owner::Guest(guest)),
        _ => None,
    }
}

fn to_note(id: NoteId, row: &NoteRow<'_>) -> TastingNote {
    let now = OffsetDateTime::now_utc();
    TastingNote {
        id,
        user_id: row.user_id,
        guest_session_id: row.guest_session_id,
        whisky_id: row.whisky_id,
        rating: row.rating,
        note: row.note.map(str::to_string),
        flavors: row.flavors.clone(),
        intensity_ratings: row.intensity_ratings.clone(),
        created_at: now,
        updated_at: now,
    }
}

impl NotesBackend for FakeBackend {
    async fn find_note(&self, scope: &Scope, whisky_id: WhiskyId) -> RemoteResult<Option<TastingNote>> {
        let owner = scope.owner();
        self.record(Call::Find { owner, whisky_id })?;
        let state = self.state.lock().unwrap();
        Ok(state
            .notes
            .iter()
            .find(|note| owner.is_some() && note.owner() == owner && note.whisky_id == whisky_id)
            .cloned())
    }

    async fn insert_note(&self, scope: &Scope, row: &NoteRow<'_>) -> RemoteResult<TastingNote> {
        let call = Call::Insert {
            owner: owner_of(row),
            draft: draft_of(row),
        };
        let owner = scope.owner();
        self.record(call)?;
        tokio::time::sleep(self.save_delay).await;
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.conflict_next_insert) {
            return Err(RemoteError::Conflict("duplicate key value".into()));
        }
        if owner.is_none() || owner != owner_of(row) {
            return Err(RemoteError::Unauthorized("row owner mismatch".into()));
        }
        let note = to_note(NoteId(Uuid::new_v4()), row);
        state.notes.push(note.clone());
        Ok(note)
    }

    async fn update_note(&self, scope: &Scope, id: NoteId, row: &NoteRow<'_>) -> RemoteResult<TastingNote> {
        let call = Call::Update {
            id,
            owner: owner_of(row),
            draft: draft_of(row),
        };
        let owner = scope.owner();
        self.record(call)?;
        tokio::time::sleep(self.save_delay).await;
        let mut state = self.state.lock().unwrap();
        let Some(existing) = state.notes.iter_mut().find(|note| note.id == id) else {
            return Err(RemoteError::NotFound(format!("tasting note {id}")));
        };
        if owner.is_none() || existing.owner() != owner {
            return Err(RemoteError::Unauthorized("not your note".into()));
        }
        let created_at = existing.created_at;
        *existing = to_note(id, row);
        existing.created_at = created_at;
        Ok(existing.clone())
    }

    async fn delete_note(&self, scope: &Scope, id: NoteId) -> RemoteResult<()> {
        self.record(Call::Delete { id })?;
        let owner = scope.owner();
        let mut state = self.state.lock().unwrap();
        state.notes.retain(|note| !(note.id == id && note.owner() == owner));
        Ok(())
    }

    async fn migrate_guest_data(
        &self,
        _scope: &Scope,
        guest: GuestSessionId,
        user: UserId,
    ) -> RemoteResult<u64> {
        self.record(Call::Migrate { guest, user })?;
        let mut state = self.state.lock().unwrap();
        let mut migrated = 0;
        for note in state.notes.iter_mut() {
            if note.guest_session_id == Some(guest) {
                note.guest_session_id = None;
                note.user_id = Some(user);
                migrated += 1;
            }
        }
        Ok(migrated)
    }

    async fn list_whiskies(&self, _scope: &Scope) -> RemoteResult<Vec<Whisky>> {
        self.record(Call::ListWhiskies)?;
        Ok(self.state.lock().unwrap().whiskies.clone())
    }
}

impl AuthBackend for FakeBackend {
    async fn sign_in(&self, email: &str, _password: &str) -> RemoteResult<AuthSession> {
        self.record(Call::SignIn {
            email: email.to_string(),
        })?;
        Ok(session_for(email))
    }

    async fn sign_up(&self, email: &str, _password: &str) -> RemoteResult<AuthSession> {
        self.record(Call::SignUp {
            email: email.to_string(),
        })?;
        Ok(session_for(email))
    }
}

/// Deterministic per email, so signing in twice yields the same account.
pub fn session_for(email: &str) -> AuthSession {
    AuthSession {
        user_id: UserId(Uuid::new_v5(&Uuid::NAMESPACE_OID, email.as_bytes())),
        email: email.to_string(),
        access_token: format!("token-{email}"),
    }
}
